//! Fuzz Test - Compares the order book against a reference implementation.
//!
//! Uses a naive but correct reference book to verify the pooled,
//! intrusively-linked book produces the same top of book, depth and
//! traded volume.

use flash_exchange::{
    ClientResponseType, MarketUpdateType, OrderBook, OrderId, OutputEvent, Price, Qty, Side,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap};

/// Simple reference implementation for verification
struct ReferenceBook {
    bids: BTreeMap<Price, Vec<(OrderId, Qty)>>, // price -> FIFO [(order_id, qty)]
    asks: BTreeMap<Price, Vec<(OrderId, Qty)>>,
    orders: HashMap<OrderId, (Side, Price)>,
}

impl ReferenceBook {
    fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: HashMap::new(),
        }
    }

    fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next_back().copied()
    }

    fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
    }

    fn depth(&self, side: Side, price: Price) -> u64 {
        let levels = match side {
            Side::Buy => &self.bids,
            _ => &self.asks,
        };
        levels
            .get(&price)
            .map_or(0, |orders| orders.iter().map(|&(_, q)| q as u64).sum())
    }

    /// Returns total quantity traded.
    fn add(&mut self, order_id: OrderId, side: Side, price: Price, mut qty: Qty) -> u64 {
        let mut traded = 0u64;

        loop {
            if qty == 0 {
                break;
            }
            let best = match side {
                Side::Buy => self.best_ask().filter(|&ask| ask <= price),
                _ => self.best_bid().filter(|&bid| bid >= price),
            };
            let Some(level_price) = best else { break };

            let contra = match side {
                Side::Buy => &mut self.asks,
                _ => &mut self.bids,
            };
            let orders = contra.get_mut(&level_price).unwrap();
            let fill = orders[0].1.min(qty);
            orders[0].1 -= fill;
            qty -= fill;
            traded += fill as u64;

            if orders[0].1 == 0 {
                let (maker_id, _) = orders.remove(0);
                self.orders.remove(&maker_id);
            }
            if orders.is_empty() {
                contra.remove(&level_price);
            }
        }

        if qty > 0 {
            let levels = match side {
                Side::Buy => &mut self.bids,
                _ => &mut self.asks,
            };
            levels.entry(price).or_default().push((order_id, qty));
            self.orders.insert(order_id, (side, price));
        }

        traded
    }

    fn cancel(&mut self, order_id: OrderId) -> bool {
        let Some((side, price)) = self.orders.remove(&order_id) else {
            return false;
        };
        let levels = match side {
            Side::Buy => &mut self.bids,
            _ => &mut self.asks,
        };
        let orders = levels.get_mut(&price).unwrap();
        orders.retain(|&(id, _)| id != order_id);
        if orders.is_empty() {
            levels.remove(&price);
        }
        true
    }

    fn order_count(&self) -> usize {
        self.orders.len()
    }
}

/// Sum of TRADE update quantities in an event batch
fn traded_qty(events: &[OutputEvent]) -> u64 {
    events
        .iter()
        .filter_map(|e| match e {
            OutputEvent::Update(u) if u.kind == MarketUpdateType::Trade => Some(u.qty as u64),
            _ => None,
        })
        .sum()
}

fn cancel_succeeded(events: &[OutputEvent]) -> bool {
    events.iter().any(|e| {
        matches!(e, OutputEvent::Response(r) if r.kind == ClientResponseType::Canceled)
    })
}

fn run_fuzz(seed: u64, ops: usize, price_range: std::ops::Range<Price>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut book = OrderBook::new(0, 100_000, 2048);
    let mut reference = ReferenceBook::new();
    let mut next_order_id: OrderId = 1;
    let mut events = Vec::new();

    for op in 0..ops {
        events.clear();

        if rng.gen_bool(0.65) || next_order_id == 1 {
            let order_id = next_order_id;
            next_order_id += 1;
            let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            let price = rng.gen_range(price_range.clone());
            let qty = rng.gen_range(1..200);

            book.add(&mut events, 1, order_id, side, price, qty);
            let expected = reference.add(order_id, side, price, qty);

            assert_eq!(
                traded_qty(&events),
                expected,
                "Traded quantity mismatch at op {} (order {} {} {}@{})",
                op, order_id, side, qty, price
            );
        } else {
            // Cancel a random id, possibly already filled or canceled
            let order_id = rng.gen_range(1..next_order_id);

            book.cancel(&mut events, 1, order_id);
            let expected = reference.cancel(order_id);

            assert_eq!(
                cancel_succeeded(&events),
                expected,
                "Cancel outcome mismatch at op {} (order {})",
                op, order_id
            );
        }

        assert_eq!(book.best_bid(), reference.best_bid(), "Best bid mismatch at op {}", op);
        assert_eq!(book.best_ask(), reference.best_ask(), "Best ask mismatch at op {}", op);
        assert_eq!(book.order_count(), reference.order_count(), "Order count mismatch at op {}", op);

        // Never crossed after matching
        if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
            assert!(bid < ask, "Book crossed at op {}: {} >= {}", op, bid, ask);
        }
    }

    // Full depth comparison at the end
    for (side, levels) in [(Side::Buy, &reference.bids), (Side::Sell, &reference.asks)] {
        assert_eq!(book.levels(side).count(), levels.len(), "{} level count mismatch", side);
        for &price in levels.keys() {
            assert_eq!(
                book.depth_at(side, price).0,
                reference.depth(side, price),
                "{} depth mismatch at {}",
                side,
                price
            );
        }
    }
}

#[test]
fn test_fuzz_against_reference() {
    run_fuzz(42, 20_000, 9900..10100);
}

#[test]
fn test_fuzz_narrow_spread() {
    // Tight range forces constant crossing
    run_fuzz(7, 20_000, 9995..10005);
}

#[test]
fn test_fuzz_negative_prices() {
    // Prices are signed ticks; spreads and calendar products trade below zero
    run_fuzz(0xFEED, 5_000, -50..50);
}

#[test]
fn test_fuzz_many_seeds() {
    for seed in 0..16 {
        run_fuzz(seed, 2_000, 9950..10050);
    }
}
