//! Matching - the cross/rest algorithm on top of [`OrderBook`].
//!
//! 1. ACKNOWLEDGE: every valid NEW gets an ACCEPTED response first
//! 2. CROSSING: match against the opposite side, best price then arrival
//! 3. RESTING: place any remaining quantity in the book
//!
//! Output goes through a [`MatchSink`], so the same code feeds ring
//! transports in the engine thread and plain `Vec`s in tests and benches.

use tracing::warn;

use crate::command::{
    ClientResponse, ClientResponseType, MarketUpdate, MarketUpdateType, OutputEvent,
};
use crate::order_book::OrderBook;
use crate::price_level::OrderEntry;
use crate::slab::{SlabIndex, NULL_INDEX};
use crate::types::{
    ClientId, Logged, OrderId, Price, Qty, Side, ORDER_ID_INVALID, PRICE_INVALID,
    PRIORITY_INVALID, QTY_INVALID,
};

/// Receiver of everything a book emits while processing a request.
pub trait MatchSink {
    fn on_client_response(&mut self, response: &ClientResponse);
    fn on_market_update(&mut self, update: &MarketUpdate);
}

impl MatchSink for Vec<OutputEvent> {
    #[inline]
    fn on_client_response(&mut self, response: &ClientResponse) {
        self.push(OutputEvent::Response(*response));
    }

    #[inline]
    fn on_market_update(&mut self, update: &MarketUpdate) {
        self.push(OutputEvent::Update(*update));
    }
}

impl OrderBook {
    /// Process a NEW order.
    ///
    /// # Algorithm
    /// 1. Reject malformed or duplicate orders with an INVALID response
    /// 2. Emit ACCEPTED for the full quantity
    /// 3. Cross against the opposite side while prices overlap
    /// 4. If quantity remains, rest it and emit ADD
    pub fn add<S: MatchSink>(
        &mut self,
        sink: &mut S,
        client_id: ClientId,
        order_id: OrderId,
        side: Side,
        price: Price,
        qty: Qty,
    ) {
        let ticker_id = self.ticker_id();

        if qty == 0
            || qty == QTY_INVALID
            || !side.is_valid()
            || price == PRICE_INVALID
            || order_id == ORDER_ID_INVALID
            || self.contains_order(order_id)
        {
            warn!(
                ticker = ticker_id,
                client = client_id,
                order_id = %Logged(order_id),
                %side,
                price = %Logged(price),
                qty = %Logged(qty),
                "rejecting invalid or duplicate new order"
            );
            sink.on_client_response(&ClientResponse::new(
                ClientResponseType::Invalid,
                client_id,
                ticker_id,
                order_id,
                side,
                price,
                0,
                qty,
            ));
            return;
        }

        sink.on_client_response(&ClientResponse::new(
            ClientResponseType::Accepted,
            client_id,
            ticker_id,
            order_id,
            side,
            price,
            0,
            qty,
        ));

        // Phase 1: CROSSING (aggressive matching)
        let leaves = self.check_for_match(sink, client_id, order_id, side, price, qty);

        // Phase 2: RESTING (passive posting)
        if leaves > 0 {
            let index = self.insert_order(OrderEntry::new(
                ticker_id, client_id, order_id, side, price, leaves,
            ));
            let priority = self.order_at(index).priority;
            sink.on_market_update(&MarketUpdate::new(
                MarketUpdateType::Add,
                order_id,
                ticker_id,
                side,
                price,
                leaves,
                priority,
            ));
        }
    }

    /// Process a CANCEL request.
    ///
    /// Emits CANCELED plus a CANCEL update on success, CANCEL_REJECTED if
    /// the order is not resting or belongs to another client.
    pub fn cancel<S: MatchSink>(&mut self, sink: &mut S, client_id: ClientId, order_id: OrderId) {
        let ticker_id = self.ticker_id();
        let owned = self
            .order_index(order_id)
            .filter(|&index| self.order_at(index).client_id == client_id);

        let Some(index) = owned else {
            sink.on_client_response(&ClientResponse::new(
                ClientResponseType::CancelRejected,
                client_id,
                ticker_id,
                order_id,
                Side::Invalid,
                PRICE_INVALID,
                QTY_INVALID,
                QTY_INVALID,
            ));
            return;
        };

        let entry = self.remove_order_at(index);
        sink.on_client_response(&ClientResponse::new(
            ClientResponseType::Canceled,
            client_id,
            ticker_id,
            order_id,
            entry.side,
            entry.price,
            0,
            entry.qty,
        ));
        sink.on_market_update(&MarketUpdate::new(
            MarketUpdateType::Cancel,
            order_id,
            ticker_id,
            entry.side,
            entry.price,
            entry.qty,
            entry.priority,
        ));
    }

    /// Cross an incoming order against the opposite side.
    ///
    /// # Returns
    /// Remaining quantity after matching
    fn check_for_match<S: MatchSink>(
        &mut self,
        sink: &mut S,
        client_id: ClientId,
        order_id: OrderId,
        side: Side,
        price: Price,
        mut leaves: Qty,
    ) -> Qty {
        let contra = side.opposite();

        while leaves > 0 {
            let level_index = self.best_level_index(contra);
            if level_index == NULL_INDEX {
                break; // No orders on opposite side
            }

            let level = self.level_at(level_index);
            if !prices_cross(side, price, level.price) {
                break;
            }

            let passive = level.peek_head();
            debug_assert!(passive != NULL_INDEX, "non-empty level without a head");
            leaves = self.fill(sink, client_id, order_id, side, leaves, passive);
        }

        leaves
    }

    /// Match the aggressor against one resting order.
    ///
    /// # Returns
    /// Aggressor quantity left after this fill
    fn fill<S: MatchSink>(
        &mut self,
        sink: &mut S,
        client_id: ClientId,
        order_id: OrderId,
        side: Side,
        leaves: Qty,
        passive_index: SlabIndex,
    ) -> Qty {
        let ticker_id = self.ticker_id();
        let passive = *self.order_at(passive_index);
        let fill_qty = leaves.min(passive.qty);
        let leaves = leaves - fill_qty;
        let passive_leaves = passive.qty - fill_qty;

        sink.on_client_response(&ClientResponse::new(
            ClientResponseType::Filled,
            client_id,
            ticker_id,
            order_id,
            side,
            passive.price,
            fill_qty,
            leaves,
        ));
        sink.on_client_response(&ClientResponse::new(
            ClientResponseType::Filled,
            passive.client_id,
            ticker_id,
            passive.order_id,
            passive.side,
            passive.price,
            fill_qty,
            passive_leaves,
        ));
        sink.on_market_update(&MarketUpdate::new(
            MarketUpdateType::Trade,
            ORDER_ID_INVALID,
            ticker_id,
            side,
            passive.price,
            fill_qty,
            PRIORITY_INVALID,
        ));

        if passive_leaves == 0 {
            // Passive fully filled - remove from book
            sink.on_market_update(&MarketUpdate::new(
                MarketUpdateType::Cancel,
                passive.order_id,
                ticker_id,
                passive.side,
                passive.price,
                passive.qty,
                passive.priority,
            ));
            self.remove_order_at(passive_index);
        } else {
            // Passive partially filled - update quantity in place
            self.reduce_qty(passive_index, fill_qty);
            sink.on_market_update(&MarketUpdate::new(
                MarketUpdateType::Modify,
                passive.order_id,
                ticker_id,
                passive.side,
                passive.price,
                passive_leaves,
                passive.priority,
            ));
        }

        leaves
    }
}

/// Whether an aggressor at `price` trades against a resting level at
/// `resting`.
#[inline]
fn prices_cross(side: Side, price: Price, resting: Price) -> bool {
    match side {
        // Buyer willing to pay >= lowest ask
        Side::Buy => price >= resting,
        // Seller willing to accept <= highest bid
        Side::Sell => price <= resting,
        Side::Invalid => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_A: ClientId = 1;
    const CLIENT_B: ClientId = 2;

    fn book() -> OrderBook {
        OrderBook::new(0, 1000, 64)
    }

    fn responses(events: &[OutputEvent]) -> Vec<ClientResponse> {
        events
            .iter()
            .filter_map(|e| match e {
                OutputEvent::Response(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    fn updates(events: &[OutputEvent]) -> Vec<MarketUpdate> {
        events
            .iter()
            .filter_map(|e| match e {
                OutputEvent::Update(u) => Some(*u),
                _ => None,
            })
            .collect()
    }

    fn trades(events: &[OutputEvent]) -> Vec<MarketUpdate> {
        updates(events)
            .into_iter()
            .filter(|u| u.kind == MarketUpdateType::Trade)
            .collect()
    }

    #[test]
    fn test_place_bid_no_match() {
        let mut book = book();
        let mut events = Vec::new();
        book.add(&mut events, CLIENT_A, 1, Side::Buy, 10000, 100);

        // Should get Accepted + Add
        assert_eq!(events.len(), 2);
        let r = responses(&events);
        assert_eq!(r[0].kind, ClientResponseType::Accepted);
        assert_eq!((r[0].exec_qty, r[0].leaves_qty), (0, 100));

        let u = updates(&events);
        assert_eq!(u[0].kind, MarketUpdateType::Add);
        assert_eq!(u[0].priority, 1);
        assert_eq!(u[0].qty, 100);

        assert_eq!(book.best_bid(), Some(10000));
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn test_full_match_event_order() {
        let mut book = book();
        let mut events = Vec::new();
        book.add(&mut events, CLIENT_A, 1, Side::Sell, 10000, 100);

        events.clear();
        book.add(&mut events, CLIENT_B, 2, Side::Buy, 10000, 100);

        // ACCEPTED, FILLED(aggr), FILLED(passive), TRADE, CANCEL
        assert_eq!(events.len(), 5);
        let OutputEvent::Response(accepted) = events[0] else { panic!() };
        assert_eq!(accepted.kind, ClientResponseType::Accepted);

        let OutputEvent::Response(aggr) = events[1] else { panic!() };
        assert_eq!(aggr.kind, ClientResponseType::Filled);
        assert_eq!((aggr.client_id, aggr.order_id), (CLIENT_B, 2));
        assert_eq!((aggr.exec_qty, aggr.leaves_qty), (100, 0));

        let OutputEvent::Response(passive) = events[2] else { panic!() };
        assert_eq!((passive.client_id, passive.order_id), (CLIENT_A, 1));
        assert_eq!((passive.exec_qty, passive.leaves_qty), (100, 0));

        let OutputEvent::Update(trade) = events[3] else { panic!() };
        assert_eq!(trade.kind, MarketUpdateType::Trade);
        assert_eq!(trade.order_id, ORDER_ID_INVALID);
        assert_eq!(trade.side, Side::Buy);
        assert_eq!((trade.price, trade.qty), (10000, 100));

        let OutputEvent::Update(removed) = events[4] else { panic!() };
        assert_eq!(removed.kind, MarketUpdateType::Cancel);
        assert_eq!(removed.order_id, 1);

        assert!(book.is_empty());
    }

    #[test]
    fn test_partial_fill_accounting() {
        let mut book = book();
        let mut events = Vec::new();
        book.add(&mut events, CLIENT_A, 1, Side::Sell, 100, 4);

        events.clear();
        book.add(&mut events, CLIENT_B, 2, Side::Buy, 100, 10);

        let t = trades(&events);
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].qty, 4);

        let aggr_fill = responses(&events)
            .into_iter()
            .find(|r| r.kind == ClientResponseType::Filled && r.order_id == 2)
            .unwrap();
        assert_eq!(aggr_fill.leaves_qty, 6);

        let add = updates(&events)
            .into_iter()
            .find(|u| u.kind == MarketUpdateType::Add)
            .unwrap();
        assert_eq!((add.order_id, add.qty, add.side), (2, 6, Side::Buy));

        assert_eq!(book.best_bid(), Some(100));
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn test_partial_match_passive_remains() {
        let mut book = book();
        let mut events = Vec::new();
        book.add(&mut events, CLIENT_A, 1, Side::Sell, 10000, 100);

        events.clear();
        book.add(&mut events, CLIENT_B, 2, Side::Buy, 10000, 30);

        let modify = updates(&events)
            .into_iter()
            .find(|u| u.kind == MarketUpdateType::Modify)
            .unwrap();
        assert_eq!((modify.order_id, modify.qty, modify.priority), (1, 70, 1));

        assert_eq!(book.order_count(), 1);
        assert_eq!(book.depth_at(Side::Sell, 10000), (70, 1));
    }

    #[test]
    fn test_price_time_priority() {
        let mut book = book();
        let mut events = Vec::new();
        book.add(&mut events, CLIENT_A, 1, Side::Sell, 101, 10);
        book.add(&mut events, CLIENT_A, 2, Side::Sell, 100, 10);
        book.add(&mut events, CLIENT_A, 3, Side::Sell, 100, 10);

        events.clear();
        book.add(&mut events, CLIENT_B, 4, Side::Buy, 101, 20);

        let passive_fills: Vec<_> = responses(&events)
            .into_iter()
            .filter(|r| r.kind == ClientResponseType::Filled && r.client_id == CLIENT_A)
            .map(|r| r.order_id)
            .collect();
        assert_eq!(passive_fills, vec![2, 3]);

        // 101 untouched
        assert_eq!(book.best_ask(), Some(101));
        assert_eq!(book.depth_at(Side::Sell, 101), (10, 1));
        assert!(book.order(4).is_none());
    }

    #[test]
    fn test_match_multiple_levels() {
        let mut book = book();
        let mut events = Vec::new();
        book.add(&mut events, CLIENT_A, 1, Side::Sell, 10000, 50);
        book.add(&mut events, CLIENT_A, 2, Side::Sell, 10010, 50);
        book.add(&mut events, CLIENT_A, 3, Side::Sell, 10020, 50);

        events.clear();
        book.add(&mut events, CLIENT_B, 4, Side::Buy, 10020, 120);

        let t = trades(&events);
        assert_eq!(t.len(), 3);
        assert_eq!((t[0].price, t[0].qty), (10000, 50));
        assert_eq!((t[1].price, t[1].qty), (10010, 50));
        assert_eq!((t[2].price, t[2].qty), (10020, 20));

        // 30 remaining at 10020
        assert_eq!(book.order_count(), 1);
        assert_eq!(book.best_ask(), Some(10020));
    }

    #[test]
    fn test_sell_aggressor_trades_at_passive_price() {
        let mut book = book();
        let mut events = Vec::new();
        book.add(&mut events, CLIENT_A, 1, Side::Buy, 105, 10);

        events.clear();
        book.add(&mut events, CLIENT_B, 2, Side::Sell, 100, 10);

        let t = trades(&events);
        assert_eq!((t[0].price, t[0].side), (105, Side::Sell));
    }

    #[test]
    fn test_no_cross_rests_both_sides() {
        let mut book = book();
        let mut events = Vec::new();
        book.add(&mut events, CLIENT_A, 1, Side::Buy, 99, 10);
        book.add(&mut events, CLIENT_B, 2, Side::Sell, 100, 10);

        assert!(trades(&events).is_empty());
        assert_eq!(book.spread(), Some(1));
    }

    #[test]
    fn test_cancel_order() {
        let mut book = book();
        let mut events = Vec::new();
        book.add(&mut events, CLIENT_A, 1, Side::Buy, 10000, 100);
        book.add(&mut events, CLIENT_A, 2, Side::Buy, 10000, 50);

        events.clear();
        book.cancel(&mut events, CLIENT_A, 1);

        assert_eq!(events.len(), 2);
        let r = responses(&events);
        assert_eq!(r[0].kind, ClientResponseType::Canceled);
        assert_eq!((r[0].exec_qty, r[0].leaves_qty), (0, 100));

        let u = updates(&events);
        assert_eq!(u[0].kind, MarketUpdateType::Cancel);
        assert_eq!((u[0].order_id, u[0].priority), (1, 1));

        assert_eq!(book.depth_at(Side::Buy, 10000), (50, 1));
    }

    #[test]
    fn test_cancel_nonexistent_leaves_book_unchanged() {
        let mut book = book();
        let mut events = Vec::new();
        book.add(&mut events, CLIENT_A, 1, Side::Buy, 10000, 100);
        let before = book.state_hash();

        events.clear();
        book.cancel(&mut events, CLIENT_A, 999);

        assert_eq!(events.len(), 1);
        let r = responses(&events);
        assert_eq!(r[0].kind, ClientResponseType::CancelRejected);
        assert_eq!(r[0].order_id, 999);
        assert_eq!(book.state_hash(), before);
    }

    #[test]
    fn test_cancel_by_other_client_rejected() {
        let mut book = book();
        let mut events = Vec::new();
        book.add(&mut events, CLIENT_A, 1, Side::Buy, 10000, 100);

        events.clear();
        book.cancel(&mut events, CLIENT_B, 1);

        assert_eq!(responses(&events)[0].kind, ClientResponseType::CancelRejected);
        assert!(book.contains_order(1));
    }

    #[test]
    fn test_duplicate_order_id() {
        let mut book = book();
        let mut events = Vec::new();
        book.add(&mut events, CLIENT_A, 1, Side::Buy, 10000, 100);

        events.clear();
        book.add(&mut events, CLIENT_B, 1, Side::Sell, 10100, 50);

        assert_eq!(events.len(), 1);
        assert_eq!(responses(&events)[0].kind, ClientResponseType::Invalid);
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut book = book();
        let mut events = Vec::new();
        book.add(&mut events, CLIENT_A, 1, Side::Buy, 10000, 0);

        assert_eq!(events.len(), 1);
        assert_eq!(responses(&events)[0].kind, ClientResponseType::Invalid);
        assert!(book.is_empty());
    }

    #[test]
    fn test_invalid_side_rejected() {
        let mut book = book();
        let mut events = Vec::new();
        book.add(&mut events, CLIENT_A, 1, Side::Invalid, 10000, 10);
        assert_eq!(responses(&events)[0].kind, ClientResponseType::Invalid);
        assert!(book.is_empty());
    }

    #[test]
    fn test_priority_continues_after_fills() {
        let mut book = book();
        let mut events = Vec::new();
        book.add(&mut events, CLIENT_A, 1, Side::Sell, 100, 10);
        book.add(&mut events, CLIENT_A, 2, Side::Sell, 100, 10);
        book.add(&mut events, CLIENT_B, 3, Side::Buy, 100, 10);

        events.clear();
        book.add(&mut events, CLIENT_A, 4, Side::Sell, 100, 10);
        let add = updates(&events)[0];
        assert_eq!(add.priority, 3);
    }
}
