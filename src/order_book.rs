//! Order Book - per-instrument limit order book data structure.
//!
//! Price levels live in a slab and are linked per side in strict price
//! order (descending bids, ascending asks), so the best level is always the
//! list head. Two FxHashMaps give O(1) level lookup by price and order
//! lookup by id. The matching algorithm itself lives in `matching`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use arrayvec::ArrayVec;
use rustc_hash::FxHashMap;

use crate::price_level::{OrderEntry, PriceLevel};
use crate::slab::{SlabAllocator, SlabIndex, NULL_INDEX};
use crate::types::{OrderId, Price, Qty, Side, TickerId};

/// Price-time priority book for one instrument.
///
/// Composition, not inheritance: the containers are private and the public
/// surface is the handful of queries the engine and its tests need.
pub struct OrderBook {
    ticker_id: TickerId,
    /// Resting orders
    orders: SlabAllocator<OrderEntry>,
    /// Price level nodes for both sides
    levels: SlabAllocator<PriceLevel>,
    bid_levels: FxHashMap<Price, SlabIndex>,
    ask_levels: FxHashMap<Price, SlabIndex>,
    /// Head of the bid level list (highest price)
    best_bid: SlabIndex,
    /// Head of the ask level list (lowest price)
    best_ask: SlabIndex,
    /// Order lookup map: OrderId -> slab index
    order_map: FxHashMap<OrderId, SlabIndex>,
}

impl OrderBook {
    /// Create an empty book with pre-allocated order and level pools.
    pub fn new(ticker_id: TickerId, max_orders: u32, max_price_levels: u32) -> Self {
        let levels_per_side = max_price_levels as usize;
        Self {
            ticker_id,
            orders: SlabAllocator::new(max_orders),
            levels: SlabAllocator::new(max_price_levels),
            bid_levels: FxHashMap::with_capacity_and_hasher(levels_per_side, Default::default()),
            ask_levels: FxHashMap::with_capacity_and_hasher(levels_per_side, Default::default()),
            best_bid: NULL_INDEX,
            best_ask: NULL_INDEX,
            order_map: FxHashMap::with_capacity_and_hasher(max_orders as usize, Default::default()),
        }
    }

    #[inline]
    pub fn ticker_id(&self) -> TickerId {
        self.ticker_id
    }

    // ========================================================================
    // Best Price Access
    // ========================================================================

    /// Get the best bid price (highest buy price)
    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.best_price(Side::Buy)
    }

    /// Get the best ask price (lowest sell price)
    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.best_price(Side::Sell)
    }

    /// Get the best price on a given side
    #[inline]
    pub fn best_price(&self, side: Side) -> Option<Price> {
        self.best_level(side).map(|level| level.price)
    }

    /// Get the best level on a given side
    #[inline]
    pub fn best_level(&self, side: Side) -> Option<&PriceLevel> {
        match self.best_level_index(side) {
            NULL_INDEX => None,
            index => Some(self.levels.get(index)),
        }
    }

    #[inline]
    pub(crate) fn best_level_index(&self, side: Side) -> SlabIndex {
        match side {
            Side::Buy => self.best_bid,
            Side::Sell => self.best_ask,
            Side::Invalid => NULL_INDEX,
        }
    }

    /// Calculate spread (best_ask - best_bid)
    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if ask > bid => Some(ask - bid),
            _ => None,
        }
    }

    // ========================================================================
    // Level Access
    // ========================================================================

    #[inline]
    fn level_map(&self, side: Side) -> Option<&FxHashMap<Price, SlabIndex>> {
        match side {
            Side::Buy => Some(&self.bid_levels),
            Side::Sell => Some(&self.ask_levels),
            Side::Invalid => None,
        }
    }

    /// Get a price level (immutable)
    #[inline]
    pub fn level(&self, side: Side, price: Price) -> Option<&PriceLevel> {
        let index = *self.level_map(side)?.get(&price)?;
        Some(self.levels.get(index))
    }

    #[inline]
    pub(crate) fn level_at(&self, index: SlabIndex) -> &PriceLevel {
        self.levels.get(index)
    }

    /// Get depth at a price level: (total quantity, order count)
    pub fn depth_at(&self, side: Side, price: Price) -> (u64, u32) {
        self.level(side, price)
            .map(|l| (l.total_qty, l.count))
            .unwrap_or((0, 0))
    }

    /// Iterate one side's levels from best to worst price.
    pub fn levels(&self, side: Side) -> impl Iterator<Item = &PriceLevel> + '_ {
        let mut cursor = self.best_level_index(side);
        std::iter::from_fn(move || {
            if cursor == NULL_INDEX {
                return None;
            }
            let level = self.levels.get(cursor);
            cursor = level.worse;
            Some(level)
        })
    }

    /// Aggregated (price, quantity, order count) of the best `N` levels,
    /// without heap allocation.
    pub fn top_levels<const N: usize>(&self, side: Side) -> ArrayVec<(Price, u64, u32), N> {
        self.levels(side)
            .take(N)
            .map(|l| (l.price, l.total_qty, l.count))
            .collect()
    }

    /// Iterate the orders of one level in time priority.
    pub fn orders_at<'a>(&'a self, level: &PriceLevel) -> impl Iterator<Item = &'a OrderEntry> + 'a {
        let mut cursor = level.head;
        std::iter::from_fn(move || {
            if cursor == NULL_INDEX {
                return None;
            }
            let order = self.orders.get(cursor);
            cursor = order.next;
            Some(order)
        })
    }

    /// Get or create the level for `price`, linking new levels into the
    /// side's sorted list.
    fn get_or_create_level(&mut self, side: Side, price: Price) -> SlabIndex {
        let existing = match side {
            Side::Buy => self.bid_levels.get(&price),
            Side::Sell => self.ask_levels.get(&price),
            Side::Invalid => panic!("Price level requested for INVALID side"),
        };
        if let Some(&index) = existing {
            return index;
        }

        let index = self.levels.allocate(PriceLevel::new(side, price));
        self.link_level(side, index, price);
        match side {
            Side::Buy => self.bid_levels.insert(price, index),
            _ => self.ask_levels.insert(price, index),
        };
        index
    }

    /// Insert a level between the last level that beats `price` and the
    /// first one `price` beats.
    fn link_level(&mut self, side: Side, index: SlabIndex, price: Price) {
        let mut better = NULL_INDEX;
        let mut worse = self.best_level_index(side);
        while worse != NULL_INDEX && !self.levels.get(worse).is_beaten_by(price) {
            better = worse;
            worse = self.levels.get(worse).worse;
        }

        let level = self.levels.get_mut(index);
        level.better = better;
        level.worse = worse;

        if better == NULL_INDEX {
            self.set_best(side, index);
        } else {
            self.levels.get_mut(better).worse = index;
        }
        if worse != NULL_INDEX {
            self.levels.get_mut(worse).better = index;
        }
    }

    /// Unlink an empty level and return its node to the pool.
    fn remove_level(&mut self, index: SlabIndex) {
        let level = *self.levels.get(index);
        debug_assert!(level.is_empty());

        if level.better == NULL_INDEX {
            self.set_best(level.side, level.worse);
        } else {
            self.levels.get_mut(level.better).worse = level.worse;
        }
        if level.worse != NULL_INDEX {
            self.levels.get_mut(level.worse).better = level.better;
        }

        match level.side {
            Side::Buy => self.bid_levels.remove(&level.price),
            _ => self.ask_levels.remove(&level.price),
        };
        self.levels.deallocate(index);
    }

    #[inline]
    fn set_best(&mut self, side: Side, index: SlabIndex) {
        match side {
            Side::Buy => self.best_bid = index,
            _ => self.best_ask = index,
        }
    }

    // ========================================================================
    // Order Management
    // ========================================================================

    /// Look up a resting order by ID.
    #[inline]
    pub fn order(&self, order_id: OrderId) -> Option<&OrderEntry> {
        self.order_map.get(&order_id).map(|&index| self.orders.get(index))
    }

    /// Check if an order exists.
    #[inline]
    pub fn contains_order(&self, order_id: OrderId) -> bool {
        self.order_map.contains_key(&order_id)
    }

    #[inline]
    pub(crate) fn order_index(&self, order_id: OrderId) -> Option<SlabIndex> {
        self.order_map.get(&order_id).copied()
    }

    #[inline]
    pub(crate) fn order_at(&self, index: SlabIndex) -> &OrderEntry {
        self.orders.get(index)
    }

    /// Rest an order at the back of its price level.
    ///
    /// Assigns the entry's priority and returns its slab index. The caller
    /// guarantees the order id is not already resting.
    pub fn insert_order(&mut self, mut entry: OrderEntry) -> SlabIndex {
        debug_assert!(!self.order_map.contains_key(&entry.order_id));

        let level_index = self.get_or_create_level(entry.side, entry.price);
        entry.priority = self.levels.get(level_index).next_priority(&self.orders);
        entry.ticker_id = self.ticker_id;

        let index = self.orders.allocate(entry);
        self.levels.get_mut(level_index).push_back(&mut self.orders, index);
        self.order_map.insert(entry.order_id, index);
        index
    }

    /// Remove a resting order by slab index, dropping its level if emptied.
    pub(crate) fn remove_order_at(&mut self, index: SlabIndex) -> OrderEntry {
        let entry = *self.orders.get(index);
        let level_index = match self.level_map(entry.side).and_then(|m| m.get(&entry.price)) {
            Some(&level_index) => level_index,
            None => panic!(
                "Order {} rests at price {} with no price level",
                entry.order_id, entry.price
            ),
        };

        if self.levels.get_mut(level_index).remove(&mut self.orders, index) {
            self.remove_level(level_index);
        }
        self.order_map.remove(&entry.order_id);
        self.orders.deallocate(index)
    }

    /// Remove a resting order by id.
    pub fn remove_order(&mut self, order_id: OrderId) -> Option<OrderEntry> {
        let index = self.order_index(order_id)?;
        Some(self.remove_order_at(index))
    }

    /// Reduce a resting order's quantity after a partial fill.
    pub(crate) fn reduce_qty(&mut self, index: SlabIndex, fill_qty: Qty) {
        let entry = self.orders.get_mut(index);
        debug_assert!(entry.qty > fill_qty);
        entry.qty -= fill_qty;
        let (side, price) = (entry.side, entry.price);

        if let Some(&level_index) = self.level_map(side).and_then(|m| m.get(&price)) {
            self.levels.get_mut(level_index).subtract_qty(fill_qty);
        }
    }

    // ========================================================================
    // Utility Methods
    // ========================================================================

    /// Get the total number of orders in the book
    pub fn order_count(&self) -> usize {
        self.order_map.len()
    }

    /// Get the number of bid levels
    pub fn bid_level_count(&self) -> usize {
        self.bid_levels.len()
    }

    /// Get the number of ask levels
    pub fn ask_level_count(&self) -> usize {
        self.ask_levels.len()
    }

    /// Check if the book is empty
    pub fn is_empty(&self) -> bool {
        self.order_map.is_empty()
    }

    /// Pre-fault the order and level pools.
    pub fn warm_up(&mut self) {
        self.orders.warm_up();
        self.levels.warm_up();
    }

    /// Compute a hash of the current state (for determinism testing)
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        for side in [Side::Buy, Side::Sell] {
            for level in self.levels(side) {
                level.price.hash(&mut hasher);
                level.total_qty.hash(&mut hasher);
                for order in self.orders_at(level) {
                    order.order_id.hash(&mut hasher);
                    order.qty.hash(&mut hasher);
                    order.priority.hash(&mut hasher);
                }
            }
        }
        self.order_map.len().hash(&mut hasher);

        hasher.finish()
    }
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("ticker_id", &self.ticker_id)
            .field("best_bid", &self.best_bid())
            .field("best_ask", &self.best_ask())
            .field("bid_levels", &self.bid_levels.len())
            .field("ask_levels", &self.ask_levels.len())
            .field("order_count", &self.order_map.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(order_id: OrderId, side: Side, price: Price, qty: Qty) -> OrderEntry {
        OrderEntry::new(0, 1, order_id, side, price, qty)
    }

    fn prices(book: &OrderBook, side: Side) -> Vec<Price> {
        book.levels(side).map(|l| l.price).collect()
    }

    #[test]
    fn test_empty_book() {
        let book = OrderBook::new(0, 100, 16);
        assert!(book.is_empty());
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.spread(), None);
    }

    #[test]
    fn test_levels_kept_in_price_order() {
        let mut book = OrderBook::new(0, 100, 16);

        for (id, price) in [(1, 100), (2, 105), (3, 95), (4, 102)] {
            book.insert_order(entry(id, Side::Buy, price, 10));
        }
        for (id, price) in [(5, 110), (6, 108), (7, 120), (8, 109)] {
            book.insert_order(entry(id, Side::Sell, price, 10));
        }

        assert_eq!(prices(&book, Side::Buy), vec![105, 102, 100, 95]);
        assert_eq!(prices(&book, Side::Sell), vec![108, 109, 110, 120]);
        let top = book.top_levels::<2>(Side::Buy);
        assert_eq!(top.as_slice(), &[(105, 10, 1), (102, 10, 1)]);
        assert_eq!(book.best_bid(), Some(105));
        assert_eq!(book.best_ask(), Some(108));
        assert_eq!(book.spread(), Some(3));
    }

    #[test]
    fn test_priority_assigned_per_level() {
        let mut book = OrderBook::new(0, 100, 16);
        book.insert_order(entry(1, Side::Buy, 100, 10));
        book.insert_order(entry(2, Side::Buy, 100, 20));
        book.insert_order(entry(3, Side::Buy, 99, 30));

        assert_eq!(book.order(1).unwrap().priority, 1);
        assert_eq!(book.order(2).unwrap().priority, 2);
        assert_eq!(book.order(3).unwrap().priority, 1);
        assert_eq!(book.depth_at(Side::Buy, 100), (30, 2));
    }

    #[test]
    fn test_remove_order_drops_empty_levels() {
        let mut book = OrderBook::new(0, 100, 16);
        book.insert_order(entry(1, Side::Buy, 105, 10));
        book.insert_order(entry(2, Side::Buy, 100, 10));
        book.insert_order(entry(3, Side::Buy, 95, 10));

        // Remove best
        let removed = book.remove_order(1).unwrap();
        assert_eq!(removed.price, 105);
        assert_eq!(book.best_bid(), Some(100));

        // Remove from the middle of the list
        book.insert_order(entry(4, Side::Buy, 101, 10));
        book.remove_order(2);
        assert_eq!(prices(&book, Side::Buy), vec![101, 95]);

        book.remove_order(4);
        book.remove_order(3);
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.bid_level_count(), 0);
        assert!(book.is_empty());
    }

    #[test]
    fn test_remove_nonexistent_order() {
        let mut book = OrderBook::new(0, 100, 16);
        assert!(book.remove_order(999).is_none());
    }

    #[test]
    fn test_orders_at_level_in_fifo_order() {
        let mut book = OrderBook::new(0, 100, 16);
        for id in 1..=3 {
            book.insert_order(entry(id, Side::Sell, 100, id as Qty));
        }
        book.remove_order(2);

        let level = book.level(Side::Sell, 100).unwrap();
        let ids: Vec<_> = book.orders_at(level).map(|o| o.order_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_reduce_qty_updates_level_total() {
        let mut book = OrderBook::new(0, 100, 16);
        let index = book.insert_order(entry(1, Side::Sell, 100, 50));
        book.reduce_qty(index, 20);
        assert_eq!(book.order(1).unwrap().qty, 30);
        assert_eq!(book.depth_at(Side::Sell, 100), (30, 1));
    }

    #[test]
    fn test_level_pool_reused() {
        let mut book = OrderBook::new(0, 100, 2);
        for round in 0..10 {
            book.insert_order(entry(round, Side::Buy, 100 + round as Price, 1));
            book.remove_order(round);
        }
        assert!(book.is_empty());
    }

    #[test]
    fn test_state_hash_tracks_contents() {
        let mut a = OrderBook::new(0, 100, 16);
        let mut b = OrderBook::new(0, 100, 16);
        a.insert_order(entry(1, Side::Buy, 100, 10));
        b.insert_order(entry(1, Side::Buy, 100, 10));
        assert_eq!(a.state_hash(), b.state_hash());

        b.insert_order(entry(2, Side::Buy, 100, 10));
        assert_ne!(a.state_hash(), b.state_hash());
    }
}
