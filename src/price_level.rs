//! Price Level - A FIFO queue of orders at a single price point.
//!
//! Orders at one price form a doubly-linked list threaded through slab
//! indices (O(1) append, pop and removal from any position). Price levels
//! are themselves slab nodes, linked into a per-side list kept in strict
//! price order: best price first.

use crate::slab::{SlabAllocator, SlabIndex, NULL_INDEX};
use crate::types::{
    ClientId, OrderId, Price, Priority, Qty, Side, TickerId, CLIENT_ID_INVALID, ORDER_ID_INVALID,
    PRICE_INVALID, PRIORITY_INVALID, QTY_INVALID, TICKER_ID_INVALID,
};

/// A resting order, owned by exactly one order book.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderEntry {
    pub ticker_id: TickerId,
    pub client_id: ClientId,
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    /// Remaining quantity to fill
    pub qty: Qty,
    /// Arrival rank within the price level (1 = first)
    pub priority: Priority,

    // === Linkage (FIFO queue pointers within a PriceLevel) ===
    /// Index of next order at same price level
    pub next: SlabIndex,
    /// Index of previous order (enables O(1) cancel)
    pub prev: SlabIndex,
}

impl OrderEntry {
    #[inline]
    pub fn new(
        ticker_id: TickerId,
        client_id: ClientId,
        order_id: OrderId,
        side: Side,
        price: Price,
        qty: Qty,
    ) -> Self {
        Self {
            ticker_id,
            client_id,
            order_id,
            side,
            price,
            qty,
            priority: PRIORITY_INVALID,
            next: NULL_INDEX,
            prev: NULL_INDEX,
        }
    }
}

impl Default for OrderEntry {
    fn default() -> Self {
        Self::new(
            TICKER_ID_INVALID,
            CLIENT_ID_INVALID,
            ORDER_ID_INVALID,
            Side::Invalid,
            PRICE_INVALID,
            QTY_INVALID,
        )
    }
}

/// A queue of orders at a specific price level.
///
/// Orders are processed in FIFO order (price-time priority).
#[derive(Clone, Copy, Debug)]
pub struct PriceLevel {
    pub side: Side,
    pub price: Price,
    /// Index of the oldest order (highest priority, first to match)
    pub head: SlabIndex,
    /// Index of the newest order (last to match)
    pub tail: SlabIndex,
    /// Total quantity across all orders at this level
    pub total_qty: u64,
    /// Number of orders at this level
    pub count: u32,
    /// Next better price level on the same side
    pub better: SlabIndex,
    /// Next worse price level on the same side
    pub worse: SlabIndex,
}

impl PriceLevel {
    /// Create a new empty price level
    #[inline]
    pub const fn new(side: Side, price: Price) -> Self {
        Self {
            side,
            price,
            head: NULL_INDEX,
            tail: NULL_INDEX,
            total_qty: 0,
            count: 0,
            better: NULL_INDEX,
            worse: NULL_INDEX,
        }
    }

    /// Returns true if there are no orders at this level
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether `price` on this level's side ranks ahead of this level.
    #[inline]
    pub fn is_beaten_by(&self, price: Price) -> bool {
        match self.side {
            Side::Buy => price > self.price,
            Side::Sell => price < self.price,
            Side::Invalid => false,
        }
    }

    /// Priority the next appended order receives.
    #[inline]
    pub fn next_priority(&self, orders: &SlabAllocator<OrderEntry>) -> Priority {
        if self.tail == NULL_INDEX {
            1
        } else {
            orders.get(self.tail).priority + 1
        }
    }

    /// Append an order to the tail of the queue (newest order).
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub fn push_back(&mut self, orders: &mut SlabAllocator<OrderEntry>, index: SlabIndex) {
        let qty = orders.get(index).qty;

        if self.tail == NULL_INDEX {
            // Empty list: new node becomes both head and tail
            debug_assert!(self.head == NULL_INDEX);
            self.head = index;
            let node = orders.get_mut(index);
            node.prev = NULL_INDEX;
            node.next = NULL_INDEX;
        } else {
            // Append to existing tail
            orders.get_mut(self.tail).next = index;
            let node = orders.get_mut(index);
            node.prev = self.tail;
            node.next = NULL_INDEX;
        }
        self.tail = index;

        self.count += 1;
        self.total_qty += qty as u64;
    }

    /// Remove an order from anywhere in the queue.
    ///
    /// The order is NOT freed from the slab; caller must do that.
    ///
    /// # Returns
    /// `true` if the level is now empty, `false` otherwise.
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub fn remove(&mut self, orders: &mut SlabAllocator<OrderEntry>, index: SlabIndex) -> bool {
        let node = orders.get(index);
        let prev_idx = node.prev;
        let next_idx = node.next;
        let qty = node.qty;

        if prev_idx == NULL_INDEX {
            debug_assert!(self.head == index);
            self.head = next_idx;
        } else {
            orders.get_mut(prev_idx).next = next_idx;
        }

        if next_idx == NULL_INDEX {
            debug_assert!(self.tail == index);
            self.tail = prev_idx;
        } else {
            orders.get_mut(next_idx).prev = prev_idx;
        }

        self.count -= 1;
        self.total_qty -= qty as u64;

        // Clear the removed node's linkage
        let node = orders.get_mut(index);
        node.prev = NULL_INDEX;
        node.next = NULL_INDEX;

        self.count == 0
    }

    /// Peek at the head order without removing it.
    #[inline]
    pub const fn peek_head(&self) -> SlabIndex {
        self.head
    }

    /// Update total quantity after a partial fill.
    ///
    /// Call this after reducing an order's qty directly.
    #[inline]
    pub fn subtract_qty(&mut self, qty: Qty) {
        debug_assert!(self.total_qty >= qty as u64);
        self.total_qty -= qty as u64;
    }
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self::new(Side::Invalid, PRICE_INVALID)
    }
}
