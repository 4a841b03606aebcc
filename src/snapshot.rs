//! Exchange-side market data: sequenced incremental publishing and
//! periodic full-book snapshots.
//!
//! The matching engine's [`MarketUpdate`]s carry no sequence numbers.
//! [`IncrementalPublisher`] stamps them (starting at 1) and hands each to
//! the wire and to a [`SnapshotSynthesizer`], which mirrors the live orders
//! so it can describe the whole book as of a given incremental sequence.
//!
//! A snapshot cycle is numbered from 0:
//!
//! | seq   | record                                             |
//! |-------|----------------------------------------------------|
//! | 0     | `SNAPSHOT_START`, `order_id` = last incremental seq |
//! | 1..   | per ticker: `CLEAR`, then one `ADD` per live order  |
//! | last  | `SNAPSHOT_END`, `order_id` = same incremental seq   |

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::command::{MarketUpdate, MarketUpdateType, MdpMarketUpdate};
use crate::engine::RUN_BATCH;
use crate::ring::{RingReader, RingWriter};
use crate::runtime::RunFlag;
use crate::slab::{SlabAllocator, SlabIndex};
use crate::types::{
    OrderId, Side, TickerId, ORDER_ID_INVALID, PRICE_INVALID, PRIORITY_INVALID, QTY_INVALID,
    TICKER_ID_INVALID,
};

/// Stamps engine market updates with incremental sequence numbers.
#[derive(Debug)]
pub struct IncrementalPublisher {
    updates: RingReader<MarketUpdate>,
    synthesizer: RingWriter<MdpMarketUpdate>,
    next_seq: u64,
}

impl IncrementalPublisher {
    pub fn new(updates: RingReader<MarketUpdate>, synthesizer: RingWriter<MdpMarketUpdate>) -> Self {
        Self {
            updates,
            synthesizer,
            next_seq: 1,
        }
    }

    /// Sequence number the next update will carry.
    #[inline]
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Publish every pending update to `wire` and the synthesizer.
    ///
    /// # Returns
    /// Number of updates published
    pub fn poll<F: FnMut(&MdpMarketUpdate)>(&mut self, mut wire: F) -> usize {
        let mut published = 0;
        while let Some(update) = self.updates.pop() {
            let msg = MdpMarketUpdate {
                seq_num: self.next_seq,
                update,
            };
            wire(&msg);
            self.synthesizer.push(msg);
            self.next_seq += 1;
            published += 1;
        }
        published
    }
}

/// Mirror of live orders, rebuilt from the incremental stream.
pub struct SnapshotSynthesizer {
    incoming: RingReader<MdpMarketUpdate>,
    pool: SlabAllocator<MarketUpdate>,
    /// Per ticker: order id -> pooled ADD record
    orders: Vec<FxHashMap<OrderId, SlabIndex>>,
    last_inc_seq: u64,
}

impl SnapshotSynthesizer {
    /// `capacity` bounds the live orders across all tickers.
    pub fn new(incoming: RingReader<MdpMarketUpdate>, max_tickers: usize, capacity: u32) -> Self {
        Self {
            incoming,
            pool: SlabAllocator::new(capacity),
            orders: vec![FxHashMap::default(); max_tickers],
            last_inc_seq: 0,
        }
    }

    /// Last incremental sequence applied.
    #[inline]
    pub fn last_inc_seq(&self) -> u64 {
        self.last_inc_seq
    }

    pub fn live_orders(&self, ticker_id: TickerId) -> usize {
        self.orders.get(ticker_id as usize).map_or(0, |m| m.len())
    }

    /// Apply one incremental update.
    ///
    /// # Panics
    /// Panics if the sequence is not contiguous with the last one applied,
    /// or the update contradicts the mirrored book (ADD of a live id,
    /// MODIFY/CANCEL of an unknown one).
    pub fn apply(&mut self, msg: &MdpMarketUpdate) {
        assert_eq!(
            msg.seq_num,
            self.last_inc_seq + 1,
            "Snapshot synthesizer received out-of-order incremental {msg}"
        );
        let update = msg.update;

        match update.kind {
            MarketUpdateType::Add => {
                let book = &mut self.orders[update.ticker_id as usize];
                assert!(
                    !book.contains_key(&update.order_id),
                    "Received ADD for live order: {update}"
                );
                let index = self.pool.allocate(update);
                book.insert(update.order_id, index);
            }
            MarketUpdateType::Modify => {
                let book = &self.orders[update.ticker_id as usize];
                let Some(&index) = book.get(&update.order_id) else {
                    panic!("Received MODIFY for unknown order: {update}");
                };
                let order = self.pool.get_mut(index);
                order.qty = update.qty;
                order.price = update.price;
            }
            MarketUpdateType::Cancel => {
                let book = &mut self.orders[update.ticker_id as usize];
                let Some(index) = book.remove(&update.order_id) else {
                    panic!("Received CANCEL for unknown order: {update}");
                };
                self.pool.deallocate(index);
            }
            MarketUpdateType::Trade
            | MarketUpdateType::Clear
            | MarketUpdateType::SnapshotStart
            | MarketUpdateType::SnapshotEnd
            | MarketUpdateType::Invalid => {}
        }

        self.last_inc_seq = msg.seq_num;
    }

    /// Apply every pending incremental update.
    pub fn poll(&mut self) -> usize {
        self.poll_batch(usize::MAX)
    }

    /// Apply at most `max` pending incremental updates.
    pub fn poll_batch(&mut self, max: usize) -> usize {
        let mut applied = 0;
        while applied < max {
            let Some(msg) = self.incoming.pop() else {
                break;
            };
            self.apply(&msg);
            applied += 1;
        }
        applied
    }

    /// Emit one full snapshot cycle.
    ///
    /// # Returns
    /// Number of records emitted
    pub fn publish_snapshot<F: FnMut(&MdpMarketUpdate)>(&self, mut emit: F) -> u64 {
        let mut seq = 0;
        let mut send = |update: MarketUpdate| {
            emit(&MdpMarketUpdate {
                seq_num: seq,
                update,
            });
            seq += 1;
        };

        send(marker(MarketUpdateType::SnapshotStart, self.last_inc_seq, TICKER_ID_INVALID));

        for (ticker_id, book) in self.orders.iter().enumerate() {
            send(marker(MarketUpdateType::Clear, ORDER_ID_INVALID, ticker_id as TickerId));

            let mut ids: Vec<_> = book.iter().map(|(&id, &index)| (id, index)).collect();
            ids.sort_unstable_by_key(|&(id, _)| id);
            for (_, index) in ids {
                send(*self.pool.get(index));
            }
        }

        send(marker(MarketUpdateType::SnapshotEnd, self.last_inc_seq, TICKER_ID_INVALID));

        debug!(records = seq, last_inc_seq = self.last_inc_seq, "published snapshot");
        seq
    }

    /// Apply incrementals continuously and emit a snapshot every `interval`.
    pub fn run<F: FnMut(&MdpMarketUpdate)>(&mut self, run: &RunFlag, interval: Duration, mut emit: F) {
        info!(?interval, "snapshot synthesizer running");
        let mut last_snapshot = Instant::now();
        while run.is_running() {
            if self.poll_batch(RUN_BATCH) == 0 {
                std::hint::spin_loop();
            }
            if last_snapshot.elapsed() >= interval {
                self.publish_snapshot(&mut emit);
                last_snapshot = Instant::now();
            }
        }
        info!(last_inc_seq = self.last_inc_seq, "snapshot synthesizer stopped");
    }
}

impl std::fmt::Debug for SnapshotSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotSynthesizer")
            .field("last_inc_seq", &self.last_inc_seq)
            .field("pool", &self.pool)
            .finish()
    }
}

/// Cycle framing record with no side, price or qty.
fn marker(kind: MarketUpdateType, order_id: OrderId, ticker_id: TickerId) -> MarketUpdate {
    MarketUpdate::new(
        kind,
        order_id,
        ticker_id,
        Side::Invalid,
        PRICE_INVALID,
        QTY_INVALID,
        PRIORITY_INVALID,
    )
}
