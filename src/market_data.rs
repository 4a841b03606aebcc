//! Market data consumer - gap detection and snapshot recovery.
//!
//! Incremental records are republished downstream strictly in sequence
//! order. A sequence gap switches the consumer to RECOVERING: it subscribes
//! to the snapshot stream and buffers both streams by sequence number until
//! a complete snapshot plus a contiguous incremental tail is available, then
//! publishes the snapshot body followed by the tail and returns to NORMAL.

use std::collections::BTreeMap;
use std::fmt;
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::command::{MarketUpdate, MarketUpdateType, MdpMarketUpdate};
use crate::error::Result;
use crate::net::FeedSocket;
use crate::ring::RingWriter;
use crate::runtime::{spawn_pinned, RunFlag};
use crate::types::Logged;

/// Which multicast stream a record arrived on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedKind {
    Incremental,
    Snapshot,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FeedKind::Incremental => "incremental",
            FeedKind::Snapshot => "snapshot",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RecoveryState {
    #[default]
    Normal,
    Recovering,
}

/// Sequence number -> buffered update, used only while recovering.
pub type QueuedMarketUpdates = BTreeMap<u64, MarketUpdate>;

/// Receive buffer large enough for one datagram of whole records.
const RECV_BUFFER_SIZE: usize = 64 * 1024;

pub struct MarketDataConsumer {
    next_expected: u64,
    state: RecoveryState,
    updates: RingWriter<MarketUpdate>,
    snapshot_queue: QueuedMarketUpdates,
    incremental_queue: QueuedMarketUpdates,
}

impl MarketDataConsumer {
    /// Create a consumer publishing in-order updates to `updates`.
    pub fn new(updates: RingWriter<MarketUpdate>) -> Self {
        Self {
            next_expected: 1,
            state: RecoveryState::Normal,
            updates,
            snapshot_queue: QueuedMarketUpdates::new(),
            incremental_queue: QueuedMarketUpdates::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> RecoveryState {
        self.state
    }

    #[inline]
    pub fn is_recovering(&self) -> bool {
        self.state == RecoveryState::Recovering
    }

    /// Next incremental sequence number to publish.
    #[inline]
    pub fn next_expected_seq(&self) -> u64 {
        self.next_expected
    }

    /// Handle one decoded feed record.
    pub fn on_message(&mut self, feed: FeedKind, msg: &MdpMarketUpdate) {
        match (self.state, feed) {
            (RecoveryState::Normal, FeedKind::Snapshot) => {
                debug!(seq = msg.seq_num, "in sync; discarding snapshot record");
                return;
            }
            (RecoveryState::Normal, FeedKind::Incremental) => {
                if msg.seq_num == self.next_expected {
                    self.publish(&msg.update);
                    self.next_expected += 1;
                    return;
                }
                if msg.seq_num < self.next_expected {
                    warn!(
                        seq = msg.seq_num,
                        expected = self.next_expected,
                        "duplicate incremental record dropped"
                    );
                    return;
                }
                warn!(
                    seq = msg.seq_num,
                    expected = self.next_expected,
                    "sequence gap; entering recovery"
                );
                self.state = RecoveryState::Recovering;
                self.snapshot_queue.clear();
                self.incremental_queue.clear();
            }
            (RecoveryState::Recovering, _) => {}
        }

        self.queue_message(feed, msg);
        self.check_snapshot_sync();
    }

    /// Decode and handle every whole record in `buf`.
    ///
    /// # Returns
    /// Bytes consumed; a trailing partial record is left to the caller.
    pub fn on_bytes(&mut self, feed: FeedKind, buf: &[u8]) -> usize {
        let mut consumed = 0;
        for record in buf.chunks_exact(MdpMarketUpdate::WIRE_SIZE) {
            match MdpMarketUpdate::from_bytes(record) {
                Ok(msg) => self.on_message(feed, &msg),
                Err(e) => warn!(%feed, offset = consumed, error = %e, "skipping malformed record"),
            }
            consumed += MdpMarketUpdate::WIRE_SIZE;
        }
        consumed
    }

    fn queue_message(&mut self, feed: FeedKind, msg: &MdpMarketUpdate) {
        match feed {
            FeedKind::Snapshot => {
                if self.snapshot_queue.contains_key(&msg.seq_num) {
                    // A second copy means a new cycle started before the
                    // current one completed.
                    warn!(seq = msg.seq_num, "snapshot record repeated; restarting cycle");
                    self.snapshot_queue.clear();
                }
                self.snapshot_queue.insert(msg.seq_num, msg.update);
            }
            FeedKind::Incremental => {
                self.incremental_queue.insert(msg.seq_num, msg.update);
            }
        }
    }

    /// Try to leave recovery with the buffered snapshot and incrementals.
    fn check_snapshot_sync(&mut self) {
        let Some((_, first)) = self.snapshot_queue.first_key_value() else {
            return;
        };
        if first.kind != MarketUpdateType::SnapshotStart {
            debug!("snapshot buffer does not begin with SNAPSHOT_START; waiting");
            self.snapshot_queue.clear();
            return;
        }

        // Snapshot must be seq 0..=n with no holes
        let hole = self
            .snapshot_queue
            .keys()
            .enumerate()
            .find(|&(expected, &seq)| seq != expected as u64);
        if let Some((expected, &found)) = hole {
            info!(expected, found, "gap in snapshot stream; waiting for next cycle");
            self.snapshot_queue.clear();
            return;
        }

        let Some((_, last)) = self.snapshot_queue.last_key_value() else {
            return;
        };
        if last.kind != MarketUpdateType::SnapshotEnd {
            return; // Incomplete cycle
        }

        // START and END must name the same incremental sequence
        let snapshot_inc_seq = last.order_id;
        let Some(mut next) = snapshot_inc_seq
            .checked_add(1)
            .filter(|_| first.order_id == snapshot_inc_seq)
        else {
            warn!(
                start = %Logged(first.order_id),
                end = %Logged(snapshot_inc_seq),
                "malformed snapshot markers; waiting for next cycle"
            );
            self.snapshot_queue.clear();
            return;
        };

        // Incrementals after the snapshot must follow on without holes
        for &seq in self.incremental_queue.range(next..).map(|(seq, _)| seq) {
            let following = next.checked_add(1);
            match following {
                Some(following) if seq == next => next = following,
                _ => {
                    info!(
                        expected = next,
                        found = seq,
                        "gap in incremental stream after snapshot; waiting for next cycle"
                    );
                    self.snapshot_queue.clear();
                    return;
                }
            }
        }

        let snapshot = std::mem::take(&mut self.snapshot_queue);
        let incremental = std::mem::take(&mut self.incremental_queue);

        let mut published = 0usize;
        for update in snapshot.values().chain(incremental.range(snapshot_inc_seq + 1..).map(|(_, u)| u)) {
            if matches!(
                update.kind,
                MarketUpdateType::SnapshotStart | MarketUpdateType::SnapshotEnd
            ) {
                continue;
            }
            self.publish(update);
            published += 1;
        }

        self.next_expected = next;
        self.state = RecoveryState::Normal;
        info!(
            snapshot_inc_seq,
            replayed = next - snapshot_inc_seq - 1,
            published,
            next_expected = self.next_expected,
            "recovered from snapshot"
        );
    }

    #[inline]
    fn publish(&mut self, update: &MarketUpdate) {
        debug!(%update, "publishing market update");
        self.updates.push(*update);
    }

    /// Poll both feeds until `run` is cleared.
    ///
    /// The snapshot stream is joined on entering recovery and left on
    /// exit. Socket errors end the loop.
    pub fn run<I: FeedSocket, S: FeedSocket>(
        &mut self,
        incremental: &mut I,
        snapshot: &mut S,
        run: &RunFlag,
    ) -> Result<()> {
        let mut incremental_buf = FeedBuffer::new();
        let mut snapshot_buf = FeedBuffer::new();
        let mut subscribed = false;

        incremental.join()?;
        info!("market data consumer running");

        while run.is_running() {
            let mut busy = self.drain(FeedKind::Incremental, incremental, &mut incremental_buf)?;

            if self.is_recovering() && !subscribed {
                snapshot.join()?;
                subscribed = true;
                info!("subscribed to snapshot stream");
            }
            if subscribed {
                busy |= self.drain(FeedKind::Snapshot, snapshot, &mut snapshot_buf)?;
            }
            if !self.is_recovering() && subscribed {
                snapshot.leave()?;
                subscribed = false;
                snapshot_buf.clear();
                info!("unsubscribed from snapshot stream");
            }

            if !busy {
                std::hint::spin_loop();
            }
        }

        info!("market data consumer stopped");
        Ok(())
    }

    fn drain<F: FeedSocket>(
        &mut self,
        feed: FeedKind,
        socket: &mut F,
        buf: &mut FeedBuffer,
    ) -> Result<bool> {
        let received = socket.recv(buf.spare())?;
        if received == 0 {
            return Ok(false);
        }
        buf.len += received;
        let consumed = self.on_bytes(feed, buf.filled());
        buf.consume(consumed);
        Ok(true)
    }

    /// Run the consumer on its own thread.
    pub fn start<I, S>(
        mut self,
        mut incremental: I,
        mut snapshot: S,
        run: RunFlag,
        core_id: Option<usize>,
    ) -> std::io::Result<JoinHandle<Option<()>>>
    where
        I: FeedSocket + Send + 'static,
        S: FeedSocket + Send + 'static,
    {
        spawn_pinned("trading/market-data-consumer", core_id, move || {
            self.run(&mut incremental, &mut snapshot, &run)
        })
    }
}

impl fmt::Debug for MarketDataConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketDataConsumer")
            .field("state", &self.state)
            .field("next_expected", &self.next_expected)
            .field("snapshot_queued", &self.snapshot_queue.len())
            .field("incremental_queued", &self.incremental_queue.len())
            .finish()
    }
}

/// Per-socket receive buffer that carries partial records across reads.
struct FeedBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl FeedBuffer {
    fn new() -> Self {
        Self {
            data: vec![0u8; RECV_BUFFER_SIZE].into_boxed_slice(),
            len: 0,
        }
    }

    fn spare(&mut self) -> &mut [u8] {
        &mut self.data[self.len..]
    }

    fn filled(&self) -> &[u8] {
        &self.data[..self.len]
    }

    fn consume(&mut self, n: usize) {
        self.data.copy_within(n..self.len, 0);
        self.len -= n;
    }

    fn clear(&mut self) {
        self.len = 0;
    }
}
