//! Engine - request loop around the per-ticker order books.
//!
//! One thread drains the incoming request transport and pushes responses
//! and market updates by value onto two outbound transports. The loop
//! never blocks: an empty transport is a spin.

use std::collections::hash_map::DefaultHasher;
use std::convert::Infallible;
use std::hash::{Hash, Hasher};
use std::io;
use std::thread::JoinHandle;

use tracing::{debug, info, trace};

use crate::command::{ClientRequest, ClientRequestType, ClientResponse, MarketUpdate};
use crate::config::EngineConfig;
use crate::matching::MatchSink;
use crate::order_book::OrderBook;
use crate::ring::{RingReader, RingTransport, RingWriter};
use crate::runtime::{spawn_pinned, RunFlag};
use crate::types::TickerId;

/// Requests handled between stop-flag checks in [`MatchingEngine::run`].
pub const RUN_BATCH: usize = 64;

/// Outbound side of the engine: client responses and market updates.
#[derive(Debug)]
pub struct EngineOutput {
    responses: RingWriter<ClientResponse>,
    updates: RingWriter<MarketUpdate>,
}

impl MatchSink for EngineOutput {
    #[inline]
    fn on_client_response(&mut self, response: &ClientResponse) {
        debug!(%response, "sending client response");
        self.responses.push(*response);
    }

    #[inline]
    fn on_market_update(&mut self, update: &MarketUpdate) {
        debug!(%update, "sending market update");
        self.updates.push(*update);
    }
}

/// Consumer ends of the engine's transports plus the request producer,
/// as handed out by [`MatchingEngine::with_transports`].
#[derive(Debug)]
pub struct EngineLinks {
    pub requests: RingWriter<ClientRequest>,
    pub responses: RingReader<ClientResponse>,
    pub updates: RingReader<MarketUpdate>,
}

/// Owns one [`OrderBook`] per ticker and the engine's transport ends.
pub struct MatchingEngine {
    books: Vec<OrderBook>,
    incoming: RingReader<ClientRequest>,
    output: EngineOutput,
}

impl MatchingEngine {
    /// Create an engine on existing transports.
    pub fn new(
        cfg: &EngineConfig,
        incoming: RingReader<ClientRequest>,
        responses: RingWriter<ClientResponse>,
        updates: RingWriter<MarketUpdate>,
    ) -> Self {
        let books = (0..cfg.max_tickers)
            .map(|ticker_id| {
                OrderBook::new(ticker_id as TickerId, cfg.max_orders, cfg.max_price_levels)
            })
            .collect();

        Self {
            books,
            incoming,
            output: EngineOutput { responses, updates },
        }
    }

    /// Create an engine together with transports sized from `cfg`.
    pub fn with_transports(cfg: &EngineConfig) -> (Self, EngineLinks) {
        let (requests, incoming) = RingTransport::with_capacity(cfg.max_pending_requests);
        let (response_writer, responses) = RingTransport::with_capacity(cfg.max_client_updates);
        let (update_writer, updates) = RingTransport::with_capacity(cfg.max_market_updates);

        let engine = Self::new(cfg, incoming, response_writer, update_writer);
        let links = EngineLinks {
            requests,
            responses,
            updates,
        };
        (engine, links)
    }

    /// Dispatch one request to its ticker's book.
    ///
    /// # Panics
    /// Panics on an INVALID request type or an unknown ticker: the request
    /// producer is trusted to validate both.
    pub fn process_client_request(&mut self, request: &ClientRequest) {
        let Some(book) = self.books.get_mut(request.ticker_id as usize) else {
            panic!("Received request for unknown ticker: {request}");
        };

        match request.kind {
            ClientRequestType::New => book.add(
                &mut self.output,
                request.client_id,
                request.order_id,
                request.side,
                request.price,
                request.qty,
            ),
            ClientRequestType::Cancel => {
                book.cancel(&mut self.output, request.client_id, request.order_id)
            }
            ClientRequestType::Invalid => {
                panic!("Received invalid client-request-type: {request}")
            }
        }
    }

    /// Drain every pending request.
    ///
    /// # Returns
    /// Number of requests processed
    pub fn poll(&mut self) -> usize {
        self.poll_batch(usize::MAX)
    }

    /// Process at most `max` pending requests.
    pub fn poll_batch(&mut self, max: usize) -> usize {
        let mut processed = 0;
        while processed < max {
            let Some(request) = self.incoming.next_to_read().copied() else {
                break;
            };
            trace!(%request, "processing");
            self.process_client_request(&request);
            self.incoming.commit_read();
            processed += 1;
        }
        processed
    }

    /// Busy-poll until `run` is cleared.
    ///
    /// The flag is rechecked every [`RUN_BATCH`] requests, so a producer
    /// that keeps the transport full cannot hold the loop open.
    pub fn run(&mut self, run: &RunFlag) {
        info!(tickers = self.books.len(), "matching engine running");
        while run.is_running() {
            if self.poll_batch(RUN_BATCH) == 0 {
                std::hint::spin_loop();
            }
        }
        info!("matching engine stopped");
    }

    /// Move the engine onto its own thread, optionally pinned to `core_id`.
    ///
    /// The handle returns the engine once `run` is cleared, so callers can
    /// inspect final book state.
    pub fn start(
        mut self,
        run: RunFlag,
        core_id: Option<usize>,
    ) -> io::Result<JoinHandle<Option<Self>>> {
        spawn_pinned("exchange/matching-engine", core_id, move || {
            self.warm_up();
            self.run(&run);
            Ok::<_, Infallible>(self)
        })
    }

    #[inline]
    pub fn book(&self, ticker_id: TickerId) -> Option<&OrderBook> {
        self.books.get(ticker_id as usize)
    }

    pub fn ticker_count(&self) -> usize {
        self.books.len()
    }

    /// Pre-fault every book's pools.
    pub fn warm_up(&mut self) {
        for book in &mut self.books {
            book.warm_up();
        }
    }

    /// Hash of all books (for determinism testing)
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for book in &self.books {
            book.state_hash().hash(&mut hasher);
        }
        hasher.finish()
    }
}

impl std::fmt::Debug for MatchingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingEngine")
            .field("books", &self.books)
            .field("incoming", &self.incoming)
            .finish()
    }
}
