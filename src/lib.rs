//! # Flash-Exchange
//!
//! A low-latency trade-matching pipeline: exchange-side matching and
//! market-data publishing, and the client-side feed consumer and order
//! manager that talk to it.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: every book and pool is owned by one thread (no locks)
//! - **SPSC Transports**: the only shared structures are [`ring`] transports,
//!   whose writer and reader halves cannot be cloned
//! - **Slab Allocation**: orders and levels live in pre-sized pools addressed
//!   by 32-bit indices; no heap allocation in the hot path
//! - **Fail-Fast**: invariant violations panic, and release builds abort
//!
//! ## Architecture
//!
//! ```text
//! [OrderManager] --requests--> [MatchingEngine (pinned)] --responses--> [OrderManager]
//!                                        |
//!                                  market updates
//!                                        v
//!                             [IncrementalPublisher] --> [SnapshotSynthesizer]
//!                                        |                       |
//!                                  incremental feed        snapshot feed
//!                                        v                       v
//!                                   [MarketDataConsumer (gap recovery)]
//! ```

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod market_data;
pub mod matching;
pub mod net;
pub mod order_book;
pub mod order_manager;
pub mod price_level;
pub mod replay;
pub mod ring;
pub mod risk;
pub mod runtime;
pub mod slab;
pub mod snapshot;
pub mod types;

// Re-exports for convenience
pub use command::{
    ClientRequest, ClientRequestType, ClientResponse, ClientResponseType, MarketUpdate,
    MarketUpdateType, MdpMarketUpdate, OutputEvent,
};
pub use config::{Config, EngineConfig};
pub use engine::{EngineLinks, MatchingEngine};
pub use error::{Error, Result};
pub use market_data::{FeedKind, MarketDataConsumer, RecoveryState};
pub use matching::MatchSink;
pub use order_book::OrderBook;
pub use order_manager::{OMOrder, OMOrderState, OrderManager};
pub use ring::{RingReader, RingTransport, RingWriter};
pub use risk::{RiskCfg, RiskCheck, RiskCheckResult, RiskManager};
pub use runtime::RunFlag;
pub use slab::{SlabAllocator, SlabIndex, NULL_INDEX};
pub use snapshot::{IncrementalPublisher, SnapshotSynthesizer};
pub use types::{ClientId, OrderId, Price, Priority, Qty, Side, TickerId};
