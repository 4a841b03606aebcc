//! Runtime configuration loaded from TOML.
//!
//! Every field has a default, so an empty document is a valid
//! configuration:
//!
//! ```toml
//! [engine]
//! max_orders = 65536
//! core_id = 2
//!
//! [market_data.incremental]
//! ip = "233.252.14.3"
//! port = 20001
//!
//! [[risk]]
//! max_order_size = 1000
//! max_position = 10000
//! max_loss = -5000.0
//!
//! [logging]
//! level = "info"
//! file = "exchange.log"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::net::SocketConfig;
use crate::risk::RiskCfg;
use crate::types::{
    MAX_CLIENT_UPDATES, MAX_MARKET_UPDATES, MAX_ORDERS, MAX_PENDING_REQUESTS, MAX_PRICE_LEVELS,
    MAX_TICKERS,
};

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub market_data: MarketDataConfig,
    /// Risk limits, indexed by ticker id
    pub risk: Vec<RiskCfg>,
    pub logging: LogConfig,
}

/// Matching engine sizing and placement.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub max_tickers: usize,
    /// Order pool capacity per ticker
    pub max_orders: u32,
    /// Price level pool capacity per ticker
    pub max_price_levels: u32,
    pub max_pending_requests: usize,
    pub max_client_updates: usize,
    pub max_market_updates: usize,
    pub core_id: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tickers: MAX_TICKERS,
            max_orders: MAX_ORDERS,
            max_price_levels: MAX_PRICE_LEVELS,
            max_pending_requests: MAX_PENDING_REQUESTS,
            max_client_updates: MAX_CLIENT_UPDATES,
            max_market_updates: MAX_MARKET_UPDATES,
            core_id: None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MarketDataConfig {
    pub core_id: Option<usize>,
    pub snapshot: SocketConfig,
    pub incremental: SocketConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set
    pub level: String,
    /// Log file; standard error when unset
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            file: None,
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject sizings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let e = &self.engine;
        if e.max_tickers == 0 {
            return Err(Error::config("engine.max_tickers must be non-zero"));
        }
        for (name, value) in [
            ("max_orders", e.max_orders as usize),
            ("max_price_levels", e.max_price_levels as usize),
            ("max_pending_requests", e.max_pending_requests),
            ("max_client_updates", e.max_client_updates),
            ("max_market_updates", e.max_market_updates),
        ] {
            if value == 0 {
                return Err(Error::config(format!("engine.{name} must be non-zero")));
            }
        }
        if e.max_orders == u32::MAX || e.max_price_levels == u32::MAX {
            return Err(Error::config("engine pool capacity must be below u32::MAX"));
        }
        if self.risk.len() > e.max_tickers {
            return Err(Error::config(format!(
                "{} risk entries for {} tickers",
                self.risk.len(),
                e.max_tickers
            )));
        }
        Ok(())
    }
}
