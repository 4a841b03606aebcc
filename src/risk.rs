//! Pre-trade risk checks.
//!
//! [`RiskCheck`] is the seam the order manager consumes; [`RiskManager`] is
//! the per-ticker limit implementation the strategy thread feeds with fills
//! and PnL.

use std::fmt;

use serde::Deserialize;

use crate::types::{Qty, Side, TickerId};

/// Verdict of a pre-trade risk check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RiskCheckResult {
    #[default]
    Invalid,
    OrderTooLarge,
    PositionTooLarge,
    LossTooLarge,
    Allowed,
}

impl fmt::Display for RiskCheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskCheckResult::Invalid => "INVALID",
            RiskCheckResult::OrderTooLarge => "ORDER_TOO_LARGE",
            RiskCheckResult::PositionTooLarge => "POSITION_TOO_LARGE",
            RiskCheckResult::LossTooLarge => "LOSS_TOO_LARGE",
            RiskCheckResult::Allowed => "ALLOWED",
        })
    }
}

/// Synchronous, side-effect-free pre-trade gate.
pub trait RiskCheck {
    fn check_pre_trade_risk(&self, ticker_id: TickerId, side: Side, qty: Qty) -> RiskCheckResult;
}

/// Limits for one ticker.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskCfg {
    pub max_order_size: Qty,
    /// Absolute position limit, in units
    pub max_position: i64,
    /// Most negative total PnL tolerated before new orders stop
    pub max_loss: f64,
}

impl Default for RiskCfg {
    fn default() -> Self {
        Self {
            max_order_size: 0,
            max_position: 0,
            max_loss: 0.0,
        }
    }
}

impl fmt::Display for RiskCfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RiskCfg{{max-order-size:{} max-position:{} max-loss:{}}}",
            self.max_order_size, self.max_position, self.max_loss
        )
    }
}

/// Live exposure for one ticker.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PositionInfo {
    /// Signed position: positive long, negative short
    pub position: i64,
    pub total_pnl: f64,
}

#[derive(Clone, Copy, Debug, Default)]
struct RiskInfo {
    cfg: RiskCfg,
    position: PositionInfo,
}

impl RiskInfo {
    fn check(&self, side: Side, qty: Qty) -> RiskCheckResult {
        if !side.is_valid() {
            return RiskCheckResult::Invalid;
        }
        if qty > self.cfg.max_order_size {
            return RiskCheckResult::OrderTooLarge;
        }
        let projected = self.position.position + side.sign() * i64::from(qty);
        if projected.abs() > self.cfg.max_position {
            return RiskCheckResult::PositionTooLarge;
        }
        if self.position.total_pnl < self.cfg.max_loss {
            return RiskCheckResult::LossTooLarge;
        }
        RiskCheckResult::Allowed
    }
}

/// Per-ticker limits and exposure.
///
/// Tickers without configured limits have zero limits, so every order for
/// them fails the size check.
#[derive(Clone, Debug)]
pub struct RiskManager {
    tickers: Vec<RiskInfo>,
}

impl RiskManager {
    /// Create a manager for `max_tickers` tickers; `limits[i]` applies to
    /// ticker `i`.
    pub fn new(max_tickers: usize, limits: &[RiskCfg]) -> Self {
        let mut tickers = vec![RiskInfo::default(); max_tickers];
        for (info, cfg) in tickers.iter_mut().zip(limits) {
            info.cfg = *cfg;
        }
        Self { tickers }
    }

    /// Apply an execution to the ticker's position.
    ///
    /// # Panics
    /// Panics if `ticker_id` is out of range.
    pub fn on_fill(&mut self, ticker_id: TickerId, side: Side, qty: Qty) {
        let info = &mut self.tickers[ticker_id as usize];
        info.position.position += side.sign() * i64::from(qty);
    }

    /// Replace the ticker's total PnL (realized plus unrealized).
    pub fn set_total_pnl(&mut self, ticker_id: TickerId, total_pnl: f64) {
        self.tickers[ticker_id as usize].position.total_pnl = total_pnl;
    }

    pub fn position(&self, ticker_id: TickerId) -> Option<PositionInfo> {
        self.tickers.get(ticker_id as usize).map(|info| info.position)
    }
}

impl RiskCheck for RiskManager {
    fn check_pre_trade_risk(&self, ticker_id: TickerId, side: Side, qty: Qty) -> RiskCheckResult {
        self.tickers
            .get(ticker_id as usize)
            .map_or(RiskCheckResult::Invalid, |info| info.check(side, qty))
    }
}
