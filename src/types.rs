//! Primitive identifiers, sentinels and default capacity limits.
//!
//! Every identifier is a small fixed-width integer with a reserved
//! `INVALID` value (the type's maximum), so records can be default-filled
//! without an `Option` wrapper and stay fixed-size on the wire.

use std::fmt;

use crate::error::{Error, Result};

pub type OrderId = u64;
pub type TickerId = u32;
pub type ClientId = u32;
/// Position of an order in the FIFO queue of its price level.
pub type Priority = u64;
/// Price in minimum price-increment units (ticks).
pub type Price = i64;
pub type Qty = u32;

pub const ORDER_ID_INVALID: OrderId = OrderId::MAX;
pub const TICKER_ID_INVALID: TickerId = TickerId::MAX;
pub const CLIENT_ID_INVALID: ClientId = ClientId::MAX;
pub const PRIORITY_INVALID: Priority = Priority::MAX;
pub const PRICE_INVALID: Price = Price::MAX;
pub const QTY_INVALID: Qty = Qty::MAX;

// Default limits, overridable through `config::EngineConfig`.
pub const MAX_TICKERS: usize = 8;
pub const MAX_ORDERS: u32 = 1024 * 1024;
pub const MAX_PRICE_LEVELS: u32 = 256;
pub const MAX_PENDING_REQUESTS: usize = 256 * 1024;
pub const MAX_CLIENT_UPDATES: usize = 256 * 1024;
pub const MAX_MARKET_UPDATES: usize = 256 * 1024;

/// Identifier types that reserve one value as "not set".
pub trait Sentinel: Copy + PartialEq + fmt::Display {
    const INVALID: Self;

    #[inline]
    fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl Sentinel for u32 {
    const INVALID: Self = u32::MAX;
}

impl Sentinel for u64 {
    const INVALID: Self = u64::MAX;
}

impl Sentinel for i64 {
    const INVALID: Self = i64::MAX;
}

/// Canonical log rendering of an identifier: the number, or `INVALID`.
///
/// ```
/// use flash_exchange::types::{Logged, PRICE_INVALID};
/// assert_eq!(Logged(42u32).to_string(), "42");
/// assert_eq!(Logged(PRICE_INVALID).to_string(), "INVALID");
/// ```
#[derive(Clone, Copy)]
pub struct Logged<T>(pub T);

impl<T: Sentinel> fmt::Display for Logged<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_valid() {
            write!(f, "{}", self.0)
        } else {
            f.write_str("INVALID")
        }
    }
}

/// Order side. The discriminant is the sign applied to quantities when
/// computing positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(i8)]
pub enum Side {
    #[default]
    Invalid = 0,
    Buy = 1,
    Sell = -1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
            Side::Invalid => Side::Invalid,
        }
    }

    /// Slot index for per-side arrays: BUY = 0, SELL = 1.
    #[inline]
    pub const fn index(self) -> Option<usize> {
        match self {
            Side::Buy => Some(0),
            Side::Sell => Some(1),
            Side::Invalid => None,
        }
    }

    #[inline]
    pub const fn sign(self) -> i64 {
        self as i8 as i64
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        !matches!(self, Side::Invalid)
    }
}

impl TryFrom<i8> for Side {
    type Error = Error;

    fn try_from(value: i8) -> Result<Self> {
        match value {
            0 => Ok(Side::Invalid),
            1 => Ok(Side::Buy),
            -1 => Ok(Side::Sell),
            other => Err(Error::UnknownTag {
                field: "side",
                value: other as u8,
            }),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
            Side::Invalid => "INVALID",
        })
    }
}
