//! CSV request replay source.
//!
//! Each row is one client request. Prices are decimals in instrument
//! units and are converted to ticks with the replay's tick size:
//!
//! ```text
//! timestamp,kind,client_id,ticker_id,order_id,side,price,qty
//! 2024-01-02T09:30:00Z,NEW,1,0,1,BUY,100.25,10
//! ,CANCEL,1,0,1,BUY,,
//! ```

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::command::{ClientRequest, ClientRequestType};
use crate::error::{Error, Result};
use crate::types::{ClientId, OrderId, Price, Qty, Side, TickerId, PRICE_INVALID, QTY_INVALID};

/// Raw CSV row
#[derive(Debug, Deserialize)]
pub struct RequestRow {
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: String,
    pub client_id: ClientId,
    pub ticker_id: TickerId,
    pub order_id: OrderId,
    pub side: String,
    pub price: Option<Decimal>,
    pub qty: Option<Qty>,
}

/// A decoded request with its optional source timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplayRequest {
    pub timestamp: Option<DateTime<Utc>>,
    pub request: ClientRequest,
}

impl RequestRow {
    /// Convert raw row to a typed request.
    ///
    /// `row` is only used in error messages.
    pub fn to_request(&self, row: usize, tick_size: Decimal) -> Result<ClientRequest> {
        let fail = |message: String| Error::Replay { row, message };

        let kind = match self.kind.to_ascii_uppercase().as_str() {
            "NEW" => ClientRequestType::New,
            "CANCEL" => ClientRequestType::Cancel,
            other => return Err(fail(format!("unknown request kind '{other}'"))),
        };
        let side = match self.side.to_ascii_lowercase().as_str() {
            "buy" | "bid" => Side::Buy,
            "sell" | "ask" => Side::Sell,
            "" if kind == ClientRequestType::Cancel => Side::Invalid,
            other => return Err(fail(format!("unknown side '{other}'"))),
        };

        let price = match self.price {
            Some(price) => to_ticks(price, tick_size).map_err(fail)?,
            None if kind == ClientRequestType::Cancel => PRICE_INVALID,
            None => return Err(fail("NEW without a price".to_owned())),
        };
        let qty = match self.qty {
            Some(qty) => qty,
            None if kind == ClientRequestType::Cancel => QTY_INVALID,
            None => return Err(fail("NEW without a quantity".to_owned())),
        };

        Ok(ClientRequest::new(
            kind,
            self.client_id,
            self.ticker_id,
            self.order_id,
            side,
            price,
            qty,
        ))
    }
}

fn to_ticks(price: Decimal, tick_size: Decimal) -> std::result::Result<Price, String> {
    if tick_size <= Decimal::ZERO {
        return Err(format!("tick size must be positive, got {tick_size}"));
    }
    let ticks = price / tick_size;
    if !ticks.fract().is_zero() {
        return Err(format!("price {price} is not a multiple of tick size {tick_size}"));
    }
    ticks
        .to_i64()
        .filter(|&t| t != PRICE_INVALID)
        .ok_or_else(|| format!("price {price} out of range"))
}

/// Decode every row of a CSV document.
pub fn read_requests<R: io::Read>(reader: R, tick_size: Decimal) -> Result<Vec<ReplayRequest>> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut out = Vec::new();

    for (index, row) in csv.deserialize::<RequestRow>().enumerate() {
        // Header is line 1
        let line = index + 2;
        let row = row?;
        out.push(ReplayRequest {
            timestamp: row.timestamp,
            request: row.to_request(line, tick_size)?,
        });
    }
    Ok(out)
}

/// Decode a CSV file.
pub fn read_requests_from_path(path: impl AsRef<Path>, tick_size: Decimal) -> Result<Vec<ReplayRequest>> {
    let file = std::fs::File::open(path)?;
    read_requests(io::BufReader::new(file), tick_size)
}
