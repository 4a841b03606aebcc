//! Request, response and market-data records.
//!
//! Requests are inputs from order gateways. Responses and market updates
//! are outputs of the matching engine. All three are fixed-layout records
//! with explicit reserved bytes instead of implicit padding, because they
//! cross process and network boundaries and must be byte-identical on both
//! ends. The wire encoding is the little-endian field sequence, which is
//! also the in-memory layout on little-endian targets.

use std::fmt;

use crate::error::{Error, Result};
use crate::types::{
    ClientId, Logged, OrderId, Price, Priority, Qty, Side, TickerId, CLIENT_ID_INVALID,
    ORDER_ID_INVALID, PRICE_INVALID, PRIORITY_INVALID, QTY_INVALID, TICKER_ID_INVALID,
};

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
        #[repr(u8)]
        pub enum $name {
            #[default]
            $($variant = $value),+
        }

        impl TryFrom<u8> for $name {
            type Error = Error;

            fn try_from(value: u8) -> Result<Self> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(Error::UnknownTag { field: stringify!($name), value: other }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $($name::$variant => $label,)+
                })
            }
        }
    };
}

wire_enum!(
    /// Client request kind
    ClientRequestType {
        Invalid = 0 => "INVALID",
        New = 1 => "NEW",
        Cancel = 2 => "CANCEL",
    }
);

wire_enum!(
    /// Client response kind
    ClientResponseType {
        Invalid = 0 => "INVALID",
        Accepted = 1 => "ACCEPTED",
        Canceled = 2 => "CANCELED",
        Filled = 3 => "FILLED",
        CancelRejected = 4 => "CANCEL_REJECTED",
    }
);

wire_enum!(
    /// Market update kind. `Clear`, `SnapshotStart` and `SnapshotEnd` only
    /// appear on the snapshot stream.
    MarketUpdateType {
        Invalid = 0 => "INVALID",
        Clear = 1 => "CLEAR",
        Add = 2 => "ADD",
        Modify = 3 => "MODIFY",
        Cancel = 4 => "CANCEL",
        Trade = 5 => "TRADE",
        SnapshotStart = 6 => "SNAPSHOT_START",
        SnapshotEnd = 7 => "SNAPSHOT_END",
    }
);

/// Each record's in-memory size must equal its wire size (no implicit padding).
macro_rules! assert_wire_size {
    ($($record:ty),+ $(,)?) => {
        $(const _: () = assert!(std::mem::size_of::<$record>() == <$record>::WIRE_SIZE);)+
    };
}

// ============================================================================
// Wire helpers
// ============================================================================

struct Encoder<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Encoder<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    fn put<const N: usize>(&mut self, bytes: [u8; N]) -> &mut Self {
        self.buf[self.pos..self.pos + N].copy_from_slice(&bytes);
        self.pos += N;
        self
    }
}

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8], needed: usize) -> Result<Self> {
        if buf.len() < needed {
            return Err(Error::ShortBuffer {
                needed,
                got: buf.len(),
            });
        }
        Ok(Self { buf, pos: 0 })
    }

    #[inline]
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn side(&mut self) -> Result<Side> {
        Side::try_from(i8::from_le_bytes(self.take()))
    }
}

// ============================================================================
// Client Requests
// ============================================================================

/// A request from an order gateway to the matching engine.
///
/// # Memory Layout
///
/// | Field      | Type    | Offset | Size |
/// |------------|---------|--------|------|
/// | order_id   | u64     | 0      | 8    |
/// | price      | i64     | 8      | 8    |
/// | client_id  | u32     | 16     | 4    |
/// | ticker_id  | u32     | 20     | 4    |
/// | qty        | u32     | 24     | 4    |
/// | kind       | u8      | 28     | 1    |
/// | side       | i8      | 29     | 1    |
/// | _reserved  | [u8;2]  | 30     | 2    |
/// | **Total**  |         |        | 32   |
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientRequest {
    pub order_id: OrderId,
    pub price: Price,
    pub client_id: ClientId,
    pub ticker_id: TickerId,
    pub qty: Qty,
    pub kind: ClientRequestType,
    pub side: Side,
    pub _reserved: [u8; 2],
}

impl ClientRequest {
    pub const WIRE_SIZE: usize = 32;

    #[inline]
    pub fn new(
        kind: ClientRequestType,
        client_id: ClientId,
        ticker_id: TickerId,
        order_id: OrderId,
        side: Side,
        price: Price,
        qty: Qty,
    ) -> Self {
        Self {
            order_id,
            price,
            client_id,
            ticker_id,
            qty,
            kind,
            side,
            _reserved: [0; 2],
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        Encoder::new(&mut out)
            .put(self.order_id.to_le_bytes())
            .put(self.price.to_le_bytes())
            .put(self.client_id.to_le_bytes())
            .put(self.ticker_id.to_le_bytes())
            .put(self.qty.to_le_bytes())
            .put([self.kind as u8])
            .put((self.side as i8).to_le_bytes());
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let mut d = Decoder::new(buf, Self::WIRE_SIZE)?;
        let order_id = u64::from_le_bytes(d.take());
        let price = i64::from_le_bytes(d.take());
        let client_id = u32::from_le_bytes(d.take());
        let ticker_id = u32::from_le_bytes(d.take());
        let qty = u32::from_le_bytes(d.take());
        let kind = ClientRequestType::try_from(u8::from_le_bytes(d.take()))?;
        let side = d.side()?;
        Ok(Self::new(kind, client_id, ticker_id, order_id, side, price, qty))
    }
}

impl Default for ClientRequest {
    fn default() -> Self {
        Self::new(
            ClientRequestType::Invalid,
            CLIENT_ID_INVALID,
            TICKER_ID_INVALID,
            ORDER_ID_INVALID,
            Side::Invalid,
            PRICE_INVALID,
            QTY_INVALID,
        )
    }
}

impl fmt::Display for ClientRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClientRequest [type:{} client:{} ticker:{} oid:{} side:{} qty:{} price:{}]",
            self.kind,
            Logged(self.client_id),
            Logged(self.ticker_id),
            Logged(self.order_id),
            self.side,
            Logged(self.qty),
            Logged(self.price),
        )
    }
}

// ============================================================================
// Client Responses
// ============================================================================

/// A response from the matching engine to the owning client.
///
/// # Memory Layout
///
/// | Field      | Type    | Offset | Size |
/// |------------|---------|--------|------|
/// | order_id   | u64     | 0      | 8    |
/// | price      | i64     | 8      | 8    |
/// | client_id  | u32     | 16     | 4    |
/// | ticker_id  | u32     | 20     | 4    |
/// | exec_qty   | u32     | 24     | 4    |
/// | leaves_qty | u32     | 28     | 4    |
/// | kind       | u8      | 32     | 1    |
/// | side       | i8      | 33     | 1    |
/// | _reserved  | [u8;6]  | 34     | 6    |
/// | **Total**  |         |        | 40   |
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientResponse {
    pub order_id: OrderId,
    pub price: Price,
    pub client_id: ClientId,
    pub ticker_id: TickerId,
    /// Quantity executed by this event
    pub exec_qty: Qty,
    /// Quantity still open after this event
    pub leaves_qty: Qty,
    pub kind: ClientResponseType,
    pub side: Side,
    pub _reserved: [u8; 6],
}

impl ClientResponse {
    pub const WIRE_SIZE: usize = 40;

    #[allow(clippy::too_many_arguments)]
    #[inline]
    pub fn new(
        kind: ClientResponseType,
        client_id: ClientId,
        ticker_id: TickerId,
        order_id: OrderId,
        side: Side,
        price: Price,
        exec_qty: Qty,
        leaves_qty: Qty,
    ) -> Self {
        Self {
            order_id,
            price,
            client_id,
            ticker_id,
            exec_qty,
            leaves_qty,
            kind,
            side,
            _reserved: [0; 6],
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        Encoder::new(&mut out)
            .put(self.order_id.to_le_bytes())
            .put(self.price.to_le_bytes())
            .put(self.client_id.to_le_bytes())
            .put(self.ticker_id.to_le_bytes())
            .put(self.exec_qty.to_le_bytes())
            .put(self.leaves_qty.to_le_bytes())
            .put([self.kind as u8])
            .put((self.side as i8).to_le_bytes());
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let mut d = Decoder::new(buf, Self::WIRE_SIZE)?;
        let order_id = u64::from_le_bytes(d.take());
        let price = i64::from_le_bytes(d.take());
        let client_id = u32::from_le_bytes(d.take());
        let ticker_id = u32::from_le_bytes(d.take());
        let exec_qty = u32::from_le_bytes(d.take());
        let leaves_qty = u32::from_le_bytes(d.take());
        let kind = ClientResponseType::try_from(u8::from_le_bytes(d.take()))?;
        let side = d.side()?;
        Ok(Self::new(
            kind, client_id, ticker_id, order_id, side, price, exec_qty, leaves_qty,
        ))
    }
}

impl Default for ClientResponse {
    fn default() -> Self {
        Self::new(
            ClientResponseType::Invalid,
            CLIENT_ID_INVALID,
            TICKER_ID_INVALID,
            ORDER_ID_INVALID,
            Side::Invalid,
            PRICE_INVALID,
            QTY_INVALID,
            QTY_INVALID,
        )
    }
}

impl fmt::Display for ClientResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClientResponse [type:{} client:{} ticker:{} oid:{} side:{} exec_qty:{} leaves_qty:{} price:{}]",
            self.kind,
            Logged(self.client_id),
            Logged(self.ticker_id),
            Logged(self.order_id),
            self.side,
            Logged(self.exec_qty),
            Logged(self.leaves_qty),
            Logged(self.price),
        )
    }
}

// ============================================================================
// Market Updates
// ============================================================================

/// A public order-book event.
///
/// # Memory Layout
///
/// | Field      | Type    | Offset | Size |
/// |------------|---------|--------|------|
/// | order_id   | u64     | 0      | 8    |
/// | price      | i64     | 8      | 8    |
/// | priority   | u64     | 16     | 8    |
/// | ticker_id  | u32     | 24     | 4    |
/// | qty        | u32     | 28     | 4    |
/// | kind       | u8      | 32     | 1    |
/// | side       | i8      | 33     | 1    |
/// | _reserved  | [u8;6]  | 34     | 6    |
/// | **Total**  |         |        | 40   |
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarketUpdate {
    pub order_id: OrderId,
    pub price: Price,
    pub priority: Priority,
    pub ticker_id: TickerId,
    pub qty: Qty,
    pub kind: MarketUpdateType,
    pub side: Side,
    pub _reserved: [u8; 6],
}

impl MarketUpdate {
    pub const WIRE_SIZE: usize = 40;

    #[inline]
    pub fn new(
        kind: MarketUpdateType,
        order_id: OrderId,
        ticker_id: TickerId,
        side: Side,
        price: Price,
        qty: Qty,
        priority: Priority,
    ) -> Self {
        Self {
            order_id,
            price,
            priority,
            ticker_id,
            qty,
            kind,
            side,
            _reserved: [0; 6],
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut [u8]) {
        Encoder::new(out)
            .put(self.order_id.to_le_bytes())
            .put(self.price.to_le_bytes())
            .put(self.priority.to_le_bytes())
            .put(self.ticker_id.to_le_bytes())
            .put(self.qty.to_le_bytes())
            .put([self.kind as u8])
            .put((self.side as i8).to_le_bytes());
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let mut d = Decoder::new(buf, Self::WIRE_SIZE)?;
        Self::decode(&mut d)
    }

    fn decode(d: &mut Decoder<'_>) -> Result<Self> {
        let order_id = u64::from_le_bytes(d.take());
        let price = i64::from_le_bytes(d.take());
        let priority = u64::from_le_bytes(d.take());
        let ticker_id = u32::from_le_bytes(d.take());
        let qty = u32::from_le_bytes(d.take());
        let kind = MarketUpdateType::try_from(u8::from_le_bytes(d.take()))?;
        let side = d.side()?;
        Ok(Self::new(kind, order_id, ticker_id, side, price, qty, priority))
    }
}

impl Default for MarketUpdate {
    fn default() -> Self {
        Self::new(
            MarketUpdateType::Invalid,
            ORDER_ID_INVALID,
            TICKER_ID_INVALID,
            Side::Invalid,
            PRICE_INVALID,
            QTY_INVALID,
            PRIORITY_INVALID,
        )
    }
}

impl fmt::Display for MarketUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MarketUpdate [type:{} ticker:{} oid:{} side:{} qty:{} price:{} priority:{}]",
            self.kind,
            Logged(self.ticker_id),
            Logged(self.order_id),
            self.side,
            Logged(self.qty),
            Logged(self.price),
            Logged(self.priority),
        )
    }
}

/// A market update stamped with its feed sequence number.
///
/// Incremental sequence numbers start at 1 and never reset. Snapshot cycles
/// are numbered from 0 (the `SnapshotStart` record).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MdpMarketUpdate {
    pub seq_num: u64,
    pub update: MarketUpdate,
}

impl MdpMarketUpdate {
    pub const WIRE_SIZE: usize = 8 + MarketUpdate::WIRE_SIZE;

    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        out[..8].copy_from_slice(&self.seq_num.to_le_bytes());
        self.update.encode_into(&mut out[8..]);
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let mut d = Decoder::new(buf, Self::WIRE_SIZE)?;
        let seq_num = u64::from_le_bytes(d.take());
        let update = MarketUpdate::decode(&mut d)?;
        Ok(Self { seq_num, update })
    }
}

impl fmt::Display for MdpMarketUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MdpMarketUpdate [seq:{} {}]", self.seq_num, self.update)
    }
}

assert_wire_size!(ClientRequest, ClientResponse, MarketUpdate, MdpMarketUpdate);

// ============================================================================
// Output Events
// ============================================================================

/// Anything the matching engine emits, in emission order.
///
/// Used by synchronous callers (tests, benchmarks, replay tools) that
/// collect engine output into a `Vec` instead of ring transports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputEvent {
    Response(ClientResponse),
    Update(MarketUpdate),
}
