//! Order manager - one working order per (ticker, side) slot.
//!
//! A strategy expresses where it wants to be quoted with
//! [`OrderManager::move_orders`]; the manager turns that into NEW and CANCEL
//! requests, never more than one in flight per slot, and gates every NEW
//! through a [`RiskCheck`].

use std::fmt;

use tracing::{debug, info, warn};

use crate::command::{ClientRequest, ClientRequestType, ClientResponse, ClientResponseType};
use crate::ring::RingWriter;
use crate::risk::{RiskCheck, RiskCheckResult};
use crate::types::{
    ClientId, Logged, OrderId, Price, Qty, Side, TickerId, ORDER_ID_INVALID, PRICE_INVALID,
    QTY_INVALID, TICKER_ID_INVALID,
};

/// Lifecycle of a slot's order as seen from the client side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OMOrderState {
    #[default]
    Invalid,
    PendingNew,
    Live,
    PendingCancel,
    Dead,
}

impl OMOrderState {
    /// Whether a request for this slot is in flight.
    #[inline]
    pub fn is_pending(self) -> bool {
        matches!(self, OMOrderState::PendingNew | OMOrderState::PendingCancel)
    }
}

impl fmt::Display for OMOrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OMOrderState::Invalid => "INVALID",
            OMOrderState::PendingNew => "PENDING_NEW",
            OMOrderState::Live => "LIVE",
            OMOrderState::PendingCancel => "PENDING_CANCEL",
            OMOrderState::Dead => "DEAD",
        })
    }
}

/// The manager's view of one slot's order. Reused across lifecycles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OMOrder {
    pub ticker_id: TickerId,
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub qty: Qty,
    pub state: OMOrderState,
}

impl Default for OMOrder {
    fn default() -> Self {
        Self {
            ticker_id: TICKER_ID_INVALID,
            order_id: ORDER_ID_INVALID,
            side: Side::Invalid,
            price: PRICE_INVALID,
            qty: QTY_INVALID,
            state: OMOrderState::Invalid,
        }
    }
}

impl fmt::Display for OMOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OMOrder[tid:{} oid:{} side:{} price:{} qty:{} state:{}]",
            Logged(self.ticker_id),
            Logged(self.order_id),
            self.side,
            Logged(self.price),
            Logged(self.qty),
            self.state
        )
    }
}

pub struct OrderManager {
    client_id: ClientId,
    /// Indexed by ticker, then `Side::index()`
    orders: Vec<[OMOrder; 2]>,
    requests: RingWriter<ClientRequest>,
    next_order_id: OrderId,
}

impl OrderManager {
    pub fn new(client_id: ClientId, max_tickers: usize, requests: RingWriter<ClientRequest>) -> Self {
        Self {
            client_id,
            orders: vec![[OMOrder::default(); 2]; max_tickers],
            requests,
            next_order_id: 1,
        }
    }

    /// The slot for `(ticker_id, side)`, if both are valid.
    pub fn order(&self, ticker_id: TickerId, side: Side) -> Option<&OMOrder> {
        let slots = self.orders.get(ticker_id as usize)?;
        Some(&slots[side.index()?])
    }

    fn slot_mut(&mut self, ticker_id: TickerId, side: Side) -> Option<&mut OMOrder> {
        let slots = self.orders.get_mut(ticker_id as usize)?;
        Some(&mut slots[side.index()?])
    }

    /// Update the slot a response refers to.
    ///
    /// Responses for another client, an unknown slot, or an order id other
    /// than the slot's current one are ignored.
    pub fn on_order_update(&mut self, response: &ClientResponse) {
        debug!(%response, "order update");
        if response.client_id != self.client_id {
            return;
        }
        let Some(order) = self.slot_mut(response.ticker_id, response.side) else {
            warn!(%response, "response for unknown slot ignored");
            return;
        };
        if order.order_id != response.order_id {
            warn!(%response, current = %order, "response for stale order ignored");
            return;
        }

        match response.kind {
            ClientResponseType::Accepted => order.state = OMOrderState::Live,
            ClientResponseType::Canceled => order.state = OMOrderState::Dead,
            ClientResponseType::Filled => {
                order.qty = response.leaves_qty;
                if order.qty == 0 {
                    order.state = OMOrderState::Dead;
                }
            }
            ClientResponseType::CancelRejected | ClientResponseType::Invalid => {}
        }
        debug!(order = %order, "slot updated");
    }

    /// Steer one slot towards `price` / `qty`.
    ///
    /// A LIVE order at another price is canceled; the replacement goes out
    /// on a later call once the slot is DEAD. A DEAD or INVALID slot gets a
    /// NEW if `price` is valid and risk allows it. Pending slots are left
    /// alone.
    pub fn move_order<R: RiskCheck>(
        &mut self,
        risk: &R,
        ticker_id: TickerId,
        price: Price,
        side: Side,
        qty: Qty,
    ) {
        let Some(order) = self.order(ticker_id, side).copied() else {
            warn!(ticker = ticker_id, %side, "move for unknown slot ignored");
            return;
        };

        match order.state {
            OMOrderState::Live => {
                if order.price != price {
                    self.cancel_order(ticker_id, side);
                }
            }
            OMOrderState::Invalid | OMOrderState::Dead => {
                if price == PRICE_INVALID {
                    return;
                }
                let verdict = risk.check_pre_trade_risk(ticker_id, side, qty);
                if verdict == RiskCheckResult::Allowed {
                    self.new_order(ticker_id, price, side, qty);
                } else {
                    info!(
                        ticker = ticker_id,
                        %side,
                        qty = %Logged(qty),
                        %verdict,
                        "risk check rejected new order"
                    );
                }
            }
            OMOrderState::PendingNew | OMOrderState::PendingCancel => {}
        }
    }

    /// Move the BUY and SELL slots of one ticker independently.
    pub fn move_orders<R: RiskCheck>(
        &mut self,
        risk: &R,
        ticker_id: TickerId,
        bid_price: Price,
        ask_price: Price,
        clip: Qty,
    ) {
        self.move_order(risk, ticker_id, bid_price, Side::Buy, clip);
        self.move_order(risk, ticker_id, ask_price, Side::Sell, clip);
    }

    fn new_order(&mut self, ticker_id: TickerId, price: Price, side: Side, qty: Qty) {
        let order_id = self.next_order_id;
        self.next_order_id += 1;

        let request = ClientRequest::new(
            ClientRequestType::New,
            self.client_id,
            ticker_id,
            order_id,
            side,
            price,
            qty,
        );
        self.requests.push(request);

        if let Some(order) = self.slot_mut(ticker_id, side) {
            *order = OMOrder {
                ticker_id,
                order_id,
                side,
                price,
                qty,
                state: OMOrderState::PendingNew,
            };
            debug!(%request, order = %order, "sent new order");
        }
    }

    fn cancel_order(&mut self, ticker_id: TickerId, side: Side) {
        let client_id = self.client_id;
        let Some(order) = self.slot_mut(ticker_id, side) else {
            return;
        };
        let request = ClientRequest::new(
            ClientRequestType::Cancel,
            client_id,
            order.ticker_id,
            order.order_id,
            order.side,
            order.price,
            order.qty,
        );
        order.state = OMOrderState::PendingCancel;
        debug!(%request, order = %order, "sent cancel");
        self.requests.push(request);
    }
}

impl fmt::Debug for OrderManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderManager")
            .field("client_id", &self.client_id)
            .field("next_order_id", &self.next_order_id)
            .field("requests", &self.requests)
            .finish()
    }
}
