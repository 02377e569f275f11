//! Outbound notifications
//!
//! Fire-and-forget: publishing never blocks and never fails the operation
//! that produced the event.

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;
use types::account::Account;
use types::ids::{AccountId, ClientId};
use types::order::Order;
use types::quote::BestPrice;

use risk_engine::RiskEvent;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum TradingEvent {
    /// Any change of an order's state
    OrderChanged(Box<Order>),
    /// Balance or figures of an account changed
    AccountUpdated(Box<Account>),
    /// Positions were force-closed because the account reached stop-out
    AccountStopout {
        client_id: ClientId,
        account_id: AccountId,
        positions: usize,
        total_pnl: Decimal,
    },
    /// New top of book after a book change
    OrderBookPrice(BestPrice),
    /// Account reached the margin-call level
    MarginCall(RiskEvent),
}

impl TradingEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TradingEvent::OrderChanged(_) => "order_changed",
            TradingEvent::AccountUpdated(_) => "account_updated",
            TradingEvent::AccountStopout { .. } => "account_stopout",
            TradingEvent::OrderBookPrice(_) => "order_book_price",
            TradingEvent::MarginCall(_) => "margin_call",
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: TradingEvent);
}

/// Fan-out to any number of subscribers over a Tokio broadcast channel.
///
/// Slow subscribers lag and lose the oldest events; publishing without
/// subscribers drops the event.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<TradingEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TradingEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: TradingEvent) {
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            trace!(kind, "No subscribers; notification dropped");
        }
    }
}
