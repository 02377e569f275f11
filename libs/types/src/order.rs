//! Order lifecycle types
//!
//! Client orders, their fills and the per-order FPL memo.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, ClientId, InstrumentId, OrderId};
use crate::numeric::is_zero_volume;

/// Order side (buyer or seller)
///
/// Orders carry a signed volume; the side is derived from its sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid)
    BUY,
    /// Sell order (ask)
    SELL,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::BUY => Side::SELL,
            Side::SELL => Side::BUY,
        }
    }

    /// Side encoded by a signed volume (non-negative = buy)
    pub fn from_volume(volume: Decimal) -> Self {
        if volume >= Decimal::ZERO {
            Side::BUY
        } else {
            Side::SELL
        }
    }

    /// Apply this side's sign to an absolute volume
    pub fn signed(&self, volume: Decimal) -> Decimal {
        match self {
            Side::BUY => volume.abs(),
            Side::SELL => -volume.abs(),
        }
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Pending order waiting for its expected open price
    WaitingForExecution,
    /// Open position
    Active,
    /// Close requested but not yet fully matched
    Closing,
    /// Terminal: position closed or pending order canceled
    Closed,
    /// Terminal: failed validation or matching
    Rejected,
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Closed | OrderStatus::Rejected)
    }
}

/// Reject reasons recorded on a rejected order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    NoLiquidity,
    NotEnoughBalance,
    LeadToStopOut,
    AccountInvalidState,
    InvalidExpectedOpenPrice,
    InvalidVolume,
    InvalidTakeProfit,
    InvalidStoploss,
    InvalidInstrument,
    InvalidAccount,
    TradingConditionError,
    TechnicalError,
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloseReason {
    Close,
    StopLoss,
    TakeProfit,
    StopOut,
    Canceled,
}

/// How much of a tentative match the order accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FillType {
    /// Full match or reject entirely
    #[default]
    FillOrKill,
    /// Accept whatever volume is available
    PartialFill,
}

/// Immutable fill record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedOrder {
    /// Counterparty order id
    pub order_id: OrderId,
    pub market_maker_id: String,
    /// Volume left on the resting order once this fill is committed
    pub limit_order_left_to_match: Decimal,
    pub volume: Decimal,
    pub price: Decimal,
    pub matched_date: DateTime<Utc>,
}

/// Append-only, order-preserving fill list with memoized aggregates.
///
/// Aggregates are computed once at construction; appending builds a new
/// collection. Serialized as the plain list of fills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<MatchedOrder>", into = "Vec<MatchedOrder>")]
pub struct MatchedOrderCollection {
    items: Vec<MatchedOrder>,
    summary_volume: Decimal,
    weighted_average_price: Option<Decimal>,
}

impl MatchedOrderCollection {
    /// Build a collection from a finished list of fills
    pub fn new(items: Vec<MatchedOrder>) -> Self {
        let summary_volume: Decimal = items.iter().map(|m| m.volume).sum();
        let weighted_average_price = if summary_volume > Decimal::ZERO {
            let notional: Decimal = items.iter().map(|m| m.price * m.volume).sum();
            Some(notional / summary_volume)
        } else {
            None
        };

        Self {
            items,
            summary_volume,
            weighted_average_price,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// New collection with `fills` appended after the existing items
    pub fn appended(&self, fills: &[MatchedOrder]) -> Self {
        let mut items = Vec::with_capacity(self.items.len() + fills.len());
        items.extend_from_slice(&self.items);
        items.extend_from_slice(fills);
        Self::new(items)
    }

    /// Σ fill volume
    pub fn summary_volume(&self) -> Decimal {
        self.summary_volume
    }

    /// Σ(price × volume) / Σ volume, defined only when Σ volume > 0
    pub fn weighted_average_price(&self) -> Option<Decimal> {
        self.weighted_average_price
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MatchedOrder> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[MatchedOrder] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for MatchedOrderCollection {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Vec<MatchedOrder>> for MatchedOrderCollection {
    fn from(items: Vec<MatchedOrder>) -> Self {
        Self::new(items)
    }
}

impl From<MatchedOrderCollection> for Vec<MatchedOrder> {
    fn from(collection: MatchedOrderCollection) -> Self {
        collection.items
    }
}

impl<'a> IntoIterator for &'a MatchedOrderCollection {
    type Item = &'a MatchedOrder;
    type IntoIter = std::slice::Iter<'a, MatchedOrder>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Per-order FPL memo.
///
/// Valid while the owning order's open and close prices and its closed
/// volume equal the memoized values.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FplData {
    pub fpl: Decimal,
    pub quote_rate: Decimal,
    pub margin_init: Decimal,
    pub margin_maintenance: Decimal,
    pub open_cross_price: Decimal,
    pub close_cross_price: Decimal,
    pub open_price: Decimal,
    pub close_price: Decimal,
    pub swaps: Decimal,
    /// Volume already matched for close when the memo was taken
    #[serde(default)]
    pub closed_volume: Decimal,
}

impl FplData {
    /// Memo still matches the given prices and closed volume
    pub fn is_valid_for(&self, open_price: Decimal, close_price: Decimal, closed_volume: Decimal) -> bool {
        self.open_price == open_price && self.close_price == close_price && self.closed_volume == closed_volume
    }
}

/// Client order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub client_id: ClientId,
    pub account_id: AccountId,
    pub trading_condition_id: String,
    pub account_asset_id: String,
    pub instrument: InstrumentId,
    /// Signed volume: non-negative buys, negative sells
    pub volume: Decimal,
    pub created_at: DateTime<Utc>,
    pub open_date: Option<DateTime<Utc>>,
    pub close_date: Option<DateTime<Utc>>,
    pub expected_open_price: Option<Decimal>,
    pub open_price: Decimal,
    pub close_price: Decimal,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    /// Decimal digits of the instrument's prices
    pub asset_accuracy: u32,
    pub fill_type: FillType,
    pub status: OrderStatus,
    pub reject_reason: Option<RejectReason>,
    pub reject_reason_text: Option<String>,
    pub close_reason: Option<CloseReason>,
    pub matching_engine_id: Option<String>,
    pub matched_orders: MatchedOrderCollection,
    pub matched_close_orders: MatchedOrderCollection,
    pub commission_lot: Decimal,
    pub open_commission: Decimal,
    pub close_commission: Decimal,
    pub swap_commission: Decimal,
    pub fpl_data: Option<FplData>,
    pub version: u64,
}

impl Order {
    /// Create a new order awaiting validation and matching
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client_id: ClientId,
        account_id: AccountId,
        trading_condition_id: impl Into<String>,
        account_asset_id: impl Into<String>,
        instrument: InstrumentId,
        volume: Decimal,
        asset_accuracy: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            client_id,
            account_id,
            trading_condition_id: trading_condition_id.into(),
            account_asset_id: account_asset_id.into(),
            instrument,
            volume,
            created_at,
            open_date: None,
            close_date: None,
            expected_open_price: None,
            open_price: Decimal::ZERO,
            close_price: Decimal::ZERO,
            take_profit: None,
            stop_loss: None,
            asset_accuracy,
            fill_type: FillType::default(),
            status: OrderStatus::WaitingForExecution,
            reject_reason: None,
            reject_reason_text: None,
            close_reason: None,
            matching_engine_id: None,
            matched_orders: MatchedOrderCollection::empty(),
            matched_close_orders: MatchedOrderCollection::empty(),
            commission_lot: Decimal::ZERO,
            open_commission: Decimal::ZERO,
            close_commission: Decimal::ZERO,
            swap_commission: Decimal::ZERO,
            fpl_data: None,
            version: 0,
        }
    }

    pub fn direction(&self) -> Side {
        Side::from_volume(self.volume)
    }

    /// `|volume| − Σ open fill volume`
    pub fn remaining_volume(&self) -> Decimal {
        self.volume.abs() - self.matched_orders.summary_volume()
    }

    /// Fully matched for open once the remaining volume rounds to zero
    pub fn is_fulfilled(&self) -> bool {
        is_zero_volume(self.remaining_volume())
    }

    /// Signed size of the open position (matched open volume)
    pub fn position_volume(&self) -> Decimal {
        self.direction().signed(self.matched_orders.summary_volume())
    }

    /// Signed size still open: the position volume less what was closed
    pub fn open_position_volume(&self) -> Decimal {
        self.direction().signed(self.close_remaining_volume())
    }

    /// Open volume not yet matched for close
    pub fn close_remaining_volume(&self) -> Decimal {
        self.matched_orders.summary_volume() - self.matched_close_orders.summary_volume()
    }

    pub fn is_close_fulfilled(&self) -> bool {
        is_zero_volume(self.close_remaining_volume())
    }

    /// Current memoized floating P&L, zero before the first calculation
    pub fn fpl(&self) -> Decimal {
        self.fpl_data.as_ref().map_or(Decimal::ZERO, |d| d.fpl)
    }

    pub fn margin_maintenance(&self) -> Decimal {
        self.fpl_data.as_ref().map_or(Decimal::ZERO, |d| d.margin_maintenance)
    }

    pub fn margin_init(&self) -> Decimal {
        self.fpl_data.as_ref().map_or(Decimal::ZERO, |d| d.margin_init)
    }

    /// Check if the order is an open position
    pub fn is_active(&self) -> bool {
        matches!(self.status, OrderStatus::Active | OrderStatus::Closing)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, OrderStatus::WaitingForExecution)
    }

    /// Move the order to the terminal Rejected state
    pub fn reject(&mut self, reason: RejectReason, text: impl Into<String>, now: DateTime<Utc>) {
        self.status = OrderStatus::Rejected;
        self.reject_reason = Some(reason);
        self.reject_reason_text = Some(text.into());
        self.close_date = Some(now);
        self.version += 1;
    }

    /// Record accepted open fills and derive the open price
    pub fn apply_open_fills(&mut self, fills: &[MatchedOrder], open_price: Decimal, now: DateTime<Utc>) {
        self.matched_orders = self.matched_orders.appended(fills);
        self.open_price = open_price;
        self.open_date = Some(now);
        self.status = OrderStatus::Active;
        self.version += 1;
    }

    /// Record accepted close fills; closes the order once fully matched
    pub fn apply_close_fills(
        &mut self,
        fills: &[MatchedOrder],
        close_price: Decimal,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) {
        self.matched_close_orders = self.matched_close_orders.appended(fills);
        self.close_price = close_price;
        self.close_reason = Some(reason);
        if self.is_close_fulfilled() {
            self.status = OrderStatus::Closed;
            self.close_date = Some(now);
        } else {
            self.status = OrderStatus::Closing;
        }
        self.version += 1;
    }
}
