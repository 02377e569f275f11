//! Market-maker liquidity orders
//!
//! A limit order rests in exactly one price level of an order book until it
//! is fulfilled or withdrawn by its provider.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{InstrumentId, OrderId};
use crate::numeric::{is_zero_volume, Price};
use crate::order::{MatchedOrderCollection, Side};

/// Resting market-maker order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrder {
    pub id: OrderId,
    /// Liquidity provider that owns this order
    pub market_maker_id: String,
    pub instrument: InstrumentId,
    /// Signed volume: positive rests on the bid side, negative on the ask side
    pub volume: Decimal,
    pub price: Price,
    pub created_at: DateTime<Utc>,
    /// Fills taken against this order
    pub matched_orders: MatchedOrderCollection,
}

impl LimitOrder {
    pub fn new(
        market_maker_id: impl Into<String>,
        instrument: InstrumentId,
        volume: Decimal,
        price: Price,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            market_maker_id: market_maker_id.into(),
            instrument,
            volume,
            price,
            created_at,
            matched_orders: MatchedOrderCollection::empty(),
        }
    }

    pub fn direction(&self) -> Side {
        Side::from_volume(self.volume)
    }

    /// Volume still available to take
    pub fn remaining_volume(&self) -> Decimal {
        self.volume.abs() - self.matched_orders.summary_volume()
    }

    pub fn is_fulfilled(&self) -> bool {
        is_zero_volume(self.remaining_volume())
    }
}
