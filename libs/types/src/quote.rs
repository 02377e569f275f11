//! Best bid/ask prices

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::InstrumentId;
use crate::order::Side;

/// Top of book for one instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestPrice {
    pub instrument: InstrumentId,
    pub bid: Decimal,
    pub ask: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl BestPrice {
    pub fn new(instrument: impl Into<InstrumentId>, bid: Decimal, ask: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            instrument: instrument.into(),
            bid,
            ask,
            timestamp,
        }
    }

    /// Price paid to open exposure on `side`: buyers pay the ask, sellers get the bid
    pub fn price_for(&self, side: Side) -> Decimal {
        match side {
            Side::BUY => self.ask,
            Side::SELL => self.bid,
        }
    }

    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }
}
