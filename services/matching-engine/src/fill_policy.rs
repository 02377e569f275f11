//! Fill policies deciding whether tentative fills are committed

use rust_decimal::Decimal;
use types::numeric::{round_to_accuracy, round_volume};
use types::order::{FillType, MatchedOrder, MatchedOrderCollection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPolicy {
    /// Accept only if the fills cover the whole requested volume
    FillOrKill,
    /// Accept any non-empty set of fills
    PartialFill,
}

impl FillPolicy {
    /// Decide on tentative fills for `requested` (absolute) volume
    pub fn accepts(&self, requested: Decimal, fills: &[MatchedOrder]) -> bool {
        if fills.is_empty() {
            return false;
        }
        match self {
            FillPolicy::FillOrKill => {
                let matched: Decimal = fills.iter().map(|f| f.volume).sum();
                round_volume(matched) >= round_volume(requested.abs())
            }
            FillPolicy::PartialFill => true,
        }
    }

    /// Average fill price, rounded to the instrument's accuracy
    pub fn average_price(fills: &MatchedOrderCollection, accuracy: u32) -> Option<Decimal> {
        fills
            .weighted_average_price()
            .map(|price| round_to_accuracy(price, accuracy))
    }
}

impl From<FillType> for FillPolicy {
    fn from(fill_type: FillType) -> Self {
        match fill_type {
            FillType::FillOrKill => FillPolicy::FillOrKill,
            FillType::PartialFill => FillPolicy::PartialFill,
        }
    }
}
