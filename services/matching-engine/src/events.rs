//! Results emitted by the matching engine

use serde::{Deserialize, Serialize};
use types::ids::InstrumentId;
use types::order::MatchedOrder;
use types::quote::BestPrice;

/// An instrument's book changed; carries its new top of book if two-sided
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookUpdated {
    pub engine_id: String,
    pub instrument: InstrumentId,
    pub best_price: Option<BestPrice>,
}

/// Result of matching a client order
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// Fills accepted by the policy and committed to the book
    Matched {
        fills: Vec<MatchedOrder>,
        book_update: OrderBookUpdated,
    },
    /// Nothing committed; the book is unchanged
    NoLiquidity,
}

impl MatchOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, MatchOutcome::Matched { .. })
    }

    /// Committed fills, empty when nothing was matched
    pub fn fills(&self) -> &[MatchedOrder] {
        match self {
            MatchOutcome::Matched { fills, .. } => fills,
            MatchOutcome::NoLiquidity => &[],
        }
    }
}
