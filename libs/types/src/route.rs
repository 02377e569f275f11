//! Matching-engine routing rules
//!
//! A route sends orders that match its non-wildcard fields to a matching
//! engine. `None` fields are wildcards.

use serde::{Deserialize, Serialize};

use crate::ids::{ClientId, InstrumentId};
use crate::order::Side;

/// Which leg of the instrument a route's `asset` is compared against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetType {
    Base,
    Quote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingEngineRoute {
    pub id: String,
    /// Higher rank wins
    pub rank: i32,
    pub trading_condition_id: Option<String>,
    pub client_id: Option<ClientId>,
    pub instrument: Option<InstrumentId>,
    pub direction: Option<Side>,
    pub asset: Option<String>,
    /// Leg matched by `asset`; either leg when unset
    pub asset_type: Option<AssetType>,
    pub matching_engine_id: String,
}

impl MatchingEngineRoute {
    /// Catch-all route with every field wildcarded
    pub fn new(id: impl Into<String>, rank: i32, matching_engine_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rank,
            trading_condition_id: None,
            client_id: None,
            instrument: None,
            direction: None,
            asset: None,
            asset_type: None,
            matching_engine_id: matching_engine_id.into(),
        }
    }

    /// Which fields are set, in tie-break priority order:
    /// direction, instrument, asset, trading condition, client
    pub fn field_priority(&self) -> [bool; 5] {
        [
            self.direction.is_some(),
            self.instrument.is_some(),
            self.asset.is_some(),
            self.trading_condition_id.is_some(),
            self.client_id.is_some(),
        ]
    }

    /// Number of non-wildcard fields
    pub fn specificity(&self) -> usize {
        self.field_priority().iter().filter(|set| **set).count()
    }
}
