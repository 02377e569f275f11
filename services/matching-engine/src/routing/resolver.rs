//! Route selection
//!
//! Candidates are ordered by a single comparator: rank, then number of
//! non-wildcard fields, then which fields are set in priority order
//! (direction, instrument, asset, trading condition, client). If the two
//! best candidates compare equal the routing is ambiguous.

use std::cmp::Ordering;

use types::errors::RoutingError;
use types::ids::{ClientId, InstrumentId};
use types::instrument::AssetPair;
use types::order::Side;
use types::route::{AssetType, MatchingEngineRoute};

/// Attributes of an order that routes are matched against
#[derive(Debug, Clone, Copy)]
pub struct RouteCriteria<'a> {
    pub trading_condition_id: &'a str,
    pub client_id: &'a ClientId,
    pub instrument: &'a InstrumentId,
    pub direction: Side,
    /// Legs of the instrument, when known
    pub asset_pair: Option<&'a AssetPair>,
}

/// True when every non-wildcard field of `route` matches
pub fn route_matches(route: &MatchingEngineRoute, criteria: &RouteCriteria<'_>) -> bool {
    if let Some(tc) = &route.trading_condition_id {
        if tc != criteria.trading_condition_id {
            return false;
        }
    }
    if let Some(client) = &route.client_id {
        if client != criteria.client_id {
            return false;
        }
    }
    if let Some(instrument) = &route.instrument {
        if instrument != criteria.instrument {
            return false;
        }
    }
    if let Some(direction) = route.direction {
        if direction != criteria.direction {
            return false;
        }
    }
    if let Some(asset) = &route.asset {
        let Some(pair) = criteria.asset_pair else {
            return false;
        };
        let leg_matches = match route.asset_type {
            Some(AssetType::Base) => &pair.base_asset_id == asset,
            Some(AssetType::Quote) => &pair.quote_asset_id == asset,
            None => pair.has_asset(asset),
        };
        if !leg_matches {
            return false;
        }
    }
    true
}

/// Preference order: `Less` means `a` is preferred over `b`
pub fn compare_routes(a: &MatchingEngineRoute, b: &MatchingEngineRoute) -> Ordering {
    b.rank
        .cmp(&a.rank)
        .then_with(|| b.specificity().cmp(&a.specificity()))
        .then_with(|| b.field_priority().cmp(&a.field_priority()))
}

/// Best matching route, `None` when no route matches
pub fn resolve_route<'r>(
    routes: impl IntoIterator<Item = &'r MatchingEngineRoute>,
    criteria: &RouteCriteria<'_>,
) -> Result<Option<&'r MatchingEngineRoute>, RoutingError> {
    let mut candidates: Vec<&MatchingEngineRoute> = routes
        .into_iter()
        .filter(|route| route_matches(route, criteria))
        .collect();
    candidates.sort_by(|a, b| compare_routes(a, b));

    match candidates.as_slice() {
        [] => Ok(None),
        [first, second, ..] if compare_routes(first, second) == Ordering::Equal => {
            Err(RoutingError::AmbiguousRoute {
                first: first.id.clone(),
                second: second.id.clone(),
            })
        }
        [first, ..] => Ok(Some(*first)),
    }
}
