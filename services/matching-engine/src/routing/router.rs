//! Routing cache
//!
//! Holds the active routes and resolves the engine id for an order,
//! falling back to the configured default engine when nothing matches.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, info};
use types::errors::RoutingError;
use types::route::MatchingEngineRoute;

use super::resolver::{resolve_route, RouteCriteria};

pub struct MatchingEngineRouter {
    routes: RwLock<HashMap<String, MatchingEngineRoute>>,
    default_engine_id: String,
}

impl MatchingEngineRouter {
    pub fn new(default_engine_id: impl Into<String>) -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            default_engine_id: default_engine_id.into(),
        }
    }

    /// Replace all routes
    pub fn init(&self, routes: Vec<MatchingEngineRoute>) {
        let mut guard = self.routes.write();
        guard.clear();
        guard.extend(routes.into_iter().map(|route| (route.id.clone(), route)));
        info!(routes = guard.len(), "Routes initialised");
    }

    pub fn add_or_replace_route(&self, route: MatchingEngineRoute) {
        debug!(route_id = %route.id, engine_id = %route.matching_engine_id, "Route stored");
        self.routes.write().insert(route.id.clone(), route);
    }

    pub fn remove_route(&self, route_id: &str) -> Option<MatchingEngineRoute> {
        let removed = self.routes.write().remove(route_id);
        if removed.is_some() {
            debug!(route_id, "Route removed");
        }
        removed
    }

    /// All routes, sorted by id
    pub fn routes(&self) -> Vec<MatchingEngineRoute> {
        let mut routes: Vec<_> = self.routes.read().values().cloned().collect();
        routes.sort_by(|a, b| a.id.cmp(&b.id));
        routes
    }

    pub fn default_engine_id(&self) -> &str {
        &self.default_engine_id
    }

    /// Engine id for an order with the given attributes
    pub fn route_for(&self, criteria: &RouteCriteria<'_>) -> Result<String, RoutingError> {
        let routes = self.routes.read();
        let engine_id = match resolve_route(routes.values(), criteria)? {
            Some(route) => {
                debug!(route_id = %route.id, engine_id = %route.matching_engine_id, "Route resolved");
                route.matching_engine_id.clone()
            }
            None => self.default_engine_id.clone(),
        };
        Ok(engine_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{ClientId, InstrumentId};
    use types::order::Side;

    fn criteria<'a>(client: &'a ClientId, instrument: &'a InstrumentId) -> RouteCriteria<'a> {
        RouteCriteria {
            trading_condition_id: "tc1",
            client_id: client,
            instrument,
            direction: Side::BUY,
            asset_pair: None,
        }
    }

    #[test]
    fn test_default_engine_when_no_route() {
        let router = MatchingEngineRouter::new("default");
        let client = ClientId::from("c1");
        let instrument = InstrumentId::from("EURUSD");

        assert_eq!(router.route_for(&criteria(&client, &instrument)).unwrap(), "default");
    }

    #[test]
    fn test_add_replace_remove() {
        let router = MatchingEngineRouter::new("default");
        let client = ClientId::from("c1");
        let instrument = InstrumentId::from("EURUSD");

        router.add_or_replace_route(MatchingEngineRoute::new("r1", 1, "me1"));
        assert_eq!(router.route_for(&criteria(&client, &instrument)).unwrap(), "me1");

        router.add_or_replace_route(MatchingEngineRoute::new("r1", 1, "me2"));
        assert_eq!(router.routes().len(), 1);
        assert_eq!(router.route_for(&criteria(&client, &instrument)).unwrap(), "me2");

        assert!(router.remove_route("r1").is_some());
        assert!(router.remove_route("r1").is_none());
        assert_eq!(router.route_for(&criteria(&client, &instrument)).unwrap(), "default");
    }

    #[test]
    fn test_init_replaces_routes() {
        let router = MatchingEngineRouter::new("default");
        router.add_or_replace_route(MatchingEngineRoute::new("old", 1, "me1"));
        router.init(vec![
            MatchingEngineRoute::new("b", 1, "me2"),
            MatchingEngineRoute::new("a", 2, "me3"),
        ]);

        let ids: Vec<_> = router.routes().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_ambiguous_route_is_an_error() {
        let router = MatchingEngineRouter::new("default");
        router.add_or_replace_route(MatchingEngineRoute::new("a", 1, "me1"));
        router.add_or_replace_route(MatchingEngineRoute::new("b", 1, "me2"));
        let client = ClientId::from("c1");
        let instrument = InstrumentId::from("EURUSD");

        assert!(router.route_for(&criteria(&client, &instrument)).is_err());
    }
}
