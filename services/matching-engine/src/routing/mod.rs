//! Matching-engine routing: rule resolution and the route cache

pub mod resolver;
pub mod router;

pub use resolver::{compare_routes, resolve_route, route_matches, RouteCriteria};
pub use router::MatchingEngineRouter;
