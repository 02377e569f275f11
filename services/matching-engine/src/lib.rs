//! Matching Engine Service
//!
//! Matches client orders against market-maker liquidity with price-time
//! priority, and routes orders to the engine that should execute them.
//!
//! **Key Invariants:**
//! - Bid ladder price-descending, ask ladder price-ascending, FIFO per level
//! - No empty price level survives an update
//! - Tentative fills never touch the book; only accepted fills are committed
//! - Deterministic matching (same inputs → same outputs)

pub mod book;
pub mod engine;
pub mod events;
pub mod fill_policy;
pub mod routing;

pub use book::{OrderBook, OrderBookCollection, SetOrdersModel};
pub use engine::MatchingEngine;
pub use events::{MatchOutcome, OrderBookUpdated};
pub use fill_policy::FillPolicy;
pub use routing::{MatchingEngineRouter, RouteCriteria};
