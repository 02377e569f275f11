//! Trading Engine Service
//!
//! Orchestrates the matching and risk engines: pre-trade validation,
//! routing, matching, post-match margin checks, account updates,
//! persistence and notifications. Reacts to quotes by activating pending
//! orders, triggering stop-loss / take-profit and stopping out accounts.

pub mod config;
pub mod engine;
pub mod notifications;
pub mod persistence;
pub mod validation;

pub use config::{ConfigError, TradingEngineConfig};
pub use engine::{EngineServices, HydrationSummary, TradingEngine};
pub use notifications::{BroadcastNotifier, Notifier, TradingEvent};
pub use persistence::{
    AccountsRepository, InMemoryRepository, OrdersRepository, PersistenceWriter, Repositories, RoutesRepository,
};
pub use validation::{DefaultOrderValidator, OrderRejection, PreTradeValidator};
