//! Risk Engine Service
//!
//! Quote and trading-condition caches, floating P&L and margin per order,
//! cached per-account figures with dirty-counter invalidation, margin-level
//! classification and overnight swaps.

pub mod quotes;
pub mod assets;
pub mod fpl;
pub mod margin;
pub mod account_state;
pub mod swap;
pub mod events;
pub mod engine;

pub use account_state::AccountStateCache;
pub use assets::{AssetPairsCache, TradingConditionsCache};
pub use engine::{RiskEngine, RiskEngineConfig};
pub use events::{RiskEvent, RiskEventType};
pub use fpl::FplService;
pub use quotes::QuoteCache;
pub use swap::{SwapCommissionService, SwapSettings};
