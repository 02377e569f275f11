//! Types library for the margin trading core
//!
//! Shared type definitions used by the matching engine, the risk engine and
//! the trading engine orchestrator.
//!
//! # Modules
//! - `ids`: Unique identifiers (OrderId, AccountId, ClientId, InstrumentId)
//! - `numeric`: Price newtype and rounding helpers
//! - `order`: Order lifecycle, fills and the per-order FPL memo
//! - `limit_order`: Market-maker liquidity orders
//! - `account`: Accounts and the cached account FPL state
//! - `instrument`: Asset pairs and trading-condition entries
//! - `quote`: Best bid/ask prices
//! - `route`: Matching-engine routing rules
//! - `errors`: Error taxonomy

pub mod ids;
pub mod numeric;
pub mod order;
pub mod limit_order;
pub mod account;
pub mod instrument;
pub mod quote;
pub mod route;
pub mod errors;

pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::account::*;
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::instrument::*;
    pub use crate::limit_order::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
    pub use crate::quote::*;
    pub use crate::route::*;
}
