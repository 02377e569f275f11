//! Error types for the trading core
//!
//! Faults surface as `Result::Err`. Order rejections are not errors; they
//! are terminal order states carrying a [`RejectReason`](crate::order::RejectReason).

use thiserror::Error;

/// Top-level trading error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradingError {
    #[error("Quote error: {0}")]
    Quote(#[from] QuoteError),

    #[error("Asset pair error: {0}")]
    AssetPair(#[from] AssetPairError),

    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Repository error: {message}")]
    Repository { message: String },
}

/// Missing market data
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    #[error("No quote for instrument {instrument}")]
    NotFound { instrument: String },

    #[error("Quote for {instrument} has a non-positive price")]
    InvalidPrice { instrument: String },
}

/// Missing instrument metadata or trading-condition settings
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssetPairError {
    #[error("Asset pair not found: {instrument}")]
    NotFound { instrument: String },

    #[error("No asset pair between {asset1} and {asset2}")]
    CrossPairNotFound { asset1: String, asset2: String },

    #[error("No settings for {instrument} in trading condition {trading_condition_id}, asset {base_asset_id}")]
    AccountAssetNotFound {
        trading_condition_id: String,
        base_asset_id: String,
        instrument: String,
    },

    #[error("No account group for trading condition {trading_condition_id}, asset {base_asset_id}")]
    AccountGroupNotFound {
        trading_condition_id: String,
        base_asset_id: String,
    },

    #[error("Invalid leverage {leverage} for {instrument}")]
    InvalidLeverage { instrument: String, leverage: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccountError {
    #[error("Account not found: {account_id}")]
    NotFound { account_id: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoutingError {
    #[error("Ambiguous route: {first} and {second} tie on every criterion")]
    AmbiguousRoute { first: String, second: String },

    #[error("Matching engine not found: {engine_id}")]
    EngineNotFound { engine_id: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("Order not found: {order_id}")]
    NotFound { order_id: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}
