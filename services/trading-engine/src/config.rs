//! Trading engine configuration

use risk_engine::RiskEngineConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Trading engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingEngineConfig {
    /// Engine used when no route matches an order
    pub default_matching_engine_id: String,
    /// Swap schedule and other risk settings
    pub risk: RiskEngineConfig,
    /// Largest absolute order volume accepted, unlimited when unset
    pub max_order_volume: Option<Decimal>,
    /// Close with whatever liquidity is available instead of all-or-nothing
    pub partial_close_allowed: bool,
    /// Close positions of accounts that reach the stop-out level
    pub stop_out_enabled: bool,
    /// Capacity of the notification broadcast channel
    pub notification_capacity: usize,
}

impl Default for TradingEngineConfig {
    fn default() -> Self {
        Self {
            default_matching_engine_id: "default".to_string(),
            risk: RiskEngineConfig::default(),
            max_order_volume: None,
            partial_close_allowed: false,
            stop_out_enabled: true,
            notification_capacity: 1024,
        }
    }
}

impl TradingEngineConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_matching_engine_id.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "default_matching_engine_id",
                reason: "must not be empty".to_string(),
            });
        }
        if self.risk.swap.cutoff_hour > 23 {
            return Err(ConfigError::InvalidValue {
                field: "risk.swap.cutoff_hour",
                reason: format!("{} is not an hour of the day", self.risk.swap.cutoff_hour),
            });
        }
        if let Some(max) = self.max_order_volume {
            if max <= Decimal::ZERO {
                return Err(ConfigError::InvalidValue {
                    field: "max_order_volume",
                    reason: "must be positive".to_string(),
                });
            }
        }
        if self.notification_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "notification_capacity",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
