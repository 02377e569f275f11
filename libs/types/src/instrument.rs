//! Instruments and trading-condition entries

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::InstrumentId;

/// Tradable asset pair, e.g. EURUSD = base EUR quoted in USD
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPair {
    pub id: InstrumentId,
    pub base_asset_id: String,
    pub quote_asset_id: String,
    /// Decimal digits of the pair's prices
    pub accuracy: u32,
}

impl AssetPair {
    pub fn new(
        id: impl Into<InstrumentId>,
        base_asset_id: impl Into<String>,
        quote_asset_id: impl Into<String>,
        accuracy: u32,
    ) -> Self {
        Self {
            id: id.into(),
            base_asset_id: base_asset_id.into(),
            quote_asset_id: quote_asset_id.into(),
            accuracy,
        }
    }

    /// True when either leg is the given asset
    pub fn has_asset(&self, asset_id: &str) -> bool {
        self.base_asset_id == asset_id || self.quote_asset_id == asset_id
    }
}

/// Per-trading-condition settings for one instrument in one account asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountAssetPair {
    pub trading_condition_id: String,
    /// Account asset these settings apply to
    pub base_asset_id: String,
    pub instrument: InstrumentId,
    pub leverage_init: Decimal,
    pub leverage_maintenance: Decimal,
    /// Flat swap per unit of volume for long positions
    pub swap_long: Decimal,
    pub swap_short: Decimal,
    /// Swap as a fraction of open notional, long positions
    pub swap_long_pct: Decimal,
    pub swap_short_pct: Decimal,
    /// Commission per unit of volume on open and on close
    pub commission_lot: Decimal,
}

impl AccountAssetPair {
    pub fn new(
        trading_condition_id: impl Into<String>,
        base_asset_id: impl Into<String>,
        instrument: impl Into<InstrumentId>,
        leverage_init: Decimal,
        leverage_maintenance: Decimal,
    ) -> Self {
        Self {
            trading_condition_id: trading_condition_id.into(),
            base_asset_id: base_asset_id.into(),
            instrument: instrument.into(),
            leverage_init,
            leverage_maintenance,
            swap_long: Decimal::ZERO,
            swap_short: Decimal::ZERO,
            swap_long_pct: Decimal::ZERO,
            swap_short_pct: Decimal::ZERO,
            commission_lot: Decimal::ZERO,
        }
    }
}

/// Margin thresholds for accounts of one trading condition and asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountGroup {
    pub trading_condition_id: String,
    pub base_asset_id: String,
    pub margin_call: Decimal,
    pub stop_out: Decimal,
}
