//! Overnight swaps and trading commissions
//!
//! A swap is charged for every daily cutoff instant `b` with
//! `open <= b <= close`, weighted by a per-weekday multiplier.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use types::errors::TradingError;
use types::order::{Order, Side};

use crate::assets::TradingConditionsCache;
use crate::fpl::FplService;

/// Swap schedule configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapSettings {
    /// UTC hour of the daily swap cutoff
    pub cutoff_hour: u32,
    /// Multiplier per weekday of the cutoff, Monday first
    pub weekday_multipliers: [Decimal; 7],
}

impl Default for SwapSettings {
    fn default() -> Self {
        Self {
            cutoff_hour: 21,
            weekday_multipliers: [Decimal::ONE; 7],
        }
    }
}

impl SwapSettings {
    pub fn multiplier(&self, boundary: DateTime<Utc>) -> Decimal {
        self.weekday_multipliers[boundary.weekday().num_days_from_monday() as usize]
    }
}

pub struct SwapCommissionService {
    settings: SwapSettings,
    fpl: Arc<FplService>,
    trading_conditions: Arc<TradingConditionsCache>,
}

impl SwapCommissionService {
    pub fn new(
        settings: SwapSettings,
        fpl: Arc<FplService>,
        trading_conditions: Arc<TradingConditionsCache>,
    ) -> Self {
        Self {
            settings,
            fpl,
            trading_conditions,
        }
    }

    pub fn settings(&self) -> &SwapSettings {
        &self.settings
    }

    /// Cutoff instants `b` with `open <= b <= close`, oldest first
    pub fn swap_boundaries(&self, open: DateTime<Utc>, close: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let mut boundaries = Vec::new();
        let Some(cutoff) = NaiveTime::from_hms_opt(self.settings.cutoff_hour, 0, 0) else {
            return boundaries;
        };

        let mut boundary = open.date_naive().and_time(cutoff).and_utc();
        if boundary < open {
            boundary += Duration::days(1);
        }
        while boundary <= close {
            boundaries.push(boundary);
            boundary += Duration::days(1);
        }
        boundaries
    }

    /// Number of cutoffs crossed between `open` and `close`
    pub fn swap_count(&self, open: DateTime<Utc>, close: DateTime<Utc>) -> usize {
        self.swap_boundaries(open, close).len()
    }

    /// Accrued swaps of a position up to its close (or `now` while open)
    pub fn swaps(&self, order: &Order, now: DateTime<Utc>) -> Result<Decimal, TradingError> {
        let Some(open_date) = order.open_date else {
            return Ok(Decimal::ZERO);
        };
        let close_date = order.close_date.unwrap_or(now);

        let multiplier: Decimal = self
            .swap_boundaries(open_date, close_date)
            .into_iter()
            .map(|b| self.settings.multiplier(b))
            .sum();
        if multiplier.is_zero() {
            return Ok(Decimal::ZERO);
        }

        let settings = self.trading_conditions.get_account_asset(
            &order.trading_condition_id,
            &order.account_asset_id,
            &order.instrument,
        )?;
        let direction = order.direction();
        let rate_per_unit = match direction {
            Side::BUY => settings.swap_long + settings.swap_long_pct * order.open_price,
            Side::SELL => settings.swap_short + settings.swap_short_pct * order.open_price,
        };
        let quote_rate = self.fpl.quote_rate(&order.account_asset_id, &order.instrument, direction)?;

        let swaps = multiplier * rate_per_unit * order.position_volume().abs() * quote_rate;
        debug!(order_id = %order.id, multiplier = %multiplier, swaps = %swaps, "Swaps calculated");
        Ok(swaps)
    }

    /// Commission for trading `volume` of the order's instrument
    pub fn commission(&self, order: &Order, volume: Decimal) -> Result<Decimal, TradingError> {
        let settings = self.trading_conditions.get_account_asset(
            &order.trading_condition_id,
            &order.account_asset_id,
            &order.instrument,
        )?;
        if settings.commission_lot.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let quote_rate = self.fpl.quote_rate(&order.account_asset_id, &order.instrument, order.direction())?;
        Ok(settings.commission_lot * volume.abs() * quote_rate)
    }
}
