//! Fixed-point decimal helpers for prices and volumes
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Rounding is HALF_UP (`MidpointAwayFromZero`) everywhere.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decimal places used to decide whether a volume is fully matched.
pub const VOLUME_ACCURACY: u32 = 8;

/// Strictly positive price.
///
/// Used as the key of order-book price levels, so it is totally ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Create a price, returning None unless the value is > 0
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Create a price from a whole number
    ///
    /// # Panics
    /// Panics if `value` is zero
    pub fn from_u64(value: u64) -> Self {
        assert!(value > 0, "Price must be positive");
        Self(Decimal::from(value))
    }

    /// Parse a price from its decimal string form
    pub fn from_str(value: &str) -> Option<Self> {
        Decimal::from_str_exact(value).ok().and_then(Self::try_new)
    }

    /// Get the underlying decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Round a volume to [`VOLUME_ACCURACY`] decimal places.
pub fn round_volume(volume: Decimal) -> Decimal {
    volume.round_dp_with_strategy(VOLUME_ACCURACY, RoundingStrategy::MidpointAwayFromZero)
}

/// True when a remaining volume rounds to zero.
pub fn is_zero_volume(volume: Decimal) -> bool {
    round_volume(volume).is_zero()
}

/// Round a price or amount to an instrument's accuracy (decimal digits).
pub fn round_to_accuracy(value: Decimal, accuracy: u32) -> Decimal {
    value.round_dp_with_strategy(accuracy, RoundingStrategy::MidpointAwayFromZero)
}
