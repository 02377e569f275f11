//! Pre-trade validation of new orders

use std::sync::Arc;

use risk_engine::RiskEngine;
use rust_decimal::Decimal;
use tracing::debug;
use types::account::AccountLevel;
use types::errors::{AccountError, TradingError};
use types::numeric::round_volume;
use types::order::{Order, RejectReason, Side};

/// Why a new order was refused before reaching a matching engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRejection {
    pub reason: RejectReason,
    pub message: String,
}

impl OrderRejection {
    pub fn new(reason: RejectReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

pub trait PreTradeValidator: Send + Sync {
    fn validate_new_order(&self, order: &Order) -> Result<(), OrderRejection>;
}

/// Checks instrument, account, volume, prices and trading condition
/// against the risk engine's caches.
pub struct DefaultOrderValidator {
    risk: Arc<RiskEngine>,
    max_order_volume: Option<Decimal>,
}

impl DefaultOrderValidator {
    pub fn new(risk: Arc<RiskEngine>, max_order_volume: Option<Decimal>) -> Self {
        Self { risk, max_order_volume }
    }

    fn check_volume(&self, order: &Order) -> Result<(), OrderRejection> {
        let volume = round_volume(order.volume);
        if volume.is_zero() {
            return Err(OrderRejection::new(RejectReason::InvalidVolume, "Volume cannot be zero"));
        }
        if let Some(max) = self.max_order_volume {
            if volume.abs() > max {
                return Err(OrderRejection::new(
                    RejectReason::InvalidVolume,
                    format!("Volume {} exceeds the maximum of {}", volume.abs(), max),
                ));
            }
        }
        Ok(())
    }

    fn check_account(&self, order: &Order) -> Result<(), OrderRejection> {
        let account = match self.risk.account_state(&order.account_id) {
            Ok(account) => account,
            Err(TradingError::Account(AccountError::NotFound { .. })) => {
                return Err(OrderRejection::new(RejectReason::InvalidAccount, "Account does not exist"));
            }
            Err(err) => {
                return Err(OrderRejection::new(RejectReason::TechnicalError, err.to_string()));
            }
        };

        if account.client_id != order.client_id {
            return Err(OrderRejection::new(
                RejectReason::InvalidAccount,
                "Account does not belong to the client",
            ));
        }
        if account.trading_condition_id != order.trading_condition_id || account.base_asset_id != order.account_asset_id
        {
            return Err(OrderRejection::new(
                RejectReason::InvalidAccount,
                "Order trading condition or asset differs from the account's",
            ));
        }
        if account.level() == AccountLevel::StopOut {
            return Err(OrderRejection::new(
                RejectReason::AccountInvalidState,
                "Account is at the stop-out level",
            ));
        }
        Ok(())
    }

    /// Price the new position would open at: the expected price for pending
    /// orders, otherwise the current quote if there is one
    fn reference_price(&self, order: &Order) -> Result<Option<Decimal>, OrderRejection> {
        if let Some(expected) = order.expected_open_price {
            if expected <= Decimal::ZERO {
                return Err(OrderRejection::new(
                    RejectReason::InvalidExpectedOpenPrice,
                    "Expected open price must be positive",
                ));
            }
            return Ok(Some(expected));
        }
        Ok(self.risk.quotes().best_price(&order.instrument, order.direction()).ok())
    }

    fn check_stops(&self, order: &Order, price: Decimal) -> Result<(), OrderRejection> {
        let direction = order.direction();
        if let Some(take_profit) = order.take_profit {
            let valid = match direction {
                Side::BUY => take_profit > price,
                Side::SELL => take_profit < price && take_profit > Decimal::ZERO,
            };
            if !valid {
                return Err(OrderRejection::new(
                    RejectReason::InvalidTakeProfit,
                    format!("Take profit {} is on the wrong side of {}", take_profit, price),
                ));
            }
        }
        if let Some(stop_loss) = order.stop_loss {
            let valid = match direction {
                Side::BUY => stop_loss < price && stop_loss > Decimal::ZERO,
                Side::SELL => stop_loss > price,
            };
            if !valid {
                return Err(OrderRejection::new(
                    RejectReason::InvalidStoploss,
                    format!("Stop loss {} is on the wrong side of {}", stop_loss, price),
                ));
            }
        }
        Ok(())
    }
}

impl PreTradeValidator for DefaultOrderValidator {
    fn validate_new_order(&self, order: &Order) -> Result<(), OrderRejection> {
        self.check_volume(order)?;

        if self.risk.asset_pairs().get(&order.instrument).is_err() {
            return Err(OrderRejection::new(
                RejectReason::InvalidInstrument,
                format!("Unknown instrument {}", order.instrument),
            ));
        }

        self.check_account(order)?;

        if let Err(err) = self.risk.trading_conditions().get_account_asset(
            &order.trading_condition_id,
            &order.account_asset_id,
            &order.instrument,
        ) {
            return Err(OrderRejection::new(RejectReason::TradingConditionError, err.to_string()));
        }

        if let Some(price) = self.reference_price(order)? {
            self.check_stops(order, price)?;
        }

        debug!(order_id = %order.id, "Order passed pre-trade validation");
        Ok(())
    }
}
