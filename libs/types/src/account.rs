//! Margin accounts and their cached financial state

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, ClientId};

/// Margin classification of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AccountLevel {
    #[default]
    None,
    MarginCall,
    StopOut,
}

/// Derived account figures, recomputed from the account's open orders.
///
/// Valid only while `dirty_counter == computed_counter`. Every change that
/// can affect the figures bumps `dirty_counter`; a recompute copies the
/// dirty counter it observed into `computed_counter`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountFplState {
    /// Σ order fpl
    pub pnl: Decimal,
    /// Σ order maintenance margin
    pub used_margin: Decimal,
    /// Σ order initial margin
    pub margin_init: Decimal,
    pub open_positions_count: usize,
    /// Usage threshold for `MarginCall`
    pub margin_call_level: Decimal,
    /// Usage threshold for `StopOut`
    pub stop_out_level: Decimal,
    pub dirty_counter: u64,
    pub computed_counter: u64,
}

impl AccountFplState {
    pub fn new(margin_call_level: Decimal, stop_out_level: Decimal) -> Self {
        Self {
            margin_call_level,
            stop_out_level,
            // starts dirty so the first read computes
            dirty_counter: 1,
            ..Self::default()
        }
    }

    pub fn invalidate(&mut self) {
        self.dirty_counter += 1;
    }

    pub fn is_valid(&self) -> bool {
        self.dirty_counter == self.computed_counter
    }

    /// `balance + Σ fpl`
    pub fn total_capital(&self, balance: Decimal) -> Decimal {
        balance + self.pnl
    }

    /// `|used_margin / total_capital|`, zero when there is no capital
    pub fn margin_usage_level(&self, balance: Decimal) -> Decimal {
        let capital = self.total_capital(balance);
        if capital.is_zero() {
            return Decimal::ZERO;
        }
        (self.used_margin / capital).abs()
    }

    /// Capital not tied up as maintenance margin
    pub fn free_margin(&self, balance: Decimal) -> Decimal {
        self.total_capital(balance) - self.used_margin
    }

    /// Capital not tied up as initial margin; new positions must fit here
    pub fn margin_available(&self, balance: Decimal) -> Decimal {
        self.total_capital(balance) - self.margin_init
    }

    /// Classify usage against the account's thresholds
    pub fn level(&self, balance: Decimal) -> AccountLevel {
        let usage = self.margin_usage_level(balance);
        if usage >= self.stop_out_level {
            AccountLevel::StopOut
        } else if usage >= self.margin_call_level {
            AccountLevel::MarginCall
        } else {
            AccountLevel::None
        }
    }
}

/// Margin trading account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub client_id: ClientId,
    pub trading_condition_id: String,
    /// Asset the balance is denominated in
    pub base_asset_id: String,
    pub balance: Decimal,
    pub withdraw_transfer_limit: Decimal,
    pub fpl_state: AccountFplState,
}

impl Account {
    pub fn new(
        client_id: ClientId,
        trading_condition_id: impl Into<String>,
        base_asset_id: impl Into<String>,
        balance: Decimal,
    ) -> Self {
        Self {
            id: AccountId::new(),
            client_id,
            trading_condition_id: trading_condition_id.into(),
            base_asset_id: base_asset_id.into(),
            balance,
            withdraw_transfer_limit: Decimal::ZERO,
            fpl_state: AccountFplState::default(),
        }
    }

    pub fn total_capital(&self) -> Decimal {
        self.fpl_state.total_capital(self.balance)
    }

    pub fn margin_usage_level(&self) -> Decimal {
        self.fpl_state.margin_usage_level(self.balance)
    }

    pub fn free_margin(&self) -> Decimal {
        self.fpl_state.free_margin(self.balance)
    }

    pub fn level(&self) -> AccountLevel {
        self.fpl_state.level(self.balance)
    }
}
