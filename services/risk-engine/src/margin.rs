//! Margin usage and account level classification
//!
//! `usage = |used_margin / total_capital|` (zero when capital is zero),
//! `total_capital = balance + Σ fpl`. The level is `StopOut` at or above the
//! stop-out threshold, else `MarginCall` at or above the margin-call
//! threshold, else `None`.

use rust_decimal::Decimal;
use types::account::{Account, AccountFplState, AccountLevel};
use types::order::{Order, RejectReason};

pub fn margin_usage_level(account: &Account) -> Decimal {
    account.margin_usage_level()
}

pub fn account_level(account: &Account) -> AccountLevel {
    account.level()
}

/// Account figures as if `order` were already one of its open positions
pub fn projected_state(account: &Account, order: &Order) -> AccountFplState {
    let mut state = account.fpl_state.clone();
    state.pnl += order.fpl();
    state.used_margin += order.margin_maintenance();
    state.margin_init += order.margin_init();
    state.open_positions_count += 1;
    state
}

/// Post-match check for a freshly opened position.
///
/// `NotEnoughBalance` when the initial margin no longer fits the capital,
/// `LeadToStopOut` when the account would land at stop-out.
pub fn check_new_position(account: &Account, order: &Order) -> Option<RejectReason> {
    let state = projected_state(account, order);
    if state.margin_available(account.balance) < Decimal::ZERO {
        return Some(RejectReason::NotEnoughBalance);
    }
    if state.level(account.balance) == AccountLevel::StopOut {
        return Some(RejectReason::LeadToStopOut);
    }
    None
}

/// Pre-trade check for an order that is not matched yet
pub fn check_margin_available(account: &Account, required_margin_init: Decimal) -> Option<RejectReason> {
    if account.fpl_state.margin_available(account.balance) < required_margin_init {
        Some(RejectReason::NotEnoughBalance)
    } else {
        None
    }
}
