//! Per-account cached financial state
//!
//! Every account entry owns its open and pending orders and sits behind its
//! own `parking_lot::RwLock`. Anything that can change the account's figures
//! (order set, balance, a quote on one of its instruments) bumps the dirty
//! counter; reads recompute under the entry's write lock when the counters
//! differ.
//!
//! Lock order: an entry lock may be held while touching the instrument
//! index, never the reverse. Index changes for an account happen under that
//! account's entry write lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use types::account::{Account, AccountFplState, AccountLevel};
use types::errors::{AccountError, OrderError, TradingError};
use types::ids::{AccountId, InstrumentId, OrderId};
use types::order::{Order, RejectReason};

use crate::assets::TradingConditionsCache;
use crate::events::{event_for_transition, RiskEvent};
use crate::fpl::FplService;
use crate::margin;

#[derive(Debug)]
struct AccountEntry {
    account: Account,
    /// Active and pending orders
    orders: HashMap<OrderId, Order>,
    /// Level seen by the last `evaluate`
    last_level: AccountLevel,
}

impl AccountEntry {
    fn invalidate(&mut self) {
        self.account.fpl_state.invalidate();
    }

    fn has_instrument(&self, instrument: &InstrumentId) -> bool {
        self.orders.values().any(|order| &order.instrument == instrument)
    }
}

pub struct AccountStateCache {
    accounts: DashMap<AccountId, Arc<RwLock<AccountEntry>>>,
    by_instrument: DashMap<InstrumentId, HashSet<AccountId>>,
    fpl: Arc<FplService>,
    trading_conditions: Arc<TradingConditionsCache>,
}

impl AccountStateCache {
    pub fn new(fpl: Arc<FplService>, trading_conditions: Arc<TradingConditionsCache>) -> Self {
        Self {
            accounts: DashMap::new(),
            by_instrument: DashMap::new(),
            fpl,
            trading_conditions,
        }
    }

    fn entry(&self, account_id: &AccountId) -> Result<Arc<RwLock<AccountEntry>>, AccountError> {
        self.accounts
            .get(account_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| AccountError::NotFound {
                account_id: account_id.to_string(),
            })
    }

    /// Register an account, or refresh an existing one's static data.
    ///
    /// Margin thresholds come from the account group of its trading
    /// condition and base asset.
    pub fn add_account(&self, mut account: Account) -> Result<(), TradingError> {
        let group = self
            .trading_conditions
            .get_account_group(&account.trading_condition_id, &account.base_asset_id)?;
        account.fpl_state = AccountFplState::new(group.margin_call, group.stop_out);

        if let Ok(existing) = self.entry(&account.id) {
            let mut entry = existing.write();
            entry.account = account;
            entry.invalidate();
            return Ok(());
        }

        debug!(account_id = %account.id, client_id = %account.client_id, "Account added");
        self.accounts.insert(
            account.id,
            Arc::new(RwLock::new(AccountEntry {
                account,
                orders: HashMap::new(),
                last_level: AccountLevel::None,
            })),
        );
        Ok(())
    }

    pub fn contains(&self, account_id: &AccountId) -> bool {
        self.accounts.contains_key(account_id)
    }

    /// Insert or replace an active or pending order. Terminal orders are
    /// removed instead.
    pub fn upsert_order(&self, order: Order) -> Result<(), TradingError> {
        if order.status.is_terminal() {
            self.remove_order(&order.account_id, &order.id)?;
            return Ok(());
        }

        let entry = self.entry(&order.account_id)?;
        let mut entry = entry.write();
        self.insert_locked(&mut entry, order);
        Ok(())
    }

    pub fn remove_order(&self, account_id: &AccountId, order_id: &OrderId) -> Result<Option<Order>, TradingError> {
        let entry = self.entry(account_id)?;
        let mut entry = entry.write();
        Ok(self.remove_locked(&mut entry, order_id))
    }

    /// Admit a freshly filled position if the account can carry it.
    ///
    /// The margin check and the insert happen under one entry lock, so two
    /// opens on the same account never both pass against the same figures.
    /// Computes the order's FPL memo as a side effect. When the figures
    /// cannot be computed the position is admitted unchecked.
    pub fn open_position(&self, order: &mut Order) -> Result<Option<RejectReason>, TradingError> {
        let memo = self.fpl.update_order_fpl(order);

        let entry = self.entry(&order.account_id)?;
        let mut entry = entry.write();
        let checked = memo.and_then(|_| {
            self.fresh(&mut entry)
                .map(|account| margin::check_new_position(account, order))
        });
        match checked {
            Ok(Some(reason)) => return Ok(Some(reason)),
            Ok(None) => {}
            Err(err) => {
                warn!(order_id = %order.id, error = %err, "Margin check unavailable; admitting position");
            }
        }

        self.insert_locked(&mut entry, order.clone());
        Ok(None)
    }

    /// Remove a closed position and credit `realized` to the balance under
    /// one entry lock.
    ///
    /// Returns the new balance, or `None` (balance untouched) when the order
    /// was no longer held.
    pub fn close_position(
        &self,
        account_id: &AccountId,
        order_id: &OrderId,
        realized: Decimal,
    ) -> Result<Option<Decimal>, TradingError> {
        let entry = self.entry(account_id)?;
        let mut entry = entry.write();
        if self.remove_locked(&mut entry, order_id).is_none() {
            return Ok(None);
        }
        entry.account.balance += realized;
        info!(
            account_id = %account_id,
            order_id = %order_id,
            realized = %realized,
            balance = %entry.account.balance,
            "Position realized"
        );
        Ok(Some(entry.account.balance))
    }

    fn insert_locked(&self, entry: &mut AccountEntry, order: Order) {
        self.by_instrument
            .entry(order.instrument.clone())
            .or_default()
            .insert(entry.account.id);
        entry.orders.insert(order.id, order);
        entry.invalidate();
    }

    fn remove_locked(&self, entry: &mut AccountEntry, order_id: &OrderId) -> Option<Order> {
        let removed = entry.orders.remove(order_id)?;
        entry.invalidate();

        if !entry.has_instrument(&removed.instrument) {
            let account_id = entry.account.id;
            if let Some(mut accounts) = self.by_instrument.get_mut(&removed.instrument) {
                accounts.remove(&account_id);
            }
            self.by_instrument
                .remove_if(&removed.instrument, |_, accounts| accounts.is_empty());
        }
        Some(removed)
    }

    /// Add `delta` to the balance, returning the new balance
    pub fn update_balance(&self, account_id: &AccountId, delta: Decimal) -> Result<Decimal, TradingError> {
        let entry = self.entry(account_id)?;
        let mut entry = entry.write();
        entry.account.balance += delta;
        entry.invalidate();
        info!(account_id = %account_id, delta = %delta, balance = %entry.account.balance, "Balance updated");
        Ok(entry.account.balance)
    }

    /// Invalidate every account holding orders on `instrument`.
    ///
    /// Returns the affected accounts in id order.
    pub fn on_quote(&self, instrument: &InstrumentId) -> Vec<AccountId> {
        let mut affected: Vec<AccountId> = self
            .by_instrument
            .get(instrument)
            .map(|accounts| accounts.iter().copied().collect())
            .unwrap_or_default();
        affected.sort();

        for account_id in &affected {
            if let Ok(entry) = self.entry(account_id) {
                entry.write().invalidate();
            }
        }
        affected
    }

    fn recompute(&self, entry: &mut AccountEntry) -> Result<(), TradingError> {
        let observed = entry.account.fpl_state.dirty_counter;
        let mut pnl = Decimal::ZERO;
        let mut used_margin = Decimal::ZERO;
        let mut margin_init = Decimal::ZERO;
        let mut open_positions = 0;

        for order in entry.orders.values_mut().filter(|order| order.is_active()) {
            self.fpl.update_order_fpl(order)?;
            pnl += order.fpl();
            used_margin += order.margin_maintenance();
            margin_init += order.margin_init();
            open_positions += 1;
        }

        let state = &mut entry.account.fpl_state;
        state.pnl = pnl;
        state.used_margin = used_margin;
        state.margin_init = margin_init;
        state.open_positions_count = open_positions;
        state.computed_counter = observed;
        Ok(())
    }

    fn fresh<'a>(&self, entry: &'a mut AccountEntry) -> Result<&'a Account, TradingError> {
        if !entry.account.fpl_state.is_valid() {
            if let Err(err) = self.recompute(entry) {
                warn!(account_id = %entry.account.id, error = %err, "Account state recompute failed");
                return Err(err);
            }
        }
        Ok(&entry.account)
    }

    /// Account with up-to-date figures
    pub fn state(&self, account_id: &AccountId) -> Result<Account, TradingError> {
        let entry = self.entry(account_id)?;
        let mut entry = entry.write();
        Ok(self.fresh(&mut entry)?.clone())
    }

    pub fn level(&self, account_id: &AccountId) -> Result<AccountLevel, TradingError> {
        Ok(self.state(account_id)?.level())
    }

    /// Fresh state plus an event if the level worsened since the last call
    pub fn evaluate(
        &self,
        account_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<(Account, Option<RiskEvent>), TradingError> {
        let entry = self.entry(account_id)?;
        let mut entry = entry.write();
        let account = self.fresh(&mut entry)?.clone();

        let level = account.level();
        let event = event_for_transition(&account, entry.last_level, level, now);
        if level != entry.last_level {
            info!(account_id = %account_id, from = ?entry.last_level, to = ?level, "Account level changed");
        }
        entry.last_level = level;
        Ok((account, event))
    }

    /// Open positions with refreshed FPL, oldest first
    pub fn active_orders(&self, account_id: &AccountId) -> Result<Vec<Order>, TradingError> {
        let entry = self.entry(account_id)?;
        let mut entry = entry.write();
        self.fresh(&mut entry)?;
        Ok(sorted(entry.orders.values().filter(|o| o.is_active()).cloned().collect()))
    }

    pub fn pending_orders(&self, account_id: &AccountId) -> Result<Vec<Order>, AccountError> {
        let entry = self.entry(account_id)?;
        let entry = entry.read();
        Ok(sorted(entry.orders.values().filter(|o| o.is_pending()).cloned().collect()))
    }

    pub fn get_order(&self, account_id: &AccountId, order_id: &OrderId) -> Result<Order, TradingError> {
        let entry = self.entry(account_id)?;
        let entry = entry.read();
        entry.orders.get(order_id).cloned().ok_or_else(|| {
            OrderError::NotFound {
                order_id: order_id.to_string(),
            }
            .into()
        })
    }

    /// Active and pending orders on `instrument` across all accounts
    pub fn orders_for_instrument(&self, instrument: &InstrumentId) -> Vec<Order> {
        let account_ids: Vec<AccountId> = self
            .by_instrument
            .get(instrument)
            .map(|accounts| accounts.iter().copied().collect())
            .unwrap_or_default();

        let mut orders = Vec::new();
        for account_id in account_ids {
            if let Ok(entry) = self.entry(&account_id) {
                let entry = entry.read();
                orders.extend(
                    entry
                        .orders
                        .values()
                        .filter(|order| &order.instrument == instrument)
                        .cloned(),
                );
            }
        }
        sorted(orders)
    }

    pub fn account_ids(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self.accounts.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }
}

fn sorted(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    orders
}
