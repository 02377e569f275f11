//! Trading engine orchestrator
//!
//! Sequences validation, routing, matching, account update, persistence and
//! notification for order placement and closing, and reacts to quotes by
//! activating pending orders, triggering stop-loss / take-profit and
//! stopping out accounts.
//!
//! Every operation is synchronous; persistence and notification are queued
//! and never awaited.
//!
//! Mutations of one account (open, close, cancel, pending activation,
//! stop-out) run under that account's mutation guard, and the order's state
//! is re-read once the guard is held. Account evaluation that may lead to a
//! stop-out runs outside the guard; the stop-out takes it itself.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use matching_engine::{
    FillPolicy, MatchOutcome, MatchingEngine, MatchingEngineRouter, OrderBookUpdated, RouteCriteria, SetOrdersModel,
};
use parking_lot::Mutex;
use risk_engine::{RiskEngine, RiskEventType};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use types::account::{Account, AccountLevel};
use types::errors::{OrderError, RoutingError, TradingError};
use types::ids::{AccountId, InstrumentId, OrderId};
use types::order::{CloseReason, Order, OrderStatus, Side};
use types::quote::BestPrice;
use types::route::MatchingEngineRoute;

use crate::config::TradingEngineConfig;
use crate::notifications::{Notifier, TradingEvent};
use crate::persistence::{PersistenceWriter, Repositories};
use crate::validation::PreTradeValidator;

/// Collaborators the engine is wired with
pub struct EngineServices {
    pub risk: Arc<RiskEngine>,
    pub matching_engines: Vec<Arc<MatchingEngine>>,
    pub validator: Arc<dyn PreTradeValidator>,
    pub notifier: Arc<dyn Notifier>,
    pub repositories: Repositories,
    pub persistence: PersistenceWriter,
}

/// What `hydrate` loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HydrationSummary {
    pub accounts: usize,
    pub orders: usize,
    pub routes: usize,
}

pub struct TradingEngine {
    config: TradingEngineConfig,
    risk: Arc<RiskEngine>,
    router: MatchingEngineRouter,
    matching_engines: HashMap<String, Arc<MatchingEngine>>,
    validator: Arc<dyn PreTradeValidator>,
    notifier: Arc<dyn Notifier>,
    repositories: Repositories,
    persistence: PersistenceWriter,
    account_locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl TradingEngine {
    pub fn new(config: TradingEngineConfig, services: EngineServices) -> Self {
        let matching_engines: HashMap<String, Arc<MatchingEngine>> = services
            .matching_engines
            .into_iter()
            .map(|engine| (engine.id().to_string(), engine))
            .collect();

        info!(
            default_engine = %config.default_matching_engine_id,
            engines = matching_engines.len(),
            stop_out_enabled = config.stop_out_enabled,
            "Trading engine created"
        );

        Self {
            router: MatchingEngineRouter::new(config.default_matching_engine_id.clone()),
            config,
            risk: services.risk,
            matching_engines,
            validator: services.validator,
            notifier: services.notifier,
            repositories: services.repositories,
            persistence: services.persistence,
            account_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &TradingEngineConfig {
        &self.config
    }

    pub fn risk(&self) -> &Arc<RiskEngine> {
        &self.risk
    }

    pub fn router(&self) -> &MatchingEngineRouter {
        &self.router
    }

    pub fn persistence(&self) -> &PersistenceWriter {
        &self.persistence
    }

    pub fn matching_engine(&self, engine_id: &str) -> Result<Arc<MatchingEngine>, RoutingError> {
        self.matching_engines
            .get(engine_id)
            .cloned()
            .ok_or_else(|| RoutingError::EngineNotFound {
                engine_id: engine_id.to_string(),
            })
    }

    /// Load accounts, open orders and routes from the repositories
    pub async fn hydrate(&self) -> Result<HydrationSummary, TradingError> {
        let accounts = self.repositories.accounts.load_accounts().await?;
        let orders = self.repositories.orders.load_open_orders().await?;
        let routes = self.repositories.routes.load_routes().await?;

        let summary = HydrationSummary {
            accounts: accounts.len(),
            orders: orders.len(),
            routes: routes.len(),
        };

        for account in accounts {
            self.risk.accounts().add_account(account)?;
        }
        for order in orders {
            self.risk.accounts().upsert_order(order)?;
        }
        self.router.init(routes);

        info!(
            accounts = summary.accounts,
            orders = summary.orders,
            routes = summary.routes,
            "Trading engine hydrated"
        );
        Ok(summary)
    }

    pub fn add_account(&self, account: Account) -> Result<(), TradingError> {
        self.risk.accounts().add_account(account.clone())?;
        self.persistence.save_account(&account);
        Ok(())
    }

    /// Validate and execute a new order.
    ///
    /// Orders with an expected open price wait for the market to reach it;
    /// all others are matched immediately. Rejections come back as the
    /// order in the `Rejected` state, faults as `Err`.
    pub fn place_order(&self, mut order: Order) -> Result<Order, TradingError> {
        let now = Utc::now();

        if let Err(rejection) = self.validator.validate_new_order(&order) {
            info!(
                order_id = %order.id,
                reason = ?rejection.reason,
                message = %rejection.message,
                "Order rejected by validation"
            );
            order.reject(rejection.reason, rejection.message, now);
            self.publish_order(&order);
            return Ok(order);
        }

        let settings = self.risk.trading_conditions().get_account_asset(
            &order.trading_condition_id,
            &order.account_asset_id,
            &order.instrument,
        )?;
        order.commission_lot = settings.commission_lot;

        let account_id = order.account_id;
        let order = {
            let lock = self.account_lock(&account_id);
            let _guard = lock.lock();
            if order.expected_open_price.is_some() {
                self.place_pending(order, now)?
            } else {
                self.execute_open(order, now)?
            }
        };

        if order.is_active() {
            self.check_account(&account_id, now);
        }
        Ok(order)
    }

    /// Guard serializing mutations of one account
    fn account_lock(&self, account_id: &AccountId) -> Arc<Mutex<()>> {
        Arc::clone(self.account_locks.entry(*account_id).or_default().value())
    }

    fn place_pending(&self, mut order: Order, now: DateTime<Utc>) -> Result<Order, TradingError> {
        if let Some(reason) = self.risk.check_pending_order(&order)? {
            info!(order_id = %order.id, reason = ?reason, "Pending order rejected");
            order.reject(reason, "Not enough margin for the pending order", now);
            self.publish_order(&order);
            return Ok(order);
        }

        self.risk.accounts().upsert_order(order.clone())?;
        info!(
            order_id = %order.id,
            expected_open_price = ?order.expected_open_price,
            "Pending order accepted"
        );
        self.publish_order(&order);
        Ok(order)
    }

    fn execute_open(&self, mut order: Order, now: DateTime<Utc>) -> Result<Order, TradingError> {
        let engine = self.route(&order)?;
        let policy = FillPolicy::from(order.fill_type);
        let outcome = engine.match_for_open(&mut order, policy, now);
        if let MatchOutcome::Matched { book_update, .. } = &outcome {
            self.publish_book_update(book_update);
        }

        if order.status == OrderStatus::Rejected {
            self.risk.accounts().remove_order(&order.account_id, &order.id)?;
            self.publish_order(&order);
            return Ok(order);
        }

        order.open_commission = self.commission_or_zero(&order, order.position_volume());

        if let Some(reason) = self.risk.open_position(&mut order)? {
            // fills are committed and stay with the liquidity providers
            warn!(order_id = %order.id, reason = ?reason, "Position rejected after match");
            order.reject(reason, "Margin check failed after match", now);
            self.risk.accounts().remove_order(&order.account_id, &order.id)?;
            self.publish_order(&order);
            return Ok(order);
        }

        self.publish_order(&order);
        Ok(order)
    }

    /// Close an open position against the engine that opened it.
    ///
    /// With no liquidity the position is returned unchanged.
    pub fn close_order(
        &self,
        account_id: &AccountId,
        order_id: &OrderId,
        reason: CloseReason,
    ) -> Result<Order, TradingError> {
        let lock = self.account_lock(account_id);
        let _guard = lock.lock();
        self.close_locked(account_id, order_id, reason, Utc::now())
    }

    /// Close under a held account guard
    fn close_locked(
        &self,
        account_id: &AccountId,
        order_id: &OrderId,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> Result<Order, TradingError> {
        let mut order = self.risk.accounts().get_order(account_id, order_id)?;
        if !order.is_active() {
            return Err(OrderError::InvalidStateTransition {
                from: format!("{:?}", order.status),
                to: "Closing".to_string(),
            }
            .into());
        }

        let engine = match &order.matching_engine_id {
            Some(engine_id) => self.matching_engine(engine_id)?,
            None => self.route(&order)?,
        };
        let policy = if self.config.partial_close_allowed {
            FillPolicy::PartialFill
        } else {
            FillPolicy::FillOrKill
        };

        let outcome = engine.match_for_close(&mut order, policy, reason, now);
        let MatchOutcome::Matched { fills, book_update } = &outcome else {
            return Ok(order);
        };
        self.publish_book_update(book_update);

        let closed_volume: Decimal = fills.iter().map(|fill| fill.volume).sum();
        let commission = self.commission_or_zero(&order, closed_volume);
        order.close_commission += commission;

        if order.status == OrderStatus::Closed {
            self.finalize_close(&mut order, now)?;
        } else {
            self.risk.accounts().upsert_order(order.clone())?;
            self.publish_order(&order);
        }
        Ok(order)
    }

    /// Realize FPL net of commissions and swaps into the balance
    fn finalize_close(&self, order: &mut Order, now: DateTime<Utc>) -> Result<(), TradingError> {
        let swaps = match self.risk.swaps().swaps(order, now) {
            Ok(swaps) => swaps,
            Err(err) => {
                warn!(order_id = %order.id, error = %err, "Swaps unavailable at close");
                order.swap_commission
            }
        };
        order.swap_commission = swaps;

        if let Err(err) = self.risk.fpl().update_order_fpl(order) {
            warn!(order_id = %order.id, error = %err, "Realized FPL uses the last computed value");
        }

        let realized = order.fpl() - order.open_commission - order.close_commission - order.swap_commission;
        if self
            .risk
            .accounts()
            .close_position(&order.account_id, &order.id, realized)?
            .is_none()
        {
            warn!(order_id = %order.id, "Closed position was no longer held; nothing realized");
            return Ok(());
        }

        info!(
            order_id = %order.id,
            account_id = %order.account_id,
            close_price = %order.close_price,
            fpl = %order.fpl(),
            realized = %realized,
            reason = ?order.close_reason,
            "Position closed"
        );
        self.publish_order(order);
        self.publish_account(&order.account_id);
        Ok(())
    }

    pub fn cancel_pending_order(&self, account_id: &AccountId, order_id: &OrderId) -> Result<Order, TradingError> {
        let lock = self.account_lock(account_id);
        let _guard = lock.lock();
        let mut order = self.risk.accounts().get_order(account_id, order_id)?;
        if !order.is_pending() {
            return Err(OrderError::InvalidStateTransition {
                from: format!("{:?}", order.status),
                to: "Closed".to_string(),
            }
            .into());
        }

        order.status = OrderStatus::Closed;
        order.close_reason = Some(CloseReason::Canceled);
        order.close_date = Some(Utc::now());
        order.version += 1;

        self.risk.accounts().remove_order(account_id, order_id)?;
        info!(order_id = %order.id, "Pending order canceled");
        self.publish_order(&order);
        Ok(order)
    }

    /// Apply a quote: refresh affected accounts, activate pending orders,
    /// trigger stop-loss / take-profit and stop out accounts that need it.
    pub fn set_quote(&self, quote: BestPrice) -> Result<(), TradingError> {
        let now = Utc::now();
        let instrument = quote.instrument.clone();
        let affected = self.risk.set_quote(quote.clone())?;

        self.activate_pending_orders(&instrument, &quote, now);
        self.process_stops(&instrument);

        for account_id in &affected {
            self.check_account(account_id, now);
        }
        Ok(())
    }

    /// Apply a market maker's update to one engine; each new top of book is
    /// published and applied as a quote.
    pub fn set_orders(&self, engine_id: &str, model: SetOrdersModel) -> Result<Vec<OrderBookUpdated>, TradingError> {
        let engine = self.matching_engine(engine_id)?;
        let updates = engine.set_orders(model, Utc::now());

        for update in &updates {
            if let Some(best_price) = &update.best_price {
                self.notifier.notify(TradingEvent::OrderBookPrice(best_price.clone()));
                if let Err(err) = self.set_quote(best_price.clone()) {
                    warn!(instrument = %update.instrument, error = %err, "Book price not applied as quote");
                }
            }
        }
        Ok(updates)
    }

    pub fn add_or_replace_route(&self, route: MatchingEngineRoute) {
        self.persistence.save_route(&route);
        self.router.add_or_replace_route(route);
    }

    pub fn remove_route(&self, route_id: &str) -> Option<MatchingEngineRoute> {
        let removed = self.router.remove_route(route_id);
        if removed.is_some() {
            self.persistence.delete_route(route_id);
        }
        removed
    }

    pub fn account_state(&self, account_id: &AccountId) -> Result<Account, TradingError> {
        self.risk.account_state(account_id)
    }

    fn route(&self, order: &Order) -> Result<Arc<MatchingEngine>, TradingError> {
        let asset_pair = self.risk.asset_pairs().get(&order.instrument).ok();
        let criteria = RouteCriteria {
            trading_condition_id: &order.trading_condition_id,
            client_id: &order.client_id,
            instrument: &order.instrument,
            direction: order.direction(),
            asset_pair: asset_pair.as_ref(),
        };
        let engine_id = self.router.route_for(&criteria)?;
        debug!(order_id = %order.id, engine_id = %engine_id, "Order routed");
        self.matching_engine(&engine_id).map_err(TradingError::from)
    }

    fn commission_or_zero(&self, order: &Order, volume: Decimal) -> Decimal {
        self.risk.swaps().commission(order, volume).unwrap_or_else(|err| {
            warn!(order_id = %order.id, error = %err, "Commission unavailable; charging none");
            Decimal::ZERO
        })
    }

    fn activate_pending_orders(&self, instrument: &InstrumentId, quote: &BestPrice, now: DateTime<Utc>) {
        let pending = self
            .risk
            .accounts()
            .orders_for_instrument(instrument)
            .into_iter()
            .filter(Order::is_pending);

        for candidate in pending {
            let Some(expected) = candidate.expected_open_price else {
                continue;
            };
            let reached = match candidate.direction() {
                Side::BUY => quote.ask <= expected,
                Side::SELL => quote.bid >= expected,
            };
            if !reached {
                continue;
            }

            let account_id = candidate.account_id;
            let executed = {
                let lock = self.account_lock(&account_id);
                let _guard = lock.lock();
                // canceled or already activated by another caller
                match self.risk.accounts().get_order(&account_id, &candidate.id) {
                    Ok(order) if order.is_pending() => {
                        debug!(order_id = %order.id, expected = %expected, "Pending order activated");
                        self.execute_open(order, now)
                    }
                    _ => continue,
                }
            };

            match executed {
                Ok(order) if order.is_active() => self.check_account(&account_id, now),
                Ok(_) => {}
                Err(err) => warn!(order_id = %candidate.id, error = %err, "Pending order execution failed"),
            }
        }
    }

    fn process_stops(&self, instrument: &InstrumentId) {
        let triggered: Vec<(Order, CloseReason)> = self
            .risk
            .accounts()
            .orders_for_instrument(instrument)
            .into_iter()
            .filter(|order| order.status == OrderStatus::Active)
            .filter_map(|order| self.stop_reason(&order).map(|reason| (order, reason)))
            .collect();

        for (order, reason) in triggered {
            info!(order_id = %order.id, reason = ?reason, "Stop triggered");
            if let Err(err) = self.close_order(&order.account_id, &order.id, reason) {
                warn!(order_id = %order.id, error = %err, "Stop close failed");
            }
        }
    }

    fn stop_reason(&self, order: &Order) -> Option<CloseReason> {
        if order.take_profit.is_none() && order.stop_loss.is_none() {
            return None;
        }
        let price = self.risk.fpl().close_price(order).ok()?;
        let long = order.direction() == Side::BUY;

        if let Some(take_profit) = order.take_profit {
            if (long && price >= take_profit) || (!long && price <= take_profit) {
                return Some(CloseReason::TakeProfit);
            }
        }
        if let Some(stop_loss) = order.stop_loss {
            if (long && price <= stop_loss) || (!long && price >= stop_loss) {
                return Some(CloseReason::StopLoss);
            }
        }
        None
    }

    fn check_account(&self, account_id: &AccountId, now: DateTime<Utc>) {
        let (account, event) = match self.risk.evaluate_account(account_id, now) {
            Ok(evaluated) => evaluated,
            Err(err) => {
                warn!(account_id = %account_id, error = %err, "Account evaluation failed");
                return;
            }
        };

        if let Some(event) = event {
            if event.event_type == RiskEventType::MarginCall {
                info!(account_id = %account_id, usage = %event.margin_usage_level, "Margin call");
                self.notifier.notify(TradingEvent::MarginCall(event));
            }
        }

        if account.level() == AccountLevel::StopOut {
            if self.config.stop_out_enabled {
                self.stop_out(&account);
            } else {
                warn!(account_id = %account_id, "Account at stop-out; processing disabled");
            }
        }
    }

    /// Close positions, worst FPL first, until the account leaves stop-out
    fn stop_out(&self, account: &Account) {
        let lock = self.account_lock(&account.id);
        let _guard = lock.lock();

        // another caller may have cleared the level before the guard was taken
        match self.risk.account_state(&account.id) {
            Ok(state) if state.level() == AccountLevel::StopOut => {}
            Ok(_) => return,
            Err(err) => {
                warn!(account_id = %account.id, error = %err, "Stop-out skipped");
                return;
            }
        }

        let now = Utc::now();
        let mut positions = match self.risk.accounts().active_orders(&account.id) {
            Ok(positions) => positions,
            Err(err) => {
                warn!(account_id = %account.id, error = %err, "Stop-out could not list positions");
                return;
            }
        };
        positions.sort_by(|a, b| a.fpl().cmp(&b.fpl()).then_with(|| a.created_at.cmp(&b.created_at)));

        warn!(
            account_id = %account.id,
            usage = %account.margin_usage_level(),
            positions = positions.len(),
            "Stop-out"
        );

        let mut closed = 0;
        let mut total_pnl = Decimal::ZERO;
        for position in positions {
            match self.close_locked(&account.id, &position.id, CloseReason::StopOut, now) {
                Ok(order) if order.status == OrderStatus::Closed => {
                    closed += 1;
                    total_pnl += order.fpl();
                }
                Ok(_) => {}
                Err(err) => warn!(order_id = %position.id, error = %err, "Stop-out close failed"),
            }

            match self.risk.account_state(&account.id) {
                Ok(state) if state.level() != AccountLevel::StopOut => break,
                Ok(_) => {}
                Err(err) => {
                    warn!(account_id = %account.id, error = %err, "Stop-out halted");
                    break;
                }
            }
        }

        if closed > 0 {
            self.notifier.notify(TradingEvent::AccountStopout {
                client_id: account.client_id.clone(),
                account_id: account.id,
                positions: closed,
                total_pnl,
            });
        }
    }

    /// Feed a book's new top of book into the quote cache and publish it
    fn publish_book_update(&self, update: &OrderBookUpdated) {
        let Some(best_price) = &update.best_price else {
            return;
        };
        if let Err(err) = self.risk.set_quote(best_price.clone()) {
            warn!(instrument = %update.instrument, error = %err, "Book price not cached");
        }
        self.notifier.notify(TradingEvent::OrderBookPrice(best_price.clone()));
    }

    fn publish_order(&self, order: &Order) {
        self.persistence.save_order(order);
        self.notifier.notify(TradingEvent::OrderChanged(Box::new(order.clone())));
    }

    fn publish_account(&self, account_id: &AccountId) {
        match self.risk.account_state(account_id) {
            Ok(account) => {
                self.persistence.save_account(&account);
                self.notifier.notify(TradingEvent::AccountUpdated(Box::new(account)));
            }
            Err(err) => warn!(account_id = %account_id, error = %err, "Account update not published"),
        }
    }
}
