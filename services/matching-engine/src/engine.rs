//! Matching engine core
//!
//! Owns one [`OrderBookCollection`] behind a `parking_lot::RwLock`. A match
//! holds an upgradable read while computing tentative fills and evaluating
//! the fill policy, then upgrades to write for the commit, so no other
//! writer can change the book between the decision and the commit.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use rust_decimal::Decimal;
use tracing::{debug, info};
use types::ids::{InstrumentId, OrderId};
use types::order::{CloseReason, MatchedOrderCollection, Order, RejectReason, Side};
use types::quote::BestPrice;

use crate::book::{OrderBook, OrderBookCollection, SetOrdersModel};
use crate::events::{MatchOutcome, OrderBookUpdated};
use crate::fill_policy::FillPolicy;

/// Main matching engine
pub struct MatchingEngine {
    id: String,
    books: RwLock<OrderBookCollection>,
}

impl MatchingEngine {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        info!(engine_id = %id, "Matching engine created");
        Self {
            id,
            books: RwLock::new(OrderBookCollection::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Apply a market maker's bulk update and report the touched books
    pub fn set_orders(&self, model: SetOrdersModel, now: DateTime<Utc>) -> Vec<OrderBookUpdated> {
        let market_maker_id = model.market_maker_id.clone();
        let mut books = self.books.write();
        let touched = books.set_orders(model);

        debug!(
            engine_id = %self.id,
            market_maker_id = %market_maker_id,
            instruments = touched.len(),
            "Market maker orders set"
        );

        touched
            .into_iter()
            .map(|instrument| OrderBookUpdated {
                engine_id: self.id.clone(),
                best_price: books.best_price(&instrument, now),
                instrument,
            })
            .collect()
    }

    /// Match the unfilled part of `order` for open.
    ///
    /// On acceptance the fills are committed to the book and appended to the
    /// order, whose open price becomes the weighted average of all its open
    /// fills. Otherwise the order is rejected with `NoLiquidity`.
    pub fn match_for_open(&self, order: &mut Order, policy: FillPolicy, now: DateTime<Utc>) -> MatchOutcome {
        let outcome = self.match_and_commit(
            &order.instrument,
            order.id,
            order.direction(),
            order.remaining_volume(),
            policy,
            now,
        );

        match &outcome {
            MatchOutcome::Matched { fills, .. } => {
                let all_fills = order.matched_orders.appended(fills);
                let open_price = average_price(&all_fills, order.asset_accuracy);
                order.apply_open_fills(fills, open_price, now);
                order.matching_engine_id = Some(self.id.clone());
                info!(
                    engine_id = %self.id,
                    order_id = %order.id,
                    open_price = %open_price,
                    fills = fills.len(),
                    "Order matched for open"
                );
            }
            MatchOutcome::NoLiquidity => {
                order.reject(RejectReason::NoLiquidity, "No liquidity", now);
                info!(engine_id = %self.id, order_id = %order.id, "Order rejected: no liquidity");
            }
        }

        outcome
    }

    /// Match the open position of `order` for close (opposite direction).
    ///
    /// A close that finds no liquidity leaves the order untouched.
    pub fn match_for_close(
        &self,
        order: &mut Order,
        policy: FillPolicy,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> MatchOutcome {
        let outcome = self.match_and_commit(
            &order.instrument,
            order.id,
            order.direction().opposite(),
            order.close_remaining_volume(),
            policy,
            now,
        );

        if let MatchOutcome::Matched { fills, .. } = &outcome {
            let all_fills = order.matched_close_orders.appended(fills);
            let close_price = average_price(&all_fills, order.asset_accuracy);
            order.apply_close_fills(fills, close_price, reason, now);
            info!(
                engine_id = %self.id,
                order_id = %order.id,
                close_price = %close_price,
                reason = ?reason,
                "Order matched for close"
            );
        } else {
            info!(engine_id = %self.id, order_id = %order.id, "Close found no liquidity");
        }

        outcome
    }

    fn match_and_commit(
        &self,
        instrument: &InstrumentId,
        client_order_id: OrderId,
        direction: Side,
        volume: Decimal,
        policy: FillPolicy,
        now: DateTime<Utc>,
    ) -> MatchOutcome {
        let books = self.books.upgradable_read();
        let fills = books.match_volume(instrument, direction, volume, now);

        if !policy.accepts(volume, &fills) {
            debug!(
                engine_id = %self.id,
                order_id = %client_order_id,
                requested = %volume,
                fills = fills.len(),
                policy = ?policy,
                "Tentative fills declined"
            );
            return MatchOutcome::NoLiquidity;
        }

        let mut books = RwLockUpgradableReadGuard::upgrade(books);
        books.commit(instrument, client_order_id, direction, &fills, now);
        let book_update = OrderBookUpdated {
            engine_id: self.id.clone(),
            instrument: instrument.clone(),
            best_price: books.best_price(instrument, now),
        };

        MatchOutcome::Matched { fills, book_update }
    }

    /// Deep copies of the books, optionally restricted to some providers
    pub fn get_order_book_snapshot(&self, market_maker_ids: Option<&[String]>) -> HashMap<InstrumentId, OrderBook> {
        self.books.read().snapshot(market_maker_ids)
    }

    pub fn best_price(&self, instrument: &InstrumentId, now: DateTime<Utc>) -> Option<BestPrice> {
        self.books.read().best_price(instrument, now)
    }

    pub fn best_prices(&self, now: DateTime<Utc>) -> Vec<BestPrice> {
        self.books.read().best_prices(now)
    }
}

fn average_price(fills: &MatchedOrderCollection, accuracy: u32) -> Decimal {
    FillPolicy::average_price(fills, accuracy).unwrap_or(Decimal::ZERO)
}
