//! Price level with a time-ordered queue of limit orders
//!
//! All market-maker orders quoted at one price, oldest first. The front of
//! the queue is matched first.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use types::ids::OrderId;
use types::limit_order::LimitOrder;
use types::order::MatchedOrder;

#[derive(Debug, Clone, Default)]
pub struct PriceLevel {
    orders: VecDeque<LimitOrder>,
}

impl PriceLevel {
    pub fn new() -> Self {
        Self {
            orders: VecDeque::new(),
        }
    }

    /// Add an order at the back of the queue.
    ///
    /// If the same provider already quotes at this level, that entry takes
    /// the new id and volume and keeps its queue position instead.
    pub fn upsert(&mut self, order: LimitOrder) {
        match self
            .orders
            .iter_mut()
            .find(|entry| entry.market_maker_id == order.market_maker_id)
        {
            Some(entry) => {
                entry.id = order.id;
                entry.volume = order.volume;
                entry.matched_orders = order.matched_orders;
                entry.created_at = order.created_at;
            }
            None => self.orders.push_back(order),
        }
    }

    /// Remove every order matching `predicate`, returning how many were removed
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&LimitOrder) -> bool) -> usize {
        let before = self.orders.len();
        self.orders.retain(|order| !predicate(order));
        before - self.orders.len()
    }

    /// Record a fill against the resting order `order_id` and drop it once
    /// fulfilled. Returns false if the order is not at this level.
    pub fn apply_fill(&mut self, order_id: &OrderId, fill: MatchedOrder) -> bool {
        let Some(position) = self.orders.iter().position(|o| &o.id == order_id) else {
            return false;
        };

        let order = &mut self.orders[position];
        order.matched_orders = order.matched_orders.appended(&[fill]);
        if order.is_fulfilled() {
            self.orders.remove(position);
        }
        true
    }

    /// Orders in time priority
    pub fn iter(&self) -> impl Iterator<Item = &LimitOrder> {
        self.orders.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Remaining volume across all orders at this level
    pub fn total_volume(&self) -> Decimal {
        self.orders.iter().map(LimitOrder::remaining_volume).sum()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}
