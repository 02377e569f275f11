//! Ask (sell-side) ladder
//!
//! Market-maker sell orders sorted by price ascending (best ask first).

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use types::ids::OrderId;
use types::limit_order::LimitOrder;
use types::numeric::Price;
use types::order::MatchedOrder;

use super::price_level::PriceLevel;

/// Ask side of an order book, lowest price first
#[derive(Debug, Clone, Default)]
pub struct AskBook {
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskBook {
    pub fn new() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }

    pub fn upsert(&mut self, order: LimitOrder) {
        self.levels.entry(order.price).or_default().upsert(order);
    }

    pub fn remove_where(&mut self, mut predicate: impl FnMut(&LimitOrder) -> bool) -> usize {
        let mut removed = 0;
        self.levels.retain(|_, level| {
            removed += level.remove_where(&mut predicate);
            !level.is_empty()
        });
        removed
    }

    pub fn apply_fill(&mut self, price: Price, order_id: &OrderId, fill: MatchedOrder) -> bool {
        let Some(level) = self.levels.get_mut(&price) else {
            return false;
        };
        let applied = level.apply_fill(order_id, fill);
        if level.is_empty() {
            self.levels.remove(&price);
        }
        applied
    }

    /// Get the best ask (lowest price) and its volume
    pub fn best_ask(&self) -> Option<(Price, Decimal)> {
        self.levels
            .iter()
            .next()
            .map(|(price, level)| (*price, level.total_volume()))
    }

    pub fn best_ask_price(&self) -> Option<Price> {
        self.levels.keys().next().copied()
    }

    /// Levels in matching priority (lowest price first)
    pub fn levels(&self) -> impl Iterator<Item = (&Price, &PriceLevel)> {
        self.levels.iter()
    }

    pub fn depth_snapshot(&self, depth: usize) -> Vec<(Price, Decimal)> {
        self.levels()
            .take(depth)
            .map(|(price, level)| (*price, level.total_volume()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}
