//! Bid (buy-side) ladder
//!
//! Market-maker buy orders sorted by price descending (best bid first).
//! Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use types::ids::OrderId;
use types::limit_order::LimitOrder;
use types::numeric::Price;
use types::order::MatchedOrder;

use super::price_level::PriceLevel;

/// Bid side of an order book
///
/// Orders are sorted by price descending, so the highest bid is first.
/// No empty level is ever kept.
#[derive(Debug, Clone, Default)]
pub struct BidBook {
    /// Price levels keyed ascending; iterated in reverse
    levels: BTreeMap<Price, PriceLevel>,
}

impl BidBook {
    pub fn new() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }

    /// Insert or update a provider's quote at the order's price
    pub fn upsert(&mut self, order: LimitOrder) {
        self.levels.entry(order.price).or_default().upsert(order);
    }

    /// Remove every order matching `predicate`, pruning emptied levels
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&LimitOrder) -> bool) -> usize {
        let mut removed = 0;
        self.levels.retain(|_, level| {
            removed += level.remove_where(&mut predicate);
            !level.is_empty()
        });
        removed
    }

    /// Record a fill against a resting order, pruning the level if emptied
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

    /// Get the best bid (highest price) and its volume
    pub fn best_bid(&self) -> Option<(Price, Decimal)> {
        self.levels
            .iter()
            .next_back()
            .map(|(price, level)| (*price, level.total_volume()))
    }

    pub fn best_bid_price(&self) -> Option<Price> {
        self.levels.keys().next_back().copied()
    }

    /// Levels in matching priority (highest price first)
    pub fn levels(&self) -> impl Iterator<Item = (&Price, &PriceLevel)> {
        self.levels.iter().rev()
    }

    /// Get depth snapshot (top N price levels)
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
