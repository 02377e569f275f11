//! Order book for a single instrument
//!
//! Matching is split in two steps: [`OrderBook::match_volume`] computes
//! tentative fills without touching the book, and [`OrderBook::commit`]
//! applies accepted fills. Callers decide in between whether to keep them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::warn;
use types::ids::{InstrumentId, OrderId};
use types::limit_order::LimitOrder;
use types::numeric::{is_zero_volume, Price};
use types::order::{MatchedOrder, Side};
use types::quote::BestPrice;

use super::{AskBook, BidBook, PriceLevel};

#[derive(Debug, Clone)]
pub struct OrderBook {
    instrument: InstrumentId,
    bids: BidBook,
    asks: AskBook,
}

impl OrderBook {
    pub fn new(instrument: InstrumentId) -> Self {
        Self {
            instrument,
            bids: BidBook::new(),
            asks: AskBook::new(),
        }
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    pub fn bids(&self) -> &BidBook {
        &self.bids
    }

    pub fn asks(&self) -> &AskBook {
        &self.asks
    }

    /// Tentative fills for a client order of `direction` needing `volume`.
    ///
    /// Walks the opposite ladder in price then time priority, taking
    /// `min(resting remaining, still needed)` from each order. Read-only.
    pub fn match_volume(&self, direction: Side, volume: Decimal, now: DateTime<Utc>) -> Vec<MatchedOrder> {
        match direction {
            Side::BUY => Self::walk(self.asks.levels(), volume, now),
            Side::SELL => Self::walk(self.bids.levels(), volume, now),
        }
    }

    fn walk<'a>(
        levels: impl Iterator<Item = (&'a Price, &'a PriceLevel)>,
        volume: Decimal,
        now: DateTime<Utc>,
    ) -> Vec<MatchedOrder> {
        let mut fills = Vec::new();
        let mut still_needed = volume.abs();

        'levels: for (price, level) in levels {
            for resting in level.iter() {
                if is_zero_volume(still_needed) {
                    break 'levels;
                }
                let available = resting.remaining_volume();
                let take = available.min(still_needed);
                if take <= Decimal::ZERO {
                    continue;
                }

                fills.push(MatchedOrder {
                    order_id: resting.id,
                    market_maker_id: resting.market_maker_id.clone(),
                    limit_order_left_to_match: available - take,
                    volume: take,
                    price: price.as_decimal(),
                    matched_date: now,
                });
                still_needed -= take;
            }
        }

        fills
    }

    /// Apply accepted fills of client order `client_order_id` to the resting
    /// orders they were taken from. Fulfilled orders and emptied levels are
    /// removed. Returns the number of fills applied.
    pub fn commit(
        &mut self,
        client_order_id: OrderId,
        direction: Side,
        fills: &[MatchedOrder],
        now: DateTime<Utc>,
    ) -> usize {
        let mut applied = 0;

        for fill in fills {
            let Some(price) = Price::try_new(fill.price) else {
                warn!(instrument = %self.instrument, price = %fill.price, "Fill with non-positive price skipped");
                continue;
            };
            let record = MatchedOrder {
                order_id: client_order_id,
                market_maker_id: fill.market_maker_id.clone(),
                limit_order_left_to_match: fill.limit_order_left_to_match,
                volume: fill.volume,
                price: fill.price,
                matched_date: now,
            };

            let found = match direction {
                Side::BUY => self.asks.apply_fill(price, &fill.order_id, record),
                Side::SELL => self.bids.apply_fill(price, &fill.order_id, record),
            };
            if found {
                applied += 1;
            } else {
                warn!(
                    instrument = %self.instrument,
                    limit_order_id = %fill.order_id,
                    "Resting order vanished before commit"
                );
            }
        }

        applied
    }

    /// Apply one provider's update to this instrument.
    ///
    /// Deletions only touch orders of `market_maker_id`. Added orders rest on
    /// the side given by the sign of their volume; zero volumes are ignored.
    pub fn set_market_maker_orders(
        &mut self,
        market_maker_id: &str,
        orders_to_add: Vec<LimitOrder>,
        order_ids_to_delete: &[OrderId],
        delete_all_buy: bool,
        delete_all_sell: bool,
    ) {
        let own = |order: &LimitOrder| order.market_maker_id == market_maker_id;

        if delete_all_buy {
            self.bids.remove_where(own);
        }
        if delete_all_sell {
            self.asks.remove_where(own);
        }
        if !order_ids_to_delete.is_empty() {
            let listed = |order: &LimitOrder| own(order) && order_ids_to_delete.contains(&order.id);
            self.bids.remove_where(listed);
            self.asks.remove_where(listed);
        }

        for order in orders_to_add {
            if is_zero_volume(order.volume) {
                continue;
            }
            match order.direction() {
                Side::BUY => self.bids.upsert(order),
                Side::SELL => self.asks.upsert(order),
            }
        }
    }

    /// Top of book, when both sides are quoted
    pub fn best_price(&self, now: DateTime<Utc>) -> Option<BestPrice> {
        let bid = self.bids.best_bid_price()?;
        let ask = self.asks.best_ask_price()?;
        Some(BestPrice::new(
            self.instrument.clone(),
            bid.as_decimal(),
            ask.as_decimal(),
            now,
        ))
    }

    /// Independent copy holding only the given providers' orders
    pub fn filtered(&self, market_maker_ids: &[String]) -> Self {
        let mut copy = self.clone();
        let foreign = |order: &LimitOrder| !market_maker_ids.contains(&order.market_maker_id);
        copy.bids.remove_where(foreign);
        copy.asks.remove_where(foreign);
        copy
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}
