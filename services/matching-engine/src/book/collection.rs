//! Order books of one matching engine, keyed by instrument

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::{InstrumentId, OrderId};
use types::limit_order::LimitOrder;
use types::order::{MatchedOrder, Side};
use types::quote::BestPrice;

use super::OrderBook;

/// One market maker's bulk update across instruments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetOrdersModel {
    pub market_maker_id: String,
    pub orders_to_add: Vec<LimitOrder>,
    pub order_ids_to_delete: Vec<OrderId>,
    /// Withdraw all of this provider's bids on every instrument
    pub delete_all_buy: bool,
    pub delete_all_sell: bool,
    pub delete_by_instruments_buy: Vec<InstrumentId>,
    pub delete_by_instruments_sell: Vec<InstrumentId>,
}

impl SetOrdersModel {
    pub fn new(market_maker_id: impl Into<String>) -> Self {
        Self {
            market_maker_id: market_maker_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderBookCollection {
    books: HashMap<InstrumentId, OrderBook>,
}

impl OrderBookCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a provider update. Returns the instruments whose book changed,
    /// in sorted order.
    pub fn set_orders(&mut self, model: SetOrdersModel) -> Vec<InstrumentId> {
        let mut touched: BTreeSet<InstrumentId> = BTreeSet::new();
        let mut to_add: HashMap<InstrumentId, Vec<LimitOrder>> = HashMap::new();
        for order in model.orders_to_add {
            touched.insert(order.instrument.clone());
            to_add.entry(order.instrument.clone()).or_default().push(order);
        }

        let has_deletes = model.delete_all_buy
            || model.delete_all_sell
            || !model.order_ids_to_delete.is_empty();
        if has_deletes {
            touched.extend(self.books.keys().cloned());
        }
        touched.extend(model.delete_by_instruments_buy.iter().cloned());
        touched.extend(model.delete_by_instruments_sell.iter().cloned());

        for instrument in &touched {
            let orders = to_add.remove(instrument).unwrap_or_default();
            let delete_buy = model.delete_all_buy || model.delete_by_instruments_buy.contains(instrument);
            let delete_sell =
                model.delete_all_sell || model.delete_by_instruments_sell.contains(instrument);

            if orders.is_empty() && !self.books.contains_key(instrument) {
                continue;
            }
            let book = self
                .books
                .entry(instrument.clone())
                .or_insert_with(|| OrderBook::new(instrument.clone()));
            book.set_market_maker_orders(
                &model.market_maker_id,
                orders,
                &model.order_ids_to_delete,
                delete_buy,
                delete_sell,
            );
        }

        touched.into_iter().collect()
    }

    pub fn match_volume(
        &self,
        instrument: &InstrumentId,
        direction: Side,
        volume: Decimal,
        now: DateTime<Utc>,
    ) -> Vec<MatchedOrder> {
        self.books
            .get(instrument)
            .map(|book| book.match_volume(direction, volume, now))
            .unwrap_or_default()
    }

    pub fn commit(
        &mut self,
        instrument: &InstrumentId,
        client_order_id: OrderId,
        direction: Side,
        fills: &[MatchedOrder],
        now: DateTime<Utc>,
    ) -> usize {
        self.books
            .get_mut(instrument)
            .map_or(0, |book| book.commit(client_order_id, direction, fills, now))
    }

    pub fn book(&self, instrument: &InstrumentId) -> Option<&OrderBook> {
        self.books.get(instrument)
    }

    /// Deep copies of all books, optionally restricted to some providers
    pub fn snapshot(&self, market_maker_ids: Option<&[String]>) -> HashMap<InstrumentId, OrderBook> {
        self.books
            .iter()
            .map(|(instrument, book)| {
                let copy = match market_maker_ids {
                    Some(ids) => book.filtered(ids),
                    None => book.clone(),
                };
                (instrument.clone(), copy)
            })
            .collect()
    }

    pub fn best_price(&self, instrument: &InstrumentId, now: DateTime<Utc>) -> Option<BestPrice> {
        self.books.get(instrument)?.best_price(now)
    }

    /// Top of book for every two-sided instrument
    pub fn best_prices(&self, now: DateTime<Utc>) -> Vec<BestPrice> {
        let mut prices: Vec<BestPrice> = self
            .books
            .values()
            .filter_map(|book| book.best_price(now))
            .collect();
        prices.sort_by(|a, b| a.instrument.cmp(&b.instrument));
        prices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use types::numeric::Price;

    fn limit(provider: &str, instrument: &str, volume: Decimal, price: &str) -> LimitOrder {
        LimitOrder::new(provider, instrument.into(), volume, Price::from_str(price).unwrap(), Utc::now())
    }

    fn quote(provider: &str, instrument: &str, bid: &str, ask: &str) -> SetOrdersModel {
        SetOrdersModel {
            orders_to_add: vec![
                limit(provider, instrument, dec!(10), bid),
                limit(provider, instrument, dec!(-10), ask),
            ],
            ..SetOrdersModel::new(provider)
        }
    }

    #[test]
    fn test_set_orders_reports_touched_instruments() {
        let mut books = OrderBookCollection::new();
        let touched = books.set_orders(quote("mm1", "EURUSD", "1.09", "1.10"));
        assert_eq!(touched, vec![InstrumentId::from("EURUSD")]);

        let touched = books.set_orders(quote("mm1", "GBPUSD", "1.25", "1.26"));
        assert_eq!(touched, vec![InstrumentId::from("GBPUSD")]);
        assert_eq!(books.best_prices(Utc::now()).len(), 2);
    }

    #[test]
    fn test_delete_all_sell_is_provider_scoped() {
        let mut books = OrderBookCollection::new();
        books.set_orders(quote("mm1", "EURUSD", "1.09", "1.10"));
        books.set_orders(quote("mm2", "EURUSD", "1.08", "1.11"));

        let model = SetOrdersModel {
            delete_all_sell: true,
            ..SetOrdersModel::new("mm1")
        };
        books.set_orders(model);

        let best = books.best_price(&"EURUSD".into(), Utc::now()).unwrap();
        assert_eq!(best.ask, dec!(1.11));
        assert_eq!(best.bid, dec!(1.09));
    }

    #[test]
    fn test_delete_by_instrument() {
        let mut books = OrderBookCollection::new();
        books.set_orders(quote("mm1", "EURUSD", "1.09", "1.10"));
        books.set_orders(quote("mm1", "GBPUSD", "1.25", "1.26"));

        let model = SetOrdersModel {
            delete_by_instruments_buy: vec!["EURUSD".into()],
            ..SetOrdersModel::new("mm1")
        };
        let touched = books.set_orders(model);

        assert_eq!(touched, vec![InstrumentId::from("EURUSD")]);
        assert!(books.book(&"EURUSD".into()).unwrap().bids().is_empty());
        assert!(!books.book(&"GBPUSD".into()).unwrap().bids().is_empty());
    }

    #[test]
    fn test_match_unknown_instrument_is_empty() {
        let books = OrderBookCollection::new();
        assert!(books
            .match_volume(&"XAUUSD".into(), Side::BUY, dec!(1), Utc::now())
            .is_empty());
    }

    #[test]
    fn test_snapshot_filter_by_provider() {
        let mut books = OrderBookCollection::new();
        books.set_orders(quote("mm1", "EURUSD", "1.09", "1.10"));
        books.set_orders(quote("mm2", "EURUSD", "1.08", "1.11"));

        let snapshot = books.snapshot(Some(&["mm2".to_string()]));
        let book = &snapshot[&InstrumentId::from("EURUSD")];
        assert_eq!(book.asks().best_ask_price(), Price::from_str("1.11"));
    }
}
