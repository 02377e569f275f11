//! Floating P&L and margin per order
//!
//! Amounts are expressed in the account asset. The quote rate converts one
//! unit of the instrument's quote asset into the account asset:
//!
//! - quote asset == account asset: `1`
//! - base asset == account asset: `1 / price(instrument)`
//! - otherwise via the pair between quote asset and account asset:
//!   `price(cross)` when the quote asset is the cross pair's base,
//!   `1 / price(cross)` when it is the cross pair's quote
//!
//! Buy exposure is priced at the ask, sell exposure at the bid.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::trace;
use types::errors::{AssetPairError, QuoteError, TradingError};
use types::ids::InstrumentId;
use types::order::{FplData, Order, OrderStatus, Side};

use crate::assets::{AssetPairsCache, TradingConditionsCache};
use crate::quotes::QuoteCache;

pub struct FplService {
    quotes: Arc<QuoteCache>,
    asset_pairs: Arc<AssetPairsCache>,
    trading_conditions: Arc<TradingConditionsCache>,
}

impl FplService {
    pub fn new(
        quotes: Arc<QuoteCache>,
        asset_pairs: Arc<AssetPairsCache>,
        trading_conditions: Arc<TradingConditionsCache>,
    ) -> Self {
        Self {
            quotes,
            asset_pairs,
            trading_conditions,
        }
    }

    /// Units of `account_asset` per unit of the instrument's quote asset
    pub fn quote_rate(
        &self,
        account_asset: &str,
        instrument: &InstrumentId,
        direction: Side,
    ) -> Result<Decimal, TradingError> {
        let pair = self.asset_pairs.get(instrument)?;

        if pair.quote_asset_id == account_asset {
            return Ok(Decimal::ONE);
        }
        if pair.base_asset_id == account_asset {
            let price = self.positive_price(instrument, direction)?;
            return Ok(Decimal::ONE / price);
        }

        let cross = self.asset_pairs.find_pair(&pair.quote_asset_id, account_asset)?;
        let price = self.positive_price(&cross.id, direction)?;
        if cross.base_asset_id == pair.quote_asset_id {
            Ok(price)
        } else {
            Ok(Decimal::ONE / price)
        }
    }

    fn positive_price(&self, instrument: &InstrumentId, direction: Side) -> Result<Decimal, QuoteError> {
        let price = self.quotes.best_price(instrument, direction)?;
        if price <= Decimal::ZERO {
            return Err(QuoteError::InvalidPrice {
                instrument: instrument.to_string(),
            });
        }
        Ok(price)
    }

    /// Current price the position would close at: bid for long, ask for short
    pub fn close_price(&self, order: &Order) -> Result<Decimal, TradingError> {
        let quote = self.quotes.get_quote(&order.instrument)?;
        Ok(match order.direction() {
            Side::BUY => quote.bid,
            Side::SELL => quote.ask,
        })
    }

    /// Refresh the order's close price from quotes (open positions only) and
    /// recompute its FPL memo if open or close price or the closed volume
    /// moved.
    ///
    /// The volume still open floats at the close price and carries the
    /// margin; volume already matched for close counts at its fill prices.
    ///
    /// Returns true when the memo was recomputed.
    pub fn update_order_fpl(&self, order: &mut Order) -> Result<bool, TradingError> {
        match order.status {
            OrderStatus::Active | OrderStatus::Closing => {
                order.close_price = self.close_price(order)?;
            }
            OrderStatus::Closed => {}
            OrderStatus::WaitingForExecution | OrderStatus::Rejected => return Ok(false),
        }

        let closed_volume = order.matched_close_orders.summary_volume();
        if let Some(memo) = &order.fpl_data {
            if memo.is_valid_for(order.open_price, order.close_price, closed_volume) {
                return Ok(false);
            }
        }

        let settings = self.trading_conditions.get_account_asset(
            &order.trading_condition_id,
            &order.account_asset_id,
            &order.instrument,
        )?;
        let quote_rate = self.quote_rate(&order.account_asset_id, &order.instrument, order.direction())?;

        let open_volume = if order.status == OrderStatus::Closed {
            Decimal::ZERO
        } else {
            order.open_position_volume()
        };
        let direction = order.direction();
        let realized: Decimal = order
            .matched_close_orders
            .iter()
            .map(|fill| (fill.price - order.open_price) * direction.signed(fill.volume))
            .sum();
        let fpl = ((order.close_price - order.open_price) * open_volume + realized) * quote_rate;

        let notional = open_volume.abs() * order.open_price * quote_rate;
        let margin_init = divide_by_leverage(notional, settings.leverage_init, &order.instrument)?;
        let margin_maintenance = divide_by_leverage(notional, settings.leverage_maintenance, &order.instrument)?;

        let open_cross_price = order
            .fpl_data
            .as_ref()
            .map_or(quote_rate, |memo| memo.open_cross_price);

        order.fpl_data = Some(FplData {
            fpl,
            quote_rate,
            margin_init,
            margin_maintenance,
            open_cross_price,
            close_cross_price: quote_rate,
            open_price: order.open_price,
            close_price: order.close_price,
            swaps: order.swap_commission,
            closed_volume,
        });

        trace!(order_id = %order.id, fpl = %fpl, margin = %margin_maintenance, "Order FPL recomputed");
        Ok(true)
    }

    /// Initial margin a new order would need at the current price
    pub fn margin_init_for(&self, order: &Order) -> Result<Decimal, TradingError> {
        let settings = self.trading_conditions.get_account_asset(
            &order.trading_condition_id,
            &order.account_asset_id,
            &order.instrument,
        )?;
        let direction = order.direction();
        let price = match order.expected_open_price {
            Some(expected) => expected,
            None => self.quotes.best_price(&order.instrument, direction)?,
        };
        let quote_rate = self.quote_rate(&order.account_asset_id, &order.instrument, direction)?;

        divide_by_leverage(
            order.volume.abs() * price * quote_rate,
            settings.leverage_init,
            &order.instrument,
        )
    }
}

fn divide_by_leverage(amount: Decimal, leverage: Decimal, instrument: &InstrumentId) -> Result<Decimal, TradingError> {
    if leverage <= Decimal::ZERO {
        return Err(AssetPairError::InvalidLeverage {
            instrument: instrument.to_string(),
            leverage: leverage.to_string(),
        }
        .into());
    }
    Ok(amount / leverage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use types::ids::{AccountId, ClientId, OrderId};
    use types::instrument::{AccountAssetPair, AssetPair};
    use types::order::{CloseReason, MatchedOrder};
    use types::quote::BestPrice;

    struct Fixture {
        quotes: Arc<QuoteCache>,
        service: FplService,
    }

    fn fixture() -> Fixture {
        let quotes = Arc::new(QuoteCache::new());
        let pairs = Arc::new(AssetPairsCache::new());
        pairs.init(vec![
            AssetPair::new("EURUSD", "EUR", "USD", 5),
            AssetPair::new("USDJPY", "USD", "JPY", 3),
            AssetPair::new("EURJPY", "EUR", "JPY", 3),
            AssetPair::new("GBPCHF", "GBP", "CHF", 5),
        ]);
        let conditions = Arc::new(TradingConditionsCache::new());
        conditions.set_account_asset(AccountAssetPair::new("tc1", "USD", "EURUSD", dec!(5), dec!(5)));
        conditions.set_account_asset(AccountAssetPair::new("tc1", "USD", "EURJPY", dec!(10), dec!(20)));

        let service = FplService::new(Arc::clone(&quotes), pairs, conditions);
        Fixture { quotes, service }
    }

    fn quote(fx: &Fixture, instrument: &str, bid: Decimal, ask: Decimal) {
        fx.quotes.set_quote(BestPrice::new(instrument, bid, ask, Utc::now())).unwrap();
    }

    fn open_order(instrument: &str, volume: Decimal, open_price: Decimal) -> Order {
        let mut order = Order::new(
            ClientId::from("c1"),
            AccountId::new(),
            "tc1",
            "USD",
            instrument.into(),
            volume,
            5,
            Utc::now(),
        );
        let fill = MatchedOrder {
            order_id: OrderId::new(),
            market_maker_id: "mm1".to_string(),
            limit_order_left_to_match: Decimal::ZERO,
            volume: volume.abs(),
            price: open_price,
            matched_date: Utc::now(),
        };
        order.apply_open_fills(&[fill], open_price, Utc::now());
        order
    }

    #[test]
    fn test_quote_rate_same_asset() {
        let fx = fixture();
        let rate = fx.service.quote_rate("USD", &"EURUSD".into(), Side::BUY).unwrap();
        assert_eq!(rate, Decimal::ONE);
    }

    #[test]
    fn test_quote_rate_base_asset() {
        let fx = fixture();
        quote(&fx, "EURUSD", dec!(1.25), dec!(1.6));
        let buy = fx.service.quote_rate("EUR", &"EURUSD".into(), Side::BUY).unwrap();
        let sell = fx.service.quote_rate("EUR", &"EURUSD".into(), Side::SELL).unwrap();
        assert_eq!(buy, dec!(0.625));
        assert_eq!(sell, dec!(0.8));
    }

    #[test]
    fn test_quote_rate_cross_through_inverted_pair() {
        let fx = fixture();
        quote(&fx, "USDJPY", dec!(125), dec!(160));
        // JPY is the quote leg of USDJPY, so one JPY is 1/price USD
        let rate = fx.service.quote_rate("USD", &"EURJPY".into(), Side::BUY).unwrap();
        assert_eq!(rate, dec!(0.00625));
    }

    #[test]
    fn test_quote_rate_cross_through_direct_pair() {
        let fx = fixture();
        quote(&fx, "USDJPY", dec!(125), dec!(160));
        // USD is the base leg of USDJPY, so one USD is `price` JPY
        let buy = fx.service.quote_rate("JPY", &"EURUSD".into(), Side::BUY).unwrap();
        let sell = fx.service.quote_rate("JPY", &"EURUSD".into(), Side::SELL).unwrap();
        assert_eq!(buy, dec!(160));
        assert_eq!(sell, dec!(125));
    }

    #[test]
    fn test_missing_cross_pair() {
        let fx = fixture();
        let err = fx.service.quote_rate("USD", &"GBPCHF".into(), Side::BUY).unwrap_err();
        assert!(matches!(
            err,
            TradingError::AssetPair(AssetPairError::CrossPairNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_quote() {
        let fx = fixture();
        let err = fx.service.quote_rate("EUR", &"EURUSD".into(), Side::BUY).unwrap_err();
        assert!(matches!(err, TradingError::Quote(QuoteError::NotFound { .. })));
    }

    #[test]
    fn test_close_price_by_direction() {
        let fx = fixture();
        quote(&fx, "EURUSD", dec!(1.1), dec!(1.2));
        let long = open_order("EURUSD", dec!(1), dec!(1.15));
        let short = open_order("EURUSD", dec!(-1), dec!(1.15));
        assert_eq!(fx.service.close_price(&long).unwrap(), dec!(1.1));
        assert_eq!(fx.service.close_price(&short).unwrap(), dec!(1.2));
    }

    #[test]
    fn test_margin_example() {
        let fx = fixture();
        quote(&fx, "EURUSD", dec!(0.49465), dec!(0.49475));
        let mut order = open_order("EURUSD", dec!(1000), dec!(1.07465));

        assert!(fx.service.update_order_fpl(&mut order).unwrap());

        let memo = order.fpl_data.clone().unwrap();
        assert_eq!(memo.fpl, dec!(-580));
        assert_eq!(memo.margin_maintenance, dec!(214.93));
        assert_eq!(memo.margin_init, dec!(214.93));
        assert_eq!(memo.quote_rate, Decimal::ONE);
    }

    #[test]
    fn test_short_profits_when_price_falls() {
        let fx = fixture();
        quote(&fx, "EURUSD", dec!(1.0), dec!(1.05));
        let mut order = open_order("EURUSD", dec!(-100), dec!(1.10));

        fx.service.update_order_fpl(&mut order).unwrap();
        // close at ask 1.05: (1.05 - 1.10) * -100
        assert_eq!(order.fpl(), dec!(5));
    }

    #[test]
    fn test_memo_reused_until_price_moves() {
        let fx = fixture();
        quote(&fx, "EURUSD", dec!(1.1), dec!(1.2));
        let mut order = open_order("EURUSD", dec!(10), dec!(1.0));

        assert!(fx.service.update_order_fpl(&mut order).unwrap());
        assert!(!fx.service.update_order_fpl(&mut order).unwrap());

        quote(&fx, "EURUSD", dec!(1.3), dec!(1.4));
        assert!(fx.service.update_order_fpl(&mut order).unwrap());
        assert_eq!(order.fpl(), dec!(3));
    }

    #[test]
    fn test_partially_closed_order_floats_only_open_volume() {
        let fx = fixture();
        quote(&fx, "EURUSD", dec!(1.05), dec!(1.06));
        let mut order = open_order("EURUSD", dec!(10), dec!(1.10));
        let close_fill = MatchedOrder {
            order_id: OrderId::new(),
            market_maker_id: "mm1".to_string(),
            limit_order_left_to_match: Decimal::ZERO,
            volume: dec!(4),
            price: dec!(1.05),
            matched_date: Utc::now(),
        };
        order.apply_close_fills(&[close_fill], dec!(1.05), CloseReason::Close, Utc::now());
        assert_eq!(order.status, OrderStatus::Closing);

        quote(&fx, "EURUSD", dec!(2.00), dec!(2.01));
        assert!(fx.service.update_order_fpl(&mut order).unwrap());

        // 6 open gain (2.00 - 1.10) * 6 = 5.4, 4 closed lost (1.05 - 1.10) * 4 = -0.2
        assert_eq!(order.fpl(), dec!(5.2));
        // 6 * 1.10 / 5
        assert_eq!(order.margin_maintenance(), dec!(1.32));
    }

    #[test]
    fn test_closed_order_fpl_sums_close_fills() {
        let fx = fixture();
        quote(&fx, "EURUSD", dec!(1.3), dec!(1.4));
        let mut order = open_order("EURUSD", dec!(-10), dec!(1.20));
        let fill = |volume: Decimal, price: Decimal| MatchedOrder {
            order_id: OrderId::new(),
            market_maker_id: "mm1".to_string(),
            limit_order_left_to_match: Decimal::ZERO,
            volume,
            price,
            matched_date: Utc::now(),
        };
        let fills = [fill(dec!(4), dec!(1.10)), fill(dec!(6), dec!(1.15))];
        order.apply_close_fills(&fills, dec!(1.13), CloseReason::Close, Utc::now());
        assert_eq!(order.status, OrderStatus::Closed);

        fx.service.update_order_fpl(&mut order).unwrap();
        // short: (1.20 - 1.10) * 4 + (1.20 - 1.15) * 6
        assert_eq!(order.fpl(), dec!(0.7));
        assert_eq!(order.margin_maintenance(), Decimal::ZERO);
    }

    #[test]
    fn test_pending_order_has_no_fpl() {
        let fx = fixture();
        let mut order = Order::new(
            ClientId::from("c1"),
            AccountId::new(),
            "tc1",
            "USD",
            "EURUSD".into(),
            dec!(1),
            5,
            Utc::now(),
        );
        assert!(!fx.service.update_order_fpl(&mut order).unwrap());
        assert!(order.fpl_data.is_none());
    }

    #[test]
    fn test_margin_init_for_new_order() {
        let fx = fixture();
        quote(&fx, "EURUSD", dec!(1.1), dec!(1.2));
        let order = Order::new(
            ClientId::from("c1"),
            AccountId::new(),
            "tc1",
            "USD",
            "EURUSD".into(),
            dec!(100),
            5,
            Utc::now(),
        );
        // 100 * ask 1.2 / 5
        assert_eq!(fx.service.margin_init_for(&order).unwrap(), dec!(24));
    }
}
