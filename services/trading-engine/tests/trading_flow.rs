//! End-to-end flows through the trading engine
//!
//! Each test wires real matching and risk engines with the in-memory
//! repository and the broadcast notifier.

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Utc;
use matching_engine::{MatchingEngine, SetOrdersModel};
use risk_engine::RiskEngine;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::broadcast;
use trading_engine::{
    AccountsRepository, BroadcastNotifier, DefaultOrderValidator, EngineServices, InMemoryRepository,
    OrdersRepository, PersistenceWriter, Repositories, RoutesRepository, TradingEngine, TradingEngineConfig,
    TradingEvent,
};
use types::account::Account;
use types::errors::{OrderError, TradingError};
use types::ids::{AccountId, ClientId};
use types::instrument::{AccountAssetPair, AccountGroup, AssetPair};
use types::limit_order::LimitOrder;
use types::numeric::Price;
use types::order::{CloseReason, MatchedOrder, Order, OrderStatus, RejectReason};
use types::quote::BestPrice;
use types::route::MatchingEngineRoute;

struct Harness {
    engine: TradingEngine,
    store: Arc<InMemoryRepository>,
    events: broadcast::Receiver<TradingEvent>,
    account_id: AccountId,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn risk_engine(config: &TradingEngineConfig, commission_lot: Decimal) -> Arc<RiskEngine> {
    let risk = Arc::new(RiskEngine::new(config.risk.clone()));
    risk.asset_pairs().init(vec![AssetPair::new("EURUSD", "EUR", "USD", 5)]);
    let mut settings = AccountAssetPair::new("tc1", "USD", "EURUSD", dec!(10), dec!(10));
    settings.commission_lot = commission_lot;
    risk.trading_conditions().init(
        vec![settings],
        vec![AccountGroup {
            trading_condition_id: "tc1".to_string(),
            base_asset_id: "USD".to_string(),
            margin_call: dec!(0.8),
            stop_out: dec!(0.95),
        }],
    );
    risk
}

fn build(
    config: TradingEngineConfig,
    risk: Arc<RiskEngine>,
    store: Arc<InMemoryRepository>,
    engine_ids: &[&str],
) -> (TradingEngine, broadcast::Receiver<TradingEvent>) {
    let repositories = Repositories::in_memory(store);
    let (persistence, _writer) = PersistenceWriter::spawn(repositories.clone());
    let notifier = Arc::new(BroadcastNotifier::new(1024));
    let events = notifier.subscribe();

    let services = EngineServices {
        risk: Arc::clone(&risk),
        matching_engines: engine_ids.iter().map(|id| Arc::new(MatchingEngine::new(*id))).collect(),
        validator: Arc::new(DefaultOrderValidator::new(risk, config.max_order_volume)),
        notifier,
        repositories,
        persistence,
    };
    (TradingEngine::new(config, services), events)
}

fn harness_with(
    config: TradingEngineConfig,
    balance: Decimal,
    commission_lot: Decimal,
    engine_ids: &[&str],
) -> Harness {
    init_tracing();
    let risk = risk_engine(&config, commission_lot);
    let store = Arc::new(InMemoryRepository::new());
    let (engine, events) = build(config, risk, Arc::clone(&store), engine_ids);

    let account = Account::new(ClientId::from("c1"), "tc1", "USD", balance);
    let account_id = account.id;
    engine.add_account(account).unwrap();

    Harness {
        engine,
        store,
        events,
        account_id,
    }
}

fn harness() -> Harness {
    let config = TradingEngineConfig {
        default_matching_engine_id: "ME1".to_string(),
        ..TradingEngineConfig::default()
    };
    harness_with(config, dec!(1000), Decimal::ZERO, &["ME1"])
}

fn limit(market_maker: &str, volume: Decimal, price: &str) -> LimitOrder {
    LimitOrder::new(
        market_maker,
        "EURUSD".into(),
        volume,
        Price::from_str(price).unwrap(),
        Utc::now(),
    )
}

/// Bids as positive volumes, asks as negative volumes
fn provide(h: &Harness, engine_id: &str, market_maker: &str, replace: bool, orders: &[(Decimal, &str)]) {
    let mut model = SetOrdersModel::new(market_maker);
    model.delete_all_buy = replace;
    model.delete_all_sell = replace;
    model.orders_to_add = orders
        .iter()
        .map(|(volume, price)| limit(market_maker, *volume, price))
        .collect();
    h.engine.set_orders(engine_id, model).unwrap();
}

fn new_order(h: &Harness, volume: Decimal) -> Order {
    Order::new(
        ClientId::from("c1"),
        h.account_id,
        "tc1",
        "USD",
        "EURUSD".into(),
        volume,
        5,
        Utc::now(),
    )
}

fn drain(events: &mut broadcast::Receiver<TradingEvent>) -> Vec<TradingEvent> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    received
}

#[tokio::test]
async fn test_market_order_opens_at_weighted_price() {
    let h = harness();
    provide(&h, "ME1", "mm1", false, &[(dec!(10), "1.05"), (dec!(-6), "1.10"), (dec!(-3), "1.15")]);

    let order = h.engine.place_order(new_order(&h, dec!(9))).unwrap();

    assert_eq!(order.status, OrderStatus::Active);
    assert_eq!(order.open_price, dec!(1.11667));
    assert_eq!(order.matched_orders.len(), 2);
    assert_eq!(order.matching_engine_id.as_deref(), Some("ME1"));

    let account = h.engine.account_state(&h.account_id).unwrap();
    assert_eq!(account.fpl_state.open_positions_count, 1);
    // marked at the bid 1.05
    assert_eq!(account.fpl_state.pnl, dec!(-0.60003));
}

#[tokio::test]
async fn test_fill_or_kill_leaves_book_untouched() {
    let h = harness();
    provide(&h, "ME1", "mm1", false, &[(dec!(10), "1.05"), (dec!(-5), "1.10")]);

    let rejected = h.engine.place_order(new_order(&h, dec!(10))).unwrap();
    assert_eq!(rejected.status, OrderStatus::Rejected);
    assert_eq!(rejected.reject_reason, Some(RejectReason::NoLiquidity));

    let filled = h.engine.place_order(new_order(&h, dec!(5))).unwrap();
    assert_eq!(filled.status, OrderStatus::Active);
    assert_eq!(filled.open_price, dec!(1.10));
}

#[tokio::test]
async fn test_validation_rejection_is_persisted_and_notified() {
    let mut h = harness();
    provide(&h, "ME1", "mm1", false, &[(dec!(10), "1.05"), (dec!(-10), "1.10")]);
    drain(&mut h.events);

    let order = h.engine.place_order(new_order(&h, Decimal::ZERO)).unwrap();
    assert_eq!(order.reject_reason, Some(RejectReason::InvalidVolume));

    h.engine.persistence().flush().await.unwrap();
    assert_eq!(h.store.order(&order.id).map(|o| o.status), Some(OrderStatus::Rejected));

    let events = drain(&mut h.events);
    assert!(events
        .iter()
        .any(|e| matches!(e, TradingEvent::OrderChanged(o) if o.id == order.id)));
}

#[tokio::test]
async fn test_close_realizes_pnl_net_of_commission() {
    let config = TradingEngineConfig {
        default_matching_engine_id: "ME1".to_string(),
        ..TradingEngineConfig::default()
    };
    let h = harness_with(config, dec!(1000), dec!(0.01), &["ME1"]);
    provide(&h, "ME1", "mm1", false, &[(dec!(10), "1.05"), (dec!(-10), "1.10")]);

    let order = h.engine.place_order(new_order(&h, dec!(10))).unwrap();
    assert_eq!(order.open_commission, dec!(0.1));

    provide(&h, "ME1", "mm2", false, &[(dec!(10), "1.15"), (dec!(-10), "1.16")]);
    let closed = h
        .engine
        .close_order(&h.account_id, &order.id, CloseReason::Close)
        .unwrap();

    assert_eq!(closed.status, OrderStatus::Closed);
    assert_eq!(closed.close_reason, Some(CloseReason::Close));
    assert_eq!(closed.close_price, dec!(1.15));
    assert_eq!(closed.fpl(), dec!(0.5));
    assert_eq!(closed.close_commission, dec!(0.1));

    let account = h.engine.account_state(&h.account_id).unwrap();
    assert_eq!(account.balance, dec!(1000.3));
    assert_eq!(account.fpl_state.open_positions_count, 0);

    h.engine.persistence().flush().await.unwrap();
    assert_eq!(h.store.order(&order.id).map(|o| o.status), Some(OrderStatus::Closed));
    assert_eq!(h.store.account(&h.account_id).map(|a| a.balance), Some(dec!(1000.3)));
}

#[tokio::test]
async fn test_close_without_liquidity_keeps_position() {
    let h = harness();
    provide(&h, "ME1", "mm1", false, &[(dec!(4), "1.05"), (dec!(-10), "1.10")]);
    let order = h.engine.place_order(new_order(&h, dec!(10))).unwrap();

    let unchanged = h
        .engine
        .close_order(&h.account_id, &order.id, CloseReason::Close)
        .unwrap();
    assert_eq!(unchanged.status, OrderStatus::Active);
    assert!(unchanged.matched_close_orders.is_empty());
}

#[tokio::test]
async fn test_partial_close_when_allowed() {
    let config = TradingEngineConfig {
        default_matching_engine_id: "ME1".to_string(),
        partial_close_allowed: true,
        ..TradingEngineConfig::default()
    };
    let h = harness_with(config, dec!(1000), Decimal::ZERO, &["ME1"]);
    provide(&h, "ME1", "mm1", false, &[(dec!(4), "1.05"), (dec!(-10), "1.10")]);
    let order = h.engine.place_order(new_order(&h, dec!(10))).unwrap();

    let closing = h
        .engine
        .close_order(&h.account_id, &order.id, CloseReason::Close)
        .unwrap();
    assert_eq!(closing.status, OrderStatus::Closing);
    assert_eq!(closing.close_remaining_volume(), dec!(6));
    assert_eq!(h.engine.risk().accounts().active_orders(&h.account_id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_partially_closed_position_floats_only_open_volume() {
    let config = TradingEngineConfig {
        default_matching_engine_id: "ME1".to_string(),
        partial_close_allowed: true,
        ..TradingEngineConfig::default()
    };
    let h = harness_with(config, dec!(1000), Decimal::ZERO, &["ME1"]);
    provide(&h, "ME1", "mm1", false, &[(dec!(4), "1.05"), (dec!(-10), "1.10")]);
    let order = h.engine.place_order(new_order(&h, dec!(10))).unwrap();

    let closing = h
        .engine
        .close_order(&h.account_id, &order.id, CloseReason::Close)
        .unwrap();
    assert_eq!(closing.status, OrderStatus::Closing);

    provide(&h, "ME1", "mm1", true, &[(dec!(10), "2.00"), (dec!(-10), "2.01")]);

    let account = h.engine.account_state(&h.account_id).unwrap();
    // 6 still open at (2.00 - 1.10), 4 closed at (1.05 - 1.10)
    assert_eq!(account.fpl_state.pnl, dec!(5.2));
    // 6 * 1.10 / 10
    assert_eq!(account.fpl_state.used_margin, dec!(0.66));

    let closed = h
        .engine
        .close_order(&h.account_id, &order.id, CloseReason::Close)
        .unwrap();
    assert_eq!(closed.status, OrderStatus::Closed);
    assert_eq!(closed.fpl(), dec!(5.2));
    assert_eq!(h.engine.account_state(&h.account_id).unwrap().balance, dec!(1005.2));
}

#[tokio::test]
async fn test_concurrent_closes_realize_once() {
    let h = harness_with(
        TradingEngineConfig {
            default_matching_engine_id: "ME1".to_string(),
            ..TradingEngineConfig::default()
        },
        dec!(100000),
        Decimal::ZERO,
        &["ME1"],
    );
    let rounds = 300;

    for _ in 0..rounds {
        provide(&h, "ME1", "mm1", true, &[(dec!(1000), "1.20"), (dec!(-10), "1.10")]);
        let order = h.engine.place_order(new_order(&h, dec!(10))).unwrap();
        assert_eq!(order.status, OrderStatus::Active);

        let (engine, account_id, order_id) = (&h.engine, h.account_id, order.id);
        let barrier = Barrier::new(2);
        let closes: Vec<Result<Order, TradingError>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        engine.close_order(&account_id, &order_id, CloseReason::Close)
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        let closed = closes
            .iter()
            .filter(|close| matches!(close, Ok(o) if o.status == OrderStatus::Closed))
            .count();
        assert_eq!(closed, 1);
    }

    // each round gains (1.20 - 1.10) * 10
    let account = h.engine.account_state(&h.account_id).unwrap();
    assert_eq!(account.balance, dec!(100300));
    assert_eq!(account.fpl_state.open_positions_count, 0);
}

#[tokio::test]
async fn test_concurrent_opens_share_one_margin_check() {
    for _ in 0..50 {
        let h = harness_with(
            TradingEngineConfig {
                default_matching_engine_id: "ME1".to_string(),
                ..TradingEngineConfig::default()
            },
            dec!(100),
            Decimal::ZERO,
            &["ME1"],
        );
        provide(&h, "ME1", "mm1", false, &[(dec!(2000), "1.09"), (dec!(-2000), "1.10")]);

        // 66 of initial margin each; only one fits a capital of about 94
        let orders = [new_order(&h, dec!(600)), new_order(&h, dec!(600))];
        let engine = &h.engine;
        let barrier = Barrier::new(2);
        let placed: Vec<Order> = thread::scope(|scope| {
            let handles: Vec<_> = orders
                .into_iter()
                .map(|order| {
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        engine.place_order(order).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        let active = placed.iter().filter(|o| o.status == OrderStatus::Active).count();
        let rejected: Vec<_> = placed.iter().filter_map(|o| o.reject_reason).collect();
        assert_eq!(active, 1);
        assert_eq!(rejected, vec![RejectReason::NotEnoughBalance]);
        assert_eq!(
            h.engine.account_state(&h.account_id).unwrap().fpl_state.open_positions_count,
            1
        );
    }
}

#[tokio::test]
async fn test_pending_order_waits_then_activates() {
    let h = harness();
    provide(&h, "ME1", "mm1", false, &[(dec!(10), "1.19"), (dec!(-10), "1.20")]);

    let mut pending = new_order(&h, dec!(5));
    pending.expected_open_price = Some(dec!(1.15));
    let pending = h.engine.place_order(pending).unwrap();
    assert_eq!(pending.status, OrderStatus::WaitingForExecution);
    assert_eq!(h.engine.account_state(&h.account_id).unwrap().fpl_state.open_positions_count, 0);

    // a cheaper ask reaches the expected price
    provide(&h, "ME1", "mm2", false, &[(dec!(-10), "1.15")]);

    let active = h.engine.risk().accounts().active_orders(&h.account_id).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, pending.id);
    assert_eq!(active[0].open_price, dec!(1.15));
    assert!(h.engine.risk().accounts().pending_orders(&h.account_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_pending_order() {
    let h = harness();
    provide(&h, "ME1", "mm1", false, &[(dec!(10), "1.19"), (dec!(-10), "1.20")]);

    let mut pending = new_order(&h, dec!(5));
    pending.expected_open_price = Some(dec!(1.15));
    let pending = h.engine.place_order(pending).unwrap();

    let canceled = h.engine.cancel_pending_order(&h.account_id, &pending.id).unwrap();
    assert_eq!(canceled.status, OrderStatus::Closed);
    assert_eq!(canceled.close_reason, Some(CloseReason::Canceled));

    let again = h.engine.cancel_pending_order(&h.account_id, &pending.id).unwrap_err();
    assert!(matches!(again, TradingError::Order(OrderError::NotFound { .. })));
}

#[tokio::test]
async fn test_cancel_rejects_open_position() {
    let h = harness();
    provide(&h, "ME1", "mm1", false, &[(dec!(10), "1.05"), (dec!(-10), "1.10")]);
    let order = h.engine.place_order(new_order(&h, dec!(1))).unwrap();

    let err = h.engine.cancel_pending_order(&h.account_id, &order.id).unwrap_err();
    assert!(matches!(err, TradingError::Order(OrderError::InvalidStateTransition { .. })));
}

#[tokio::test]
async fn test_stop_loss_closes_position() {
    let h = harness();
    provide(&h, "ME1", "mm1", false, &[(dec!(20), "1.09"), (dec!(-10), "1.10")]);

    let mut order = new_order(&h, dec!(10));
    order.stop_loss = Some(dec!(1.05));
    let order = h.engine.place_order(order).unwrap();
    assert_eq!(order.status, OrderStatus::Active);

    // bids drop through the stop
    provide(&h, "ME1", "mm1", true, &[(dec!(20), "1.04"), (dec!(-10), "1.10")]);

    assert!(h.engine.risk().accounts().active_orders(&h.account_id).unwrap().is_empty());
    h.engine.persistence().flush().await.unwrap();
    let stored = h.store.order(&order.id).unwrap();
    assert_eq!(stored.status, OrderStatus::Closed);
    assert_eq!(stored.close_reason, Some(CloseReason::StopLoss));
    assert_eq!(stored.close_price, dec!(1.04));
}

#[tokio::test]
async fn test_take_profit_closes_short() {
    let h = harness();
    provide(&h, "ME1", "mm1", false, &[(dec!(10), "1.10"), (dec!(-20), "1.11")]);

    let mut order = new_order(&h, dec!(-10));
    order.take_profit = Some(dec!(1.05));
    let order = h.engine.place_order(order).unwrap();
    assert_eq!(order.open_price, dec!(1.10));

    provide(&h, "ME1", "mm1", true, &[(dec!(10), "1.03"), (dec!(-20), "1.04")]);

    let account = h.engine.account_state(&h.account_id).unwrap();
    assert_eq!(account.fpl_state.open_positions_count, 0);
    // (1.04 - 1.10) * -10
    assert_eq!(account.balance, dec!(1000.6));
}

#[tokio::test]
async fn test_margin_call_then_stop_out() {
    let config = TradingEngineConfig {
        default_matching_engine_id: "ME1".to_string(),
        ..TradingEngineConfig::default()
    };
    let mut h = harness_with(config, dec!(100), Decimal::ZERO, &["ME1"]);
    provide(&h, "ME1", "mm1", false, &[(dec!(1000), "0.999"), (dec!(-1000), "1.00")]);

    // margin 90, capital 99.1: usage above the margin-call level
    let order = h.engine.place_order(new_order(&h, dec!(900))).unwrap();
    assert_eq!(order.status, OrderStatus::Active);
    let events = drain(&mut h.events);
    assert!(events.iter().any(|e| matches!(e, TradingEvent::MarginCall(_))));

    // capital 91 against margin 90
    provide(&h, "ME1", "mm1", true, &[(dec!(1000), "0.99"), (dec!(-1000), "1.00")]);

    let account = h.engine.account_state(&h.account_id).unwrap();
    assert_eq!(account.fpl_state.open_positions_count, 0);
    assert_eq!(account.balance, dec!(91));

    let events = drain(&mut h.events);
    let stopout = events.iter().find_map(|e| match e {
        TradingEvent::AccountStopout {
            account_id,
            positions,
            total_pnl,
            ..
        } => Some((*account_id, *positions, *total_pnl)),
        _ => None,
    });
    assert_eq!(stopout, Some((h.account_id, 1, dec!(-9))));
}

#[tokio::test]
async fn test_post_match_margin_rejection() {
    let h = harness_with(
        TradingEngineConfig {
            default_matching_engine_id: "ME1".to_string(),
            ..TradingEngineConfig::default()
        },
        dec!(10),
        Decimal::ZERO,
        &["ME1"],
    );
    provide(&h, "ME1", "mm1", false, &[(dec!(1000), "1.00"), (dec!(-1000), "1.01")]);

    // initial margin 101 against a balance of 10
    let order = h.engine.place_order(new_order(&h, dec!(1000))).unwrap();
    assert_eq!(order.status, OrderStatus::Rejected);
    assert_eq!(order.reject_reason, Some(RejectReason::NotEnoughBalance));
    assert!(h.engine.risk().accounts().active_orders(&h.account_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_routes_select_engine() {
    let config = TradingEngineConfig {
        default_matching_engine_id: "ME1".to_string(),
        ..TradingEngineConfig::default()
    };
    let h = harness_with(config, dec!(1000), Decimal::ZERO, &["ME1", "ME2"]);
    provide(&h, "ME2", "mm1", false, &[(dec!(10), "1.05"), (dec!(-10), "1.10")]);

    let mut route = MatchingEngineRoute::new("eur", 1, "ME2");
    route.instrument = Some("EURUSD".into());
    h.engine.add_or_replace_route(route);

    let routed = h.engine.place_order(new_order(&h, dec!(1))).unwrap();
    assert_eq!(routed.matching_engine_id.as_deref(), Some("ME2"));

    assert!(h.engine.remove_route("eur").is_some());
    let defaulted = h.engine.place_order(new_order(&h, dec!(1))).unwrap();
    assert_eq!(defaulted.reject_reason, Some(RejectReason::NoLiquidity));

    h.engine.persistence().flush().await.unwrap();
    assert!(h.store.route("eur").is_none());
}

#[tokio::test]
async fn test_unknown_engine_in_route_is_a_fault() {
    let h = harness();
    provide(&h, "ME1", "mm1", false, &[(dec!(10), "1.05"), (dec!(-10), "1.10")]);
    h.engine.add_or_replace_route(MatchingEngineRoute::new("all", 1, "MISSING"));

    let err = h.engine.place_order(new_order(&h, dec!(1))).unwrap_err();
    assert!(matches!(err, TradingError::Routing(_)));
}

#[tokio::test]
async fn test_hydrate_restores_accounts_orders_and_routes() {
    init_tracing();
    let config = TradingEngineConfig {
        default_matching_engine_id: "ME1".to_string(),
        ..TradingEngineConfig::default()
    };
    let store = Arc::new(InMemoryRepository::new());

    let account = Account::new(ClientId::from("c1"), "tc1", "USD", dec!(500));
    store.save_account(&account).await.unwrap();

    let mut position = Order::new(
        ClientId::from("c1"),
        account.id,
        "tc1",
        "USD",
        "EURUSD".into(),
        dec!(100),
        5,
        Utc::now(),
    );
    let fill = MatchedOrder {
        order_id: types::ids::OrderId::new(),
        market_maker_id: "mm1".to_string(),
        limit_order_left_to_match: Decimal::ZERO,
        volume: dec!(100),
        price: dec!(1.10),
        matched_date: Utc::now(),
    };
    position.apply_open_fills(&[fill], dec!(1.10), Utc::now());
    position.matching_engine_id = Some("ME1".to_string());
    store.save_order(&position).await.unwrap();
    store.save_route(&MatchingEngineRoute::new("r1", 0, "ME1")).await.unwrap();

    let risk = risk_engine(&config, Decimal::ZERO);
    let (engine, _events) = build(config, risk, Arc::clone(&store), &["ME1"]);
    let summary = engine.hydrate().await.unwrap();
    assert_eq!((summary.accounts, summary.orders, summary.routes), (1, 1, 1));
    assert_eq!(engine.router().routes().len(), 1);

    engine
        .set_quote(BestPrice::new("EURUSD", dec!(1.12), dec!(1.13), Utc::now()))
        .unwrap();
    let state = engine.account_state(&account.id).unwrap();
    assert_eq!(state.balance, dec!(500));
    assert_eq!(state.fpl_state.open_positions_count, 1);
    assert_eq!(state.fpl_state.pnl, dec!(2));
}
