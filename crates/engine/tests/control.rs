//! Control-surface tests: signal admission, manual intervention, capacity.

mod support;

use std::sync::Arc;

use rust_decimal_macros::dec;

use support::{deps, signal, spawn_store, wait_for_settlement, CollectingNotifier, ScriptedExchange};
use tracktrade_core::config::TradingConfig;
use tracktrade_core::traits::{OpenGate, SpotExchange};
use tracktrade_engine::{
    BlacklistGate, EngineError, ExitReport, RejectReason, SignalDecision, TradeEngine,
    TradeStatus,
};

fn fast_trading_cfg() -> TradingConfig {
    TradingConfig {
        poll_secs: 1,
        armed_poll_secs: 1,
        price_timeout_secs: 2,
        ..TradingConfig::default()
    }
}

fn engine(
    store: &tracktrade_engine::StoreHandle,
    exchange: &Arc<ScriptedExchange>,
    notifier: &Arc<CollectingNotifier>,
    gate: Arc<dyn tracktrade_core::traits::AdmissionGate>,
) -> TradeEngine {
    let d = deps(store, exchange, notifier);
    TradeEngine::new(
        d.store,
        d.exchange,
        d.notifier,
        gate,
        &fast_trading_cfg(),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn blacklisted_symbol_is_rejected_before_allocation() {
    let dir = tempfile::tempdir().unwrap();
    let store = spawn_store(&dir, 10);
    let exchange = ScriptedExchange::with_prices(&[dec!(200)]);
    let notifier = Arc::new(CollectingNotifier::default());
    let gate = Arc::new(BlacklistGate::from_symbols(vec!["SCAMUSDT".to_string()]));
    let engine = engine(&store, &exchange, &notifier, gate);

    let decision = engine
        .accept_signal("SCAM-USDT", dec!(100), dec!(90), vec![dec!(102)])
        .await
        .unwrap();

    assert!(matches!(
        decision,
        SignalDecision::Rejected(RejectReason::GateClosed)
    ));
    let snap = engine.status().await.unwrap();
    assert_eq!(snap.open_count, 0, "no position created");
    assert!(notifier.contains("gate closed"));
}

#[tokio::test(flavor = "multi_thread")]
async fn signal_without_targets_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = spawn_store(&dir, 10);
    let exchange = ScriptedExchange::with_prices(&[dec!(200)]);
    let notifier = Arc::new(CollectingNotifier::default());
    let engine = engine(&store, &exchange, &notifier, Arc::new(OpenGate));

    let decision = engine
        .accept_signal("TESTUSDT", dec!(100), dec!(90), vec![])
        .await
        .unwrap();

    assert!(matches!(
        decision,
        SignalDecision::Rejected(RejectReason::NoTargets)
    ));
    assert_eq!(engine.status().await.unwrap().open_count, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn accepted_signal_sorts_targets_and_spawns_monitor() {
    let dir = tempfile::tempdir().unwrap();
    let store = spawn_store(&dir, 10);
    // Price stays above entry: the monitor keeps waiting, nothing fills.
    let exchange = ScriptedExchange::with_prices(&[dec!(200)]);
    let notifier = Arc::new(CollectingNotifier::default());
    let engine = engine(&store, &exchange, &notifier, Arc::new(OpenGate));

    let decision = engine
        .accept_signal(
            "test-usdt",
            dec!(100),
            dec!(90),
            vec![dec!(105), dec!(102), dec!(102)],
        )
        .await
        .unwrap();

    let SignalDecision::Accepted(pos) = decision else {
        panic!("expected acceptance");
    };
    assert_eq!(pos.symbol, "TESTUSDT");
    assert_eq!(pos.targets, vec![dec!(102), dec!(105)], "sorted and deduped");
    assert_eq!(pos.amount, dec!(50));
    assert!(notifier.contains("New recommendation"));

    let snap = engine.status().await.unwrap();
    assert_eq!(snap.open_count, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn capacity_rejection_reaches_the_caller() {
    let dir = tempfile::tempdir().unwrap();
    let store = spawn_store(&dir, 1);
    let exchange = ScriptedExchange::with_prices(&[dec!(200)]);
    let notifier = Arc::new(CollectingNotifier::default());
    let engine = engine(&store, &exchange, &notifier, Arc::new(OpenGate));

    let first = engine
        .accept_signal("AAAUSDT", dec!(100), dec!(90), vec![dec!(102)])
        .await
        .unwrap();
    assert!(matches!(first, SignalDecision::Accepted(_)));

    let second = engine
        .accept_signal("BBBUSDT", dec!(100), dec!(90), vec![dec!(102)])
        .await
        .unwrap();
    assert!(matches!(
        second,
        SignalDecision::Rejected(RejectReason::CapacityFull { open: 1, capacity: 1 })
    ));
    assert!(notifier.contains("capacity reached"));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_before_entry_releases_slot_without_selling() {
    let dir = tempfile::tempdir().unwrap();
    let store = spawn_store(&dir, 10);
    let exchange = ScriptedExchange::with_prices(&[dec!(200)]);
    let notifier = Arc::new(CollectingNotifier::default());
    let engine = engine(&store, &exchange, &notifier, Arc::new(OpenGate));

    let pos = store.reserve(signal("TESTUSDT")).await.unwrap().unwrap();
    let report = engine.cancel_or_exit(pos.slot_id).await.unwrap();

    assert!(matches!(report, ExitReport::Cancelled { .. }));
    assert_eq!(exchange.order_count(), 0);

    let snap = engine.status().await.unwrap();
    assert_eq!(snap.open_count, 0);
    assert_eq!(snap.counters.failed, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_exit_of_filled_position_sells_and_classifies() {
    let dir = tempfile::tempdir().unwrap();
    let store = spawn_store(&dir, 10);
    let exchange = ScriptedExchange::with_prices(&[dec!(104)]);
    let notifier = Arc::new(CollectingNotifier::default());
    let engine = engine(&store, &exchange, &notifier, Arc::new(OpenGate));

    let pos = store.reserve(signal("TESTUSDT")).await.unwrap().unwrap();
    store
        .mark_filled(pos.slot_id, pos.trade_id, dec!(100), dec!(0.5))
        .await
        .unwrap();
    // Seed the mock's market price for the sell fill.
    let _ = exchange.ticker_price("TEST-USDT").await.unwrap();

    let report = engine.cancel_or_exit(pos.slot_id).await.unwrap();
    let ExitReport::Sold {
        status, pnl_pct, ..
    } = report
    else {
        panic!("expected a sale");
    };
    assert_eq!(status, TradeStatus::Closed, "4% gain beats the threshold");
    assert_eq!(pnl_pct, dec!(4));
    assert_eq!(exchange.sides(), vec!["sell"]);

    wait_for_settlement(&store, pos.slot_id).await;
    let snap = engine.status().await.unwrap();
    assert_eq!(snap.counters.successful, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_exit_of_unknown_slot_errors() {
    let dir = tempfile::tempdir().unwrap();
    let store = spawn_store(&dir, 10);
    let exchange = ScriptedExchange::with_prices(&[dec!(100)]);
    let notifier = Arc::new(CollectingNotifier::default());
    let engine = engine(&store, &exchange, &notifier, Arc::new(OpenGate));

    let err = engine.cancel_or_exit(99).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownSlot(99)));
}

#[tokio::test(flavor = "multi_thread")]
async fn set_capacity_is_clamped_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let store = spawn_store(&dir, 10);
    let exchange = ScriptedExchange::with_prices(&[dec!(100)]);
    let notifier = Arc::new(CollectingNotifier::default());
    let engine = engine(&store, &exchange, &notifier, Arc::new(OpenGate));

    assert_eq!(engine.set_capacity(3).await.unwrap(), 3);
    assert_eq!(engine.set_capacity(500).await.unwrap(), 10);
    assert_eq!(engine.status().await.unwrap().capacity, 10);
}

#[tokio::test(flavor = "multi_thread")]
async fn track_query_returns_materialized_track() {
    let dir = tempfile::tempdir().unwrap();
    let store = spawn_store(&dir, 10);
    let exchange = ScriptedExchange::with_prices(&[dec!(200)]);
    let notifier = Arc::new(CollectingNotifier::default());
    let engine = engine(&store, &exchange, &notifier, Arc::new(OpenGate));

    engine
        .accept_signal("TESTUSDT", dec!(100), dec!(90), vec![dec!(102)])
        .await
        .unwrap();

    let track = engine.track(1).await.unwrap().expect("track 1 materialized");
    assert_eq!(track.amount, dec!(50));
    assert_eq!(track.positions.len(), 1);
    assert!(engine.track(7).await.unwrap().is_none());
}
