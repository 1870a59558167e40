use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use syntharb::application::engine::ArbitrageEngine;
use syntharb::config::{Config, ConfigHandle};
use syntharb::domain::errors::{EngineError, RiskBreachKind};
use syntharb::domain::execution::PlanStatus;
use syntharb::domain::market::{Quote, Side, VenueEvent};
use syntharb::domain::ports::FillReport;
use syntharb::domain::position::Position;
use syntharb::domain::risk::AlertSeverity;
use syntharb::infrastructure::mock::MockExecutionBridge;

fn quote(symbol: &str, venue: &str, last: Decimal) -> Quote {
    Quote {
        symbol: symbol.to_string(),
        venue: venue.to_string(),
        bid: last - dec!(1),
        ask: last + dec!(1),
        last,
        volume_24h: dec!(5000000),
        funding_rate: None,
        mark_price: None,
        timestamp: chrono::Utc::now().timestamp_millis(),
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    // Thresholds sized to let the seed dislocations through end to end
    config.trading.min_profit_usd = dec!(1);
    config.trading.min_profit_pct = 0.02;
    config
}

fn engine_with_bridge() -> (
    Arc<ArbitrageEngine>,
    Arc<MockExecutionBridge>,
    tokio::sync::mpsc::UnboundedReceiver<syntharb::domain::risk::RiskAlert>,
) {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
    let (_handle, config_rx) = ConfigHandle::new(test_config());
    let bridge = Arc::new(MockExecutionBridge::new());
    let (engine, alert_rx) = ArbitrageEngine::new(config_rx, bridge.clone());
    (engine, bridge, alert_rx)
}

async fn seed_spot_perp_dislocation(engine: &ArbitrageEngine) {
    engine
        .ingest(VenueEvent::Quote(quote("BTC-USD", "venue_a", dec!(43500))))
        .await;
    engine
        .ingest(VenueEvent::Quote(quote(
            "BTC-USD-PERP",
            "venue_a",
            dec!(43480),
        )))
        .await;
}

#[tokio::test]
async fn detection_cycle_submits_ready_plans() {
    let (engine, bridge, _alerts) = engine_with_bridge();
    seed_spot_perp_dislocation(&engine).await;

    let submitted = engine.detect_cycle().await;
    assert_eq!(submitted.len(), 1);
    assert_eq!(bridge.submitted_plans().len(), 1);

    let plan = &submitted[0];
    assert_eq!(plan.status, PlanStatus::Ready);
    assert_eq!(plan.orders.len(), 2);
    // Weights of the planned legs still sum to one
    let weights: f64 = plan.opportunity.legs.iter().map(|l| l.weight).sum();
    assert!((weights - 1.0).abs() < 1e-9);

    let metrics = engine.detector_metrics().await;
    assert_eq!(metrics.detection_cycles, 1);
    assert!(metrics.opportunities_detected >= 1);
}

#[tokio::test]
async fn empty_market_produces_no_plans() {
    let (engine, bridge, _alerts) = engine_with_bridge();
    let submitted = engine.detect_cycle().await;
    assert!(submitted.is_empty());
    assert!(bridge.submitted_plans().is_empty());
}

#[tokio::test]
async fn risk_veto_rejects_oversized_position_with_alert() {
    let (engine, _bridge, mut alerts) = engine_with_bridge();

    // Notional $500k against trading.max_position_usd = $10k
    let mut oversized = Position::new("BTC-USD", "venue_a");
    oversized.apply_fill(Side::Buy, dec!(10), dec!(50000));

    let err = engine.open_position(oversized, "arb").await.unwrap_err();
    match err {
        EngineError::RiskLimitBreach { kind, .. } => {
            assert_eq!(kind, RiskBreachKind::PositionSize)
        }
        EngineError::CapitalInsufficient { .. } => {}
        other => panic!("unexpected error: {other}"),
    }

    // No state change, one warning alert surfaced
    assert!(engine.active_positions().await.is_empty());
    let alert = alerts.recv().await.unwrap();
    assert_eq!(alert.severity, AlertSeverity::Warning);
}

#[tokio::test]
async fn partial_fill_spawns_remainder_and_completes() {
    let (engine, _bridge, _alerts) = engine_with_bridge();
    seed_spot_perp_dislocation(&engine).await;

    let submitted = engine.detect_cycle().await;
    let plan_id = submitted[0].plan_id.clone();
    let first_order = submitted[0].orders[0].clone();
    let second_order = submitted[0].orders[1].clone();

    // 60% fill on the first leg
    let partial_qty = (first_order.quantity * dec!(0.6)).round_dp(8);
    engine
        .report_fill(FillReport {
            order_id: first_order.order_id.clone(),
            executed_price: first_order.target_price,
            executed_quantity: partial_qty,
            timestamp: chrono::Utc::now(),
        })
        .await
        .unwrap();

    let plan = engine.plan(&plan_id).await.unwrap();
    assert_eq!(plan.status, PlanStatus::PartiallyFilled);
    assert_eq!(plan.orders.len(), 3);
    let remainder = plan
        .orders
        .iter()
        .find(|o| !o.is_executed && o.instrument == first_order.instrument)
        .unwrap();
    assert_eq!(remainder.quantity, first_order.quantity - partial_qty);

    // Fill the remainder and the second leg; the plan completes
    engine
        .report_fill(FillReport {
            order_id: remainder.order_id.clone(),
            executed_price: remainder.target_price,
            executed_quantity: remainder.quantity,
            timestamp: chrono::Utc::now(),
        })
        .await
        .unwrap();
    engine
        .report_fill(FillReport {
            order_id: second_order.order_id.clone(),
            executed_price: second_order.target_price,
            executed_quantity: second_order.quantity,
            timestamp: chrono::Utc::now(),
        })
        .await
        .unwrap();

    let plan = engine.plan(&plan_id).await.unwrap();
    assert_eq!(plan.status, PlanStatus::Completed);
    assert!(plan.completed_at.is_some());

    // Fills flowed through to the books: both legs hold positions and the
    // trade history has one record per fill
    assert_eq!(engine.active_positions().await.len(), 2);
    let report = engine.pnl_report().await;
    assert_eq!(report.recent_trades.len(), 3);
}

#[tokio::test]
async fn fill_for_unknown_order_is_rejected() {
    let (engine, _bridge, _alerts) = engine_with_bridge();
    let err = engine
        .report_fill(FillReport {
            order_id: "ORD_000000_000000".to_string(),
            executed_price: dec!(1),
            executed_quantity: dec!(1),
            timestamp: chrono::Utc::now(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PlanInfeasible { .. }));
}

#[tokio::test]
async fn trade_history_is_append_only_across_fills() {
    let (engine, _bridge, _alerts) = engine_with_bridge();
    seed_spot_perp_dislocation(&engine).await;
    let submitted = engine.detect_cycle().await;
    let orders = submitted[0].orders.clone();

    engine
        .report_fill(FillReport {
            order_id: orders[0].order_id.clone(),
            executed_price: orders[0].target_price,
            executed_quantity: orders[0].quantity,
            timestamp: chrono::Utc::now(),
        })
        .await
        .unwrap();
    let first_ids: Vec<String> = engine
        .pnl_report()
        .await
        .recent_trades
        .iter()
        .map(|t| t.trade_id.clone())
        .collect();

    engine
        .report_fill(FillReport {
            order_id: orders[1].order_id.clone(),
            executed_price: orders[1].target_price,
            executed_quantity: orders[1].quantity,
            timestamp: chrono::Utc::now(),
        })
        .await
        .unwrap();
    let second_ids: Vec<String> = engine
        .pnl_report()
        .await
        .recent_trades
        .iter()
        .map(|t| t.trade_id.clone())
        .collect();

    // Earlier history is a prefix of later history
    assert!(second_ids.len() > first_ids.len());
    assert_eq!(&second_ids[..first_ids.len()], &first_ids[..]);
}
