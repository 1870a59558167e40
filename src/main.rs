use std::sync::Arc;
use syntharb::application::engine::ArbitrageEngine;
use syntharb::config::{Config, ConfigHandle};
use syntharb::domain::market::ChannelKind;
use syntharb::infrastructure::mock::MockExecutionBridge;
use syntharb::infrastructure::venue::{BinanceAdapter, VenueAdapter};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Starting syntharb engine...");

    let config = Config::from_env();
    config.validate()?;
    let symbols = config.symbols.clone();
    let venue_config = config
        .venues
        .get("binance")
        .cloned()
        .unwrap_or_default();

    // The handle stays alive for the whole session; dropping it would close
    // the config channel under the running tasks.
    let (_config_handle, config_rx) = ConfigHandle::new(config);

    // Paper-trading bridge: plans are recorded, not routed.
    let bridge = Arc::new(MockExecutionBridge::new());
    let (engine, mut alert_rx) = ArbitrageEngine::new(config_rx, bridge.clone());

    let adapter = Arc::new(BinanceAdapter::new(&venue_config));
    for symbol in &symbols {
        adapter.subscribe(ChannelKind::Ticker, symbol).await?;
        adapter.subscribe(ChannelKind::Trades, symbol).await?;
        adapter.subscribe(ChannelKind::MarkPrice, symbol).await?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ingestion = tokio::spawn(
        engine
            .clone()
            .run_ingestion(adapter.events(), shutdown_rx.clone()),
    );
    let detection = tokio::spawn(engine.clone().run(shutdown_rx.clone()));
    let risk = engine.risk().clone();
    let risk_shutdown = shutdown_rx.clone();
    let monitoring = tokio::spawn(async move { risk.run(risk_shutdown).await });
    let alert_dispatch = tokio::spawn(async move {
        while let Some(alert) = alert_rx.recv().await {
            info!(
                "ALERT [{}] {:?}: {} ({:.4} vs {:.4})",
                alert.severity, alert.kind, alert.message, alert.current_value, alert.limit_value
            );
        }
    });

    if let Err(e) = adapter.connect().await {
        error!("Venue connection failed: {e}");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, stopping tasks...");
    let _ = shutdown_tx.send(true);
    adapter.disconnect().await;

    let _ = tokio::join!(ingestion, detection, monitoring);
    alert_dispatch.abort();

    let report = engine.pnl_report().await;
    info!(
        "Final P&L: realized ${} unrealized ${} over {} trades",
        report.snapshot.realized_pnl, report.snapshot.unrealized_pnl, report.snapshot.total_trades
    );
    info!(
        "Plans submitted this session: {}",
        bridge.submitted_plans().len()
    );

    Ok(())
}
