//! Paper-trading simulator: drives a random-walk market across two venues
//! through the full detection-to-execution pipeline, fills submitted plans
//! through the simulated router, and prints the session P&L.

use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::sync::Arc;
use syntharb::application::engine::ArbitrageEngine;
use syntharb::config::{Config, ConfigHandle};
use syntharb::domain::market::{Quote, VenueEvent};
use syntharb::infrastructure::simulation::{NetworkLatency, SimulatedRouter, VolatilitySlippage};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

const VENUES: [&str; 2] = ["sim_alpha", "sim_beta"];

struct RandomWalk {
    symbol: String,
    venue: String,
    price: f64,
    funding: f64,
    step_vol: f64,
}

impl RandomWalk {
    fn new(symbol: &str, venue: &str, price: f64, funding: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            venue: venue.to_string(),
            price,
            funding,
            step_vol: 0.0004,
        }
    }

    fn tick(&mut self) -> Vec<VenueEvent> {
        let mut rng = rand::rng();
        self.price *= 1.0 + rng.random_range(-self.step_vol..=self.step_vol);
        self.funding =
            (self.funding + rng.random_range(-0.00002..=0.00002)).clamp(-0.00075, 0.00075);

        let last = Decimal::from_f64(self.price).unwrap_or(Decimal::ZERO);
        let half_spread = Decimal::from_f64(self.price * 0.0001).unwrap_or(Decimal::ZERO);
        let now = chrono::Utc::now().timestamp_millis();

        let spot = Quote {
            symbol: self.symbol.clone(),
            venue: self.venue.clone(),
            bid: last - half_spread,
            ask: last + half_spread,
            last,
            volume_24h: Decimal::from(5_000_000),
            funding_rate: None,
            mark_price: None,
            timestamp: now,
        };

        // Perp drifts off spot; the dislocations are what detection hunts.
        let mut rng = rand::rng();
        let perp_price = self.price * (1.0 + rng.random_range(-0.0012..=0.0012));
        let perp_last = Decimal::from_f64(perp_price).unwrap_or(last);
        let perp = Quote {
            symbol: format!("{}-PERP", self.symbol),
            venue: self.venue.clone(),
            bid: perp_last - half_spread,
            ask: perp_last + half_spread,
            last: perp_last,
            volume_24h: Decimal::from(8_000_000),
            funding_rate: Some(self.funding),
            mark_price: Some(perp_last),
            timestamp: now,
        };

        vec![VenueEvent::Quote(spot), VenueEvent::Quote(perp)]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let duration_secs: u64 = std::env::var("PAPER_DURATION_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);

    let mut config = Config::from_env();
    // Paper sessions chase small dislocations on purpose.
    config.trading.min_profit_usd = Decimal::ONE;
    config.trading.min_profit_pct = 0.02;
    config.validate()?;
    let symbols = config.symbols.clone();
    let (_config_handle, config_rx) = ConfigHandle::new(config);

    let (router, mut fill_rx) = SimulatedRouter::new(
        Arc::new(NetworkLatency::new(40, 15)),
        Arc::new(VolatilitySlippage::new(0.0005)),
    );
    let (engine, mut alert_rx) = ArbitrageEngine::new(config_rx, Arc::new(router));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let detection = tokio::spawn(engine.clone().run(shutdown_rx.clone()));
    let risk = engine.risk().clone();
    let risk_shutdown = shutdown_rx.clone();
    let monitoring = tokio::spawn(async move { risk.run(risk_shutdown).await });

    let fill_engine = engine.clone();
    let fills = tokio::spawn(async move {
        while let Some(fill) = fill_rx.recv().await {
            if let Err(e) = fill_engine.report_fill(fill).await {
                info!("paper: fill rejected: {e}");
            }
        }
    });
    let alerts = tokio::spawn(async move {
        while let Some(alert) = alert_rx.recv().await {
            info!("paper ALERT [{}] {}", alert.severity, alert.message);
        }
    });

    info!("paper: simulating {symbols:?} on {VENUES:?} for {duration_secs}s");
    let mut walks: Vec<RandomWalk> = symbols
        .iter()
        .flat_map(|symbol| {
            VENUES.iter().enumerate().map(move |(i, venue)| {
                let base = if symbol.contains("BTC") { 43_500.0 } else { 2_300.0 };
                RandomWalk::new(symbol, venue, base, 0.0001 * (i as f64 + 1.0))
            })
        })
        .collect();

    let session = tokio::time::Instant::now();
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(50));
    while session.elapsed().as_secs() < duration_secs {
        ticker.tick().await;
        for walk in walks.iter_mut() {
            for event in walk.tick() {
                engine.ingest(event).await;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(detection, monitoring);
    fills.abort();
    alerts.abort();

    let metrics = engine.detector_metrics().await;
    let report = engine.pnl_report().await;
    info!(
        "paper: {} cycles, {} opportunities detected, last cycle {:.2}ms",
        metrics.detection_cycles, metrics.opportunities_detected, metrics.last_cycle_ms
    );
    info!(
        "paper: realized ${} unrealized ${} over {} closed trades (win rate {:.1}%)",
        report.snapshot.realized_pnl,
        report.snapshot.unrealized_pnl,
        report.snapshot.total_trades,
        report.snapshot.win_rate_pct
    );
    for (symbol, pnl) in &report.pnl_by_symbol {
        info!("paper: {symbol} realized ${pnl}");
    }

    Ok(())
}
