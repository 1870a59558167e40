use crate::application::detection::{DetectorMetrics, OpportunityDetector};
use crate::application::execution::ExecutionPlanner;
use crate::application::market_data::MarketDataCache;
use crate::application::pnl::{PnlReport, PnlTracker};
use crate::application::positions::{PositionLimits, PositionManager};
use crate::application::ranking::{OpportunityRanker, OpportunityValidator};
use crate::application::risk::RiskMonitor;
use crate::config::Config;
use crate::domain::errors::EngineError;
use crate::domain::execution::ExecutionPlan;
use crate::domain::market::{ConnectionState, VenueEvent};
use crate::domain::ports::{ExecutionBridge, FillReport};
use crate::domain::position::{Position, TradeRecord};
use crate::domain::risk::RiskAlert;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

struct Pipeline {
    detector: OpportunityDetector,
    validator: OpportunityValidator,
    ranker: OpportunityRanker,
    planner: ExecutionPlanner,
}

/// The detection-to-execution pipeline.
///
/// Owns the market-data cache and the per-stage components, runs the
/// detection loop on its cadence, gates plans through the risk monitor's
/// veto hook, hands them to the execution bridge, and routes fills into the
/// position manager and P&L tracker.
pub struct ArbitrageEngine {
    cache: Arc<MarketDataCache>,
    risk: Arc<RiskMonitor>,
    positions: Mutex<PositionManager>,
    pnl: Mutex<PnlTracker>,
    pipeline: Mutex<Pipeline>,
    active_plans: Mutex<HashMap<String, ExecutionPlan>>,
    order_index: Mutex<HashMap<String, String>>,
    bridge: Arc<dyn ExecutionBridge>,
    config_rx: watch::Receiver<Config>,
}

impl ArbitrageEngine {
    pub fn new(
        config_rx: watch::Receiver<Config>,
        bridge: Arc<dyn ExecutionBridge>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<RiskAlert>) {
        let config = config_rx.borrow().clone();

        let cache = Arc::new(MarketDataCache::new(Duration::from_millis(
            config.detection.staleness_window_ms,
        )));
        let (risk, alert_rx) = RiskMonitor::new(config.risk.clone());
        let risk = Arc::new(risk);

        let positions = PositionManager::new(
            config.initial_capital,
            Self::position_limits(&config),
            risk.clone(),
        );
        let pnl = PnlTracker::new(
            config.pnl.clone(),
            config.initial_capital,
            config.pricing.risk_free_rate,
        );
        let pipeline = Pipeline {
            detector: OpportunityDetector::new(config.trading.clone(), config.pricing.clone()),
            validator: OpportunityValidator::new(config.trading.clone(), config.pricing.clone())
                .keep_rejected(config.ranking.keep_rejected),
            ranker: OpportunityRanker::new(config.ranking.clone()),
            planner: ExecutionPlanner::new(config.sizing.clone()),
        };

        info!("ArbitrageEngine: initialized");
        (
            Arc::new(Self {
                cache,
                risk,
                positions: Mutex::new(positions),
                pnl: Mutex::new(pnl),
                pipeline: Mutex::new(pipeline),
                active_plans: Mutex::new(HashMap::new()),
                order_index: Mutex::new(HashMap::new()),
                bridge,
                config_rx,
            }),
            alert_rx,
        )
    }

    fn position_limits(config: &Config) -> PositionLimits {
        PositionLimits {
            max_position_size: config.trading.max_position_usd,
            max_leverage: config.risk.max_leverage,
            max_concentration: config.risk.max_concentration,
            max_correlation: config.trading.max_correlation,
            ..PositionLimits::default()
        }
    }

    pub fn cache(&self) -> &Arc<MarketDataCache> {
        &self.cache
    }

    pub fn risk(&self) -> &Arc<RiskMonitor> {
        &self.risk
    }

    /// Feeds one normalized venue event into the cache and the downstream
    /// marks. Ingestion never aborts the core: bad events are logged.
    pub async fn ingest(&self, event: VenueEvent) {
        match event {
            VenueEvent::Quote(quote) => {
                self.cache.update([quote.clone()]);
                self.risk.update_market_data(std::slice::from_ref(&quote));
                self.positions
                    .lock()
                    .await
                    .update_marks(std::slice::from_ref(&quote));
                self.pnl
                    .lock()
                    .await
                    .update_market_prices(std::slice::from_ref(&quote));
            }
            VenueEvent::Trade {
                venue,
                symbol,
                price,
                timestamp,
                ..
            } => {
                use rust_decimal::prelude::ToPrimitive;
                let key = crate::domain::market::MarketKey::new(symbol, venue);
                self.cache
                    .update_price_history(&key, price.to_f64().unwrap_or(0.0), timestamp);
            }
            VenueEvent::Funding {
                venue,
                symbol,
                rate,
                timestamp,
            } => {
                self.cache.apply_funding(&venue, &symbol, rate, timestamp);
            }
            VenueEvent::Mark {
                venue,
                symbol,
                price,
                timestamp,
            } => {
                self.cache.apply_mark(&venue, &symbol, price, timestamp);
            }
            VenueEvent::ConnectionState { venue, state } => match state {
                ConnectionState::Error | ConnectionState::Disconnected => {
                    warn!("ArbitrageEngine: venue {venue} is {state}");
                }
                _ => debug!("ArbitrageEngine: venue {venue} is {state}"),
            },
        }
    }

    /// One detection pass: snapshot, detect, validate, rank, plan, veto,
    /// submit. Returns the plans that made it to the bridge.
    pub async fn detect_cycle(&self) -> Vec<ExecutionPlan> {
        let snapshot = self.cache.snapshot();

        let plans = {
            let pipeline = self.pipeline.lock().await;
            let candidates = pipeline.detector.detect(&snapshot);
            if candidates.is_empty() {
                return Vec::new();
            }
            let stats = pipeline.ranker.statistics(&candidates);
            debug!(
                "ArbitrageEngine: {} candidates (mean profit {:.3}%, mean risk {:.2})",
                stats.total, stats.mean_profit_pct, stats.mean_risk
            );
            let validated = pipeline.validator.validate_all(candidates, &snapshot);
            let ranked = pipeline.ranker.rank(validated);
            pipeline.planner.optimize_sequence(&ranked)
        };

        let mut submitted = Vec::new();
        for plan in plans {
            if let Err(e) = self.risk.check_plan(&plan) {
                warn!("ArbitrageEngine: plan {} vetoed: {e}", plan.plan_id);
                continue;
            }
            if let Err(e) = self.bridge.submit_plan(&plan).await {
                error!("ArbitrageEngine: submit failed for {}: {e}", plan.plan_id);
                continue;
            }

            let mut order_index = self.order_index.lock().await;
            for order in &plan.orders {
                order_index.insert(order.order_id.clone(), plan.plan_id.clone());
            }
            self.active_plans
                .lock()
                .await
                .insert(plan.plan_id.clone(), plan.clone());
            submitted.push(plan);
        }
        submitted
    }

    /// Routes a fill from the order router into the plan, the position book
    /// and the trade history.
    pub async fn report_fill(&self, fill: FillReport) -> Result<(), EngineError> {
        let plan_id = self
            .order_index
            .lock()
            .await
            .get(&fill.order_id)
            .cloned()
            .ok_or_else(|| EngineError::PlanInfeasible {
                reason: format!("fill for unknown order {}", fill.order_id),
            })?;

        // Take the plan out of the map so no other lock is held across the
        // planner and book updates.
        let mut plan = self
            .active_plans
            .lock()
            .await
            .remove(&plan_id)
            .ok_or_else(|| EngineError::PlanInfeasible {
                reason: format!("plan {plan_id} no longer tracked"),
            })?;

        let (venue, instrument, side, target_price) = {
            let Some(order) = plan.order_mut(&fill.order_id) else {
                self.active_plans.lock().await.insert(plan_id.clone(), plan);
                return Err(EngineError::PlanInfeasible {
                    reason: format!("order {} missing from plan {plan_id}", fill.order_id),
                });
            };
            (
                order.venue.clone(),
                order.instrument.clone(),
                order.side,
                order.target_price,
            )
        };

        {
            let pipeline = self.pipeline.lock().await;
            pipeline.planner.handle_fill(&mut plan, &fill);
        }
        // A partial fill may have appended a remainder order; index it.
        {
            let mut order_index = self.order_index.lock().await;
            for order in &plan.orders {
                order_index
                    .entry(order.order_id.clone())
                    .or_insert_with(|| plan_id.clone());
            }
        }

        let strategy = plan.opportunity.strategy.tag();
        let trade_id = TradeRecord::generate_id();
        self.positions.lock().await.apply_fill(
            &venue,
            &instrument,
            side,
            fill.executed_quantity,
            fill.executed_price,
            &trade_id,
            strategy,
        );
        self.pnl.lock().await.record_trade(
            &trade_id,
            Some(&plan_id),
            &venue,
            &instrument,
            side,
            fill.executed_quantity,
            fill.executed_price,
            target_price,
        );

        if plan.status.is_terminal() {
            info!(
                "ArbitrageEngine: plan {} reached terminal status {}",
                plan_id, plan.status
            );
        }
        self.active_plans.lock().await.insert(plan_id, plan);
        Ok(())
    }

    /// Opens a position through the manager's admission gates.
    pub async fn open_position(
        &self,
        position: Position,
        strategy: &str,
    ) -> Result<(), EngineError> {
        self.positions.lock().await.open_position(position, strategy)
    }

    pub async fn plan(&self, plan_id: &str) -> Option<ExecutionPlan> {
        self.active_plans.lock().await.get(plan_id).cloned()
    }

    pub async fn detector_metrics(&self) -> DetectorMetrics {
        self.pipeline.lock().await.detector.metrics()
    }

    pub async fn pnl_report(&self) -> PnlReport {
        self.pnl.lock().await.report()
    }

    pub async fn active_positions(&self) -> Vec<Position> {
        self.positions.lock().await.active_positions()
    }

    async fn apply_config(&self, config: &Config) {
        let mut pipeline = self.pipeline.lock().await;
        pipeline
            .detector
            .update_config(config.trading.clone(), config.pricing.clone());
        pipeline
            .validator
            .update_config(config.trading.clone(), config.pricing.clone());
        pipeline.ranker.update_config(config.ranking.clone());
        pipeline.planner.update_config(config.sizing.clone());
        drop(pipeline);

        self.risk.update_config(config.risk.clone());
        self.positions
            .lock()
            .await
            .update_limits(Self::position_limits(config));
        info!("ArbitrageEngine: configuration applied");
    }

    /// Detection loop. Runs a pass per interval tick, re-reads configuration
    /// on change, and exits when the stop flag flips.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut config_rx = self.config_rx.clone();
        let interval_ms = config_rx.borrow().detection.interval_ms;
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        info!("ArbitrageEngine: detection loop started ({interval_ms}ms cadence)");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let submitted = self.detect_cycle().await;
                    if !submitted.is_empty() {
                        info!("ArbitrageEngine: submitted {} plans", submitted.len());
                    }
                }
                changed = config_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let config = config_rx.borrow().clone();
                    self.apply_config(&config).await;
                    ticker = tokio::time::interval(Duration::from_millis(
                        config.detection.interval_ms.max(1),
                    ));
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("ArbitrageEngine: detection loop stopped");
    }

    /// Ingestion task for one adapter's event stream.
    pub async fn run_ingestion(
        self: Arc<Self>,
        mut events: broadcast::Receiver<VenueEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => self.ingest(event).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("ArbitrageEngine: ingestion lagged, {n} events dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("ArbitrageEngine: ingestion task stopped");
    }
}
