use super::var::MonteCarloVar;
use crate::config::RiskConfig;
use crate::domain::errors::{EngineError, RiskBreachKind};
use crate::domain::execution::ExecutionPlan;
use crate::domain::market::{MarketKey, PriceSeries, Quote};
use crate::domain::position::Position;
use crate::domain::risk::{AlertKind, AlertSeverity, RiskAlert, RiskMetrics};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Portfolio risk monitor.
///
/// Keeps its own view of positions and price history, computes the metric
/// set on demand or on the monitoring cadence, and dispatches limit alerts
/// through a single queue. Also serves as the planner's veto hook.
pub struct RiskMonitor {
    config: RwLock<RiskConfig>,
    positions: RwLock<HashMap<String, Position>>,
    price_history: RwLock<HashMap<MarketKey, PriceSeries>>,
    equity_curve: RwLock<PriceSeries>,
    active_alerts: RwLock<Vec<RiskAlert>>,
    alert_tx: mpsc::UnboundedSender<RiskAlert>,
}

impl RiskMonitor {
    /// Returns the monitor and the consumer end of its alert queue.
    pub fn new(config: RiskConfig) -> (Self, mpsc::UnboundedReceiver<RiskAlert>) {
        let (alert_tx, alert_rx) = mpsc::unbounded_channel();
        (
            Self {
                config: RwLock::new(config),
                positions: RwLock::new(HashMap::new()),
                price_history: RwLock::new(HashMap::new()),
                equity_curve: RwLock::new(PriceSeries::new(PriceSeries::EQUITY_CURVE_CAPACITY)),
                active_alerts: RwLock::new(Vec::new()),
                alert_tx,
            },
            alert_rx,
        )
    }

    pub fn update_config(&self, config: RiskConfig) {
        *write(&self.config) = config;
    }

    // --- position feed (single writer: the position manager) ---

    pub fn add_position(&self, position: Position) {
        info!(
            "RiskMonitor: tracking position {} {}@{} size={}",
            position.position_id, position.symbol, position.venue, position.size
        );
        write(&self.positions).insert(position.position_id.clone(), position);
    }

    pub fn update_position(&self, position: Position) {
        write(&self.positions).insert(position.position_id.clone(), position);
    }

    pub fn close_position(&self, position_id: &str) {
        if let Some(p) = write(&self.positions).get_mut(position_id) {
            p.is_active = false;
            p.size = Decimal::ZERO;
        }
    }

    pub fn active_positions(&self) -> Vec<Position> {
        read(&self.positions)
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect()
    }

    // --- market feed ---

    pub fn update_market_data(&self, quotes: &[Quote]) {
        let mut history = write(&self.price_history);
        for quote in quotes {
            if let Some(price) = quote.reference_price().and_then(|p| p.to_f64()) {
                history
                    .entry(quote.key())
                    .or_insert_with(PriceSeries::default)
                    .push(quote.timestamp, price);
            }
        }
    }

    pub fn update_equity(&self, equity: f64) {
        write(&self.equity_curve).push(Utc::now().timestamp_millis(), equity);
    }

    // --- metrics ---

    pub fn calculate_metrics(&self) -> RiskMetrics {
        let positions = self.active_positions();
        let mut metrics = RiskMetrics {
            timestamp: Utc::now(),
            ..RiskMetrics::default()
        };
        if positions.is_empty() {
            metrics.is_valid = true;
            return metrics;
        }

        let config = read(&self.config).clone();
        let history = read(&self.price_history).clone();

        let var_calc = MonteCarloVar::new(config.var_confidence, config.var_simulations);
        let (var, shortfall) = var_calc.portfolio_var(&positions, &history);
        metrics.portfolio_var = var;
        metrics.expected_shortfall = shortfall;

        let mut total = Decimal::ZERO;
        let mut leveraged = Decimal::ZERO;
        let mut by_symbol: HashMap<&str, Decimal> = HashMap::new();
        let mut synthetic_exposure = Decimal::ZERO;
        for p in &positions {
            let exposure = p.notional();
            total += exposure;
            leveraged += exposure
                * Decimal::from_f64_retain(p.leverage.max(1.0)).unwrap_or(Decimal::ONE);
            *by_symbol.entry(p.symbol.as_str()).or_default() += exposure;
            if p.is_synthetic {
                synthetic_exposure += exposure;
            }
        }
        metrics.total_exposure = total;
        metrics.leveraged_exposure = leveraged;

        if total > Decimal::ZERO {
            let max_symbol = by_symbol.values().copied().max().unwrap_or(Decimal::ZERO);
            metrics.concentration_risk = (max_symbol / total).to_f64().unwrap_or(0.0);
            metrics.funding_rate_risk = (synthetic_exposure / total).to_f64().unwrap_or(0.0);
        }

        metrics.liquidity_risk = 1.0 - self.mean_liquidity(&positions, &history);
        metrics.correlation_risk = self.portfolio_correlation(&positions, &history);
        metrics.max_drawdown = self.max_drawdown();
        metrics.is_valid = true;
        metrics
    }

    fn mean_liquidity(
        &self,
        positions: &[Position],
        history: &HashMap<MarketKey, PriceSeries>,
    ) -> f64 {
        if positions.is_empty() {
            return 1.0;
        }
        // History depth stands in for venue depth: a thin series means the
        // instrument has barely traded through this session.
        let total: f64 = positions
            .iter()
            .map(|p| {
                let key = MarketKey::new(p.symbol.clone(), p.venue.clone());
                history
                    .get(&key)
                    .map(|series| (series.len() as f64 / 1_000.0).min(1.0))
                    .unwrap_or(0.5)
            })
            .sum();
        total / positions.len() as f64
    }

    /// Mean pairwise correlation of per-position log returns. Positions with
    /// thin history are skipped; an empty sample reports 0.5.
    fn portfolio_correlation(
        &self,
        positions: &[Position],
        history: &HashMap<MarketKey, PriceSeries>,
    ) -> f64 {
        let returns: Vec<Vec<f64>> = positions
            .iter()
            .filter_map(|p| {
                let key = MarketKey::new(p.symbol.clone(), p.venue.clone());
                let series = history.get(&key)?;
                let r = series.log_returns();
                (r.len() >= 30).then_some(r)
            })
            .collect();
        if returns.len() < 2 {
            return 0.5;
        }

        let mut total = 0.0;
        let mut pairs = 0usize;
        for i in 0..returns.len() {
            for j in (i + 1)..returns.len() {
                if let Some(c) = pearson(&returns[i], &returns[j]) {
                    total += c;
                    pairs += 1;
                }
            }
        }
        if pairs == 0 { 0.5 } else { total / pairs as f64 }
    }

    fn max_drawdown(&self) -> f64 {
        let curve = read(&self.equity_curve).prices();
        if curve.is_empty() {
            return 0.0;
        }
        let mut peak = curve[0];
        let mut max_dd = 0.0;
        for equity in curve {
            if equity > peak {
                peak = equity;
            } else if peak > 0.0 {
                max_dd = f64::max(max_dd, (peak - equity) / peak);
            }
        }
        max_dd
    }

    // --- alerts ---

    /// Compares metrics to limits; crossing `warning_threshold * limit` fires
    /// a Warning, `critical_threshold * limit` a Critical.
    pub fn check_limits(&self) -> Vec<RiskAlert> {
        let metrics = self.calculate_metrics();
        if !metrics.is_valid {
            return Vec::new();
        }
        let config = read(&self.config).clone();
        let mut alerts = Vec::new();

        let total_exposure = metrics.total_exposure.to_f64().unwrap_or(0.0);
        // VaR limit is a fraction of exposure.
        let var_limit = config.max_portfolio_var * total_exposure.max(1.0);
        if metrics.portfolio_var > var_limit * config.critical_threshold {
            alerts.push(RiskAlert::new(
                AlertSeverity::Critical,
                AlertKind::VarBreach,
                "Portfolio VaR exceeded critical threshold",
                metrics.portfolio_var,
                var_limit,
            ));
        } else if metrics.portfolio_var > var_limit * config.warning_threshold {
            alerts.push(RiskAlert::new(
                AlertSeverity::Warning,
                AlertKind::VarBreach,
                "Portfolio VaR approaching limit",
                metrics.portfolio_var,
                var_limit,
            ));
        }

        if total_exposure > 0.0 {
            let leverage =
                metrics.leveraged_exposure.to_f64().unwrap_or(0.0) / total_exposure;
            if leverage > config.max_leverage {
                alerts.push(RiskAlert::new(
                    AlertSeverity::Warning,
                    AlertKind::LeverageBreach,
                    "Portfolio leverage too high",
                    leverage,
                    config.max_leverage,
                ));
            }
        }

        if metrics.concentration_risk > config.max_concentration {
            alerts.push(RiskAlert::new(
                AlertSeverity::Warning,
                AlertKind::ConcentrationBreach,
                "Portfolio concentration too high",
                metrics.concentration_risk,
                config.max_concentration,
            ));
        }

        if metrics.liquidity_risk > config.liquidity_threshold {
            alerts.push(RiskAlert::new(
                AlertSeverity::Warning,
                AlertKind::LiquidityRisk,
                "Low liquidity detected in portfolio",
                metrics.liquidity_risk,
                config.liquidity_threshold,
            ));
        }

        alerts
    }

    /// Queues an alert for the dispatcher and remembers it until expiry.
    pub fn push_alert(&self, alert: RiskAlert) {
        warn!(
            "RiskMonitor: {} alert ({:?}): {} [{:.4} vs limit {:.4}]",
            alert.severity, alert.kind, alert.message, alert.current_value, alert.limit_value
        );
        write(&self.active_alerts).push(alert.clone());
        let _ = self.alert_tx.send(alert);
    }

    pub fn active_alerts(&self) -> Vec<RiskAlert> {
        read(&self.active_alerts).clone()
    }

    pub fn cleanup_expired_alerts(&self) {
        let ttl_minutes = read(&self.config).alert_ttl_minutes;
        let ttl = Duration::from_secs((ttl_minutes.max(0) as u64) * 60);
        let now = Utc::now();
        write(&self.active_alerts).retain(|a| !a.is_expired(ttl, now));
    }

    // --- planner veto hook ---

    /// Vetoes a plan whose capital or projected VaR would breach limits.
    pub fn check_plan(&self, plan: &ExecutionPlan) -> Result<(), EngineError> {
        let config = read(&self.config).clone();
        let metrics = self.calculate_metrics();

        let plan_capital = plan.max_total_capital.to_f64().unwrap_or(0.0);
        let exposure = metrics.total_exposure.to_f64().unwrap_or(0.0) + plan_capital;
        let var_limit = config.max_portfolio_var * exposure.max(1.0);
        // Worst case: the plan's modeled risk fully materializes on top of
        // the current book.
        let projected_var = metrics.portfolio_var + plan_capital * plan.opportunity.risk_score
            * config.max_portfolio_var;
        if exposure > 0.0 && projected_var > var_limit {
            let alert = RiskAlert::new(
                AlertSeverity::Warning,
                AlertKind::VarBreach,
                format!("Plan {} vetoed: projected VaR over limit", plan.plan_id),
                projected_var,
                var_limit,
            );
            self.push_alert(alert);
            return Err(EngineError::RiskLimitBreach {
                kind: RiskBreachKind::Var,
                current: projected_var,
                limit: var_limit,
            });
        }
        Ok(())
    }

    /// Monitoring loop: samples metrics on the configured cadence and
    /// dispatches alerts until the stop flag flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let interval_ms = read(&self.config).monitor_interval_ms;
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        info!("RiskMonitor: monitoring started ({interval_ms}ms cadence)");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for alert in self.check_limits() {
                        self.push_alert(alert);
                    }
                    self.cleanup_expired_alerts();
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("RiskMonitor: monitoring stopped");
    }
}

fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let (a, b) = (&a[a.len() - n..], &b[b.len() - n..]);
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            error!("RiskMonitor: lock poisoned during read, recovering");
            poisoned.into_inner()
        }
    }
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            error!("RiskMonitor: lock poisoned during write, recovering");
            poisoned.into_inner()
        }
    }
}
