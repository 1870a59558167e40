use crate::application::risk::RiskMonitor;
use crate::domain::errors::{EngineError, RiskBreachKind};
use crate::domain::market::{MarketKey, PriceSeries, Quote, Side};
use crate::domain::position::{CapitalAllocation, Position};
use crate::domain::risk::{AlertKind, AlertSeverity, RiskAlert};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

/// Per-position admission limits.
#[derive(Debug, Clone)]
pub struct PositionLimits {
    /// Maximum notional of a single position, USD.
    pub max_position_size: Decimal,
    pub max_leverage: f64,
    /// Maximum share of portfolio exposure in one symbol.
    pub max_concentration: f64,
    pub max_correlation: f64,
    /// Assumed correlation of a new position with the existing book when no
    /// estimate is available.
    pub default_book_correlation: f64,
}

impl Default for PositionLimits {
    fn default() -> Self {
        Self {
            max_position_size: Decimal::from(10_000),
            max_leverage: 3.0,
            max_concentration: 0.25,
            max_correlation: 0.8,
            default_book_correlation: 0.3,
        }
    }
}

/// Owns active positions and capital allocation.
///
/// Single-writer discipline: every mutation of positions or capital flows
/// through this type; other components hold read-only copies. Every state
/// change is reported to the risk monitor.
pub struct PositionManager {
    positions: HashMap<String, Position>,
    by_key: HashMap<MarketKey, String>,
    strategies: HashMap<String, String>,
    history: HashMap<String, Vec<Position>>,
    capital: CapitalAllocation,
    realized_pnl: Decimal,
    equity_curve: PriceSeries,
    limits: PositionLimits,
    risk: Arc<RiskMonitor>,
}

impl PositionManager {
    pub fn new(initial_capital: Decimal, limits: PositionLimits, risk: Arc<RiskMonitor>) -> Self {
        info!("PositionManager: initialized with capital ${initial_capital}");
        let mut equity_curve = PriceSeries::new(PriceSeries::EQUITY_CURVE_CAPACITY);
        equity_curve.push(
            Utc::now().timestamp_millis(),
            initial_capital.to_f64().unwrap_or(0.0),
        );
        Self {
            positions: HashMap::new(),
            by_key: HashMap::new(),
            strategies: HashMap::new(),
            history: HashMap::new(),
            capital: CapitalAllocation::new(initial_capital),
            realized_pnl: Decimal::ZERO,
            equity_curve,
            limits,
            risk,
        }
    }

    pub fn update_limits(&mut self, limits: PositionLimits) {
        self.limits = limits;
    }

    /// Moves capital from the unallocated pool into a strategy bucket.
    pub fn allocate_capital(&mut self, strategy: &str, amount: Decimal) -> Result<(), EngineError> {
        if amount <= Decimal::ZERO || amount > self.capital.available_capital {
            return Err(EngineError::CapitalInsufficient {
                need: amount,
                available: self.capital.available_capital,
            });
        }
        *self
            .capital
            .strategy_allocations
            .entry(strategy.to_string())
            .or_default() += amount;
        self.capital.available_capital -= amount;
        self.capital.reserved_capital += amount;
        self.capital.last_update = Utc::now();
        info!("PositionManager: allocated ${amount} to strategy {strategy}");
        Ok(())
    }

    /// Capital a strategy can still deploy: its bucket when one exists,
    /// otherwise the unallocated pool.
    pub fn available_capital(&self, strategy: &str) -> Decimal {
        self.capital
            .strategy_allocations
            .get(strategy)
            .copied()
            .unwrap_or(self.capital.available_capital)
            .max(Decimal::ZERO)
    }

    /// Admits a new position after the capital and risk gates.
    ///
    /// Rejections surface as errors to the caller and as Warning alerts
    /// through the risk monitor; no state changes on rejection.
    pub fn open_position(
        &mut self,
        position: Position,
        strategy: &str,
    ) -> Result<(), EngineError> {
        if self.positions.contains_key(&position.position_id) {
            return Err(EngineError::PlanInfeasible {
                reason: format!("position already exists: {}", position.position_id),
            });
        }

        let notional = position.notional();
        let leverage = position.leverage.max(1.0);
        let required = notional / Decimal::from_f64_retain(leverage).unwrap_or(Decimal::ONE);

        if notional > self.limits.max_position_size {
            let current = notional.to_f64().unwrap_or(0.0);
            let limit = self.limits.max_position_size.to_f64().unwrap_or(0.0);
            self.reject_alert(
                AlertKind::ConcentrationBreach,
                "Position size over limit",
                current,
                limit,
                &position,
            );
            return Err(EngineError::RiskLimitBreach {
                kind: RiskBreachKind::PositionSize,
                current,
                limit,
            });
        }

        if position.leverage > self.limits.max_leverage {
            self.reject_alert(
                AlertKind::LeverageBreach,
                "Position leverage over limit",
                position.leverage,
                self.limits.max_leverage,
                &position,
            );
            return Err(EngineError::RiskLimitBreach {
                kind: RiskBreachKind::Leverage,
                current: position.leverage,
                limit: self.limits.max_leverage,
            });
        }

        let projected = self.projected_concentration(&position);
        if projected > self.limits.max_concentration {
            self.reject_alert(
                AlertKind::ConcentrationBreach,
                "Position would breach concentration limit",
                projected,
                self.limits.max_concentration,
                &position,
            );
            return Err(EngineError::RiskLimitBreach {
                kind: RiskBreachKind::Concentration,
                current: projected,
                limit: self.limits.max_concentration,
            });
        }

        let correlation = self.book_correlation(&position);
        if correlation > self.limits.max_correlation {
            self.reject_alert(
                AlertKind::CorrelationRisk,
                "Position too correlated with book",
                correlation,
                self.limits.max_correlation,
                &position,
            );
            return Err(EngineError::RiskLimitBreach {
                kind: RiskBreachKind::Correlation,
                current: correlation,
                limit: self.limits.max_correlation,
            });
        }

        let available = self.available_capital(strategy);
        if required > available {
            let alert = RiskAlert::new(
                AlertSeverity::Warning,
                AlertKind::LiquidityRisk,
                format!(
                    "Capital rejected for {}@{}: need ${required}, available ${available}",
                    position.symbol, position.venue
                ),
                required.to_f64().unwrap_or(0.0),
                available.to_f64().unwrap_or(0.0),
            )
            .for_position(position.position_id.clone());
            self.risk.push_alert(alert);
            return Err(EngineError::CapitalInsufficient {
                need: required,
                available,
            });
        }

        // Admitted: commit capital and report.
        if let Some(bucket) = self.capital.strategy_allocations.get_mut(strategy) {
            *bucket -= required;
        } else {
            self.capital.available_capital -= required;
        }
        self.capital.allocated_capital += required;
        self.capital.last_update = Utc::now();

        self.by_key.insert(
            MarketKey::new(position.symbol.clone(), position.venue.clone()),
            position.position_id.clone(),
        );
        self.strategies
            .insert(position.position_id.clone(), strategy.to_string());
        self.risk.add_position(position.clone());
        info!(
            "PositionManager: opened {} ({} {}@{} notional ${notional})",
            position.position_id, position.size, position.symbol, position.venue
        );
        self.positions.insert(position.position_id.clone(), position);
        Ok(())
    }

    /// Resizes a position in place and settles the capital delta.
    pub fn adjust_position(
        &mut self,
        position_id: &str,
        new_size: Decimal,
        reason: &str,
    ) -> Result<(), EngineError> {
        let position = self
            .positions
            .get_mut(position_id)
            .ok_or_else(|| EngineError::PositionNotFound {
                position_id: position_id.to_string(),
            })?;

        let old_notional = position.notional();
        let old_size = position.size;
        position.size = new_size;
        position.cost_basis = new_size.abs() * position.average_entry_price;
        position.last_update_at = Utc::now();
        let new_notional = position.notional();

        let leverage = Decimal::from_f64_retain(position.leverage.max(1.0)).unwrap_or(Decimal::ONE);
        let delta = (new_notional - old_notional) / leverage;
        self.capital.allocated_capital += delta;
        if let Some(strategy) = self.strategies.get(position_id) {
            if let Some(bucket) = self.capital.strategy_allocations.get_mut(strategy) {
                *bucket -= delta;
            } else {
                self.capital.available_capital -= delta;
            }
        }
        self.capital.last_update = Utc::now();

        self.risk.update_position(self.positions[position_id].clone());
        info!(
            "PositionManager: adjusted {position_id} from {old_size} to {new_size} ({reason})"
        );
        Ok(())
    }

    /// Closes a position, returns its capital to the strategy bucket, and
    /// reports the freed amount.
    pub fn close_position(
        &mut self,
        position_id: &str,
        reason: &str,
    ) -> Result<Decimal, EngineError> {
        let mut position = self
            .positions
            .remove(position_id)
            .ok_or_else(|| EngineError::PositionNotFound {
                position_id: position_id.to_string(),
            })?;

        let leverage = Decimal::from_f64_retain(position.leverage.max(1.0)).unwrap_or(Decimal::ONE);
        let released = position.notional() / leverage;

        self.capital.allocated_capital -= released;
        let strategy = self
            .strategies
            .remove(position_id)
            .unwrap_or_else(|| "default".to_string());
        if let Some(bucket) = self.capital.strategy_allocations.get_mut(&strategy) {
            *bucket += released;
        } else {
            self.capital.available_capital += released;
        }
        self.capital.last_update = Utc::now();

        self.by_key
            .remove(&MarketKey::new(position.symbol.clone(), position.venue.clone()));
        position.is_active = false;
        self.risk.close_position(position_id);
        self.history.entry(strategy).or_default().push(position);

        info!("PositionManager: closed {position_id} ({reason}), released ${released}");
        Ok(released)
    }

    /// Applies a fill to the position keyed by (symbol, venue), creating it
    /// on first contact. Returns the realized P&L of any reduced portion.
    pub fn apply_fill(
        &mut self,
        venue: &str,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        trade_id: &str,
        strategy: &str,
    ) -> Decimal {
        let key = MarketKey::new(symbol, venue);
        let position_id = match self.by_key.get(&key) {
            Some(id) => id.clone(),
            None => {
                let position = Position::new(symbol, venue);
                let id = position.position_id.clone();
                self.by_key.insert(key.clone(), id.clone());
                self.strategies.insert(id.clone(), strategy.to_string());
                self.positions.insert(id.clone(), position);
                id
            }
        };

        let Some(position) = self.positions.get_mut(&position_id) else {
            return Decimal::ZERO;
        };
        let realized = position.apply_fill(side, quantity, price);
        position.trade_ids.push(trade_id.to_string());
        self.realized_pnl += realized;

        if position.is_flat() {
            let closed = self.positions.remove(&position_id);
            self.by_key.remove(&key);
            let strategy = self
                .strategies
                .remove(&position_id)
                .unwrap_or_else(|| "default".to_string());
            if let Some(p) = closed {
                self.history.entry(strategy).or_default().push(p);
            }
            self.risk.close_position(&position_id);
            info!("PositionManager: {position_id} flat after fill, realized ${realized}");
        } else {
            self.risk.update_position(position.clone());
        }
        realized
    }

    /// Re-marks positions from fresh quotes and advances the equity curve.
    pub fn update_marks(&mut self, quotes: &[Quote]) {
        for quote in quotes {
            let key = quote.key();
            if let Some(id) = self.by_key.get(&key)
                && let Some(position) = self.positions.get_mut(id)
                && let Some(price) = quote.reference_price()
            {
                position.update_mark(price);
                self.risk.update_position(position.clone());
            }
        }

        let equity = self.total_equity();
        self.equity_curve
            .push(Utc::now().timestamp_millis(), equity.to_f64().unwrap_or(0.0));
        self.risk.update_equity(equity.to_f64().unwrap_or(0.0));
    }

    pub fn total_equity(&self) -> Decimal {
        let unrealized: Decimal = self.positions.values().map(|p| p.unrealized_pnl).sum();
        self.capital.total_capital + self.realized_pnl + unrealized
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    pub fn active_positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    pub fn position_by_key(&self, symbol: &str, venue: &str) -> Option<&Position> {
        self.by_key
            .get(&MarketKey::new(symbol, venue))
            .and_then(|id| self.positions.get(id))
    }

    pub fn capital_allocation(&self) -> &CapitalAllocation {
        &self.capital
    }

    /// Sample volatility of the portfolio equity curve (log returns).
    pub fn portfolio_volatility(&self) -> f64 {
        self.equity_curve.realized_volatility(1.0).unwrap_or(0.15)
    }

    /// Share of portfolio equity the candidate's symbol would carry after
    /// admission. Equity rather than current exposure keeps the gate
    /// meaningful while the book is small.
    fn projected_concentration(&self, candidate: &Position) -> f64 {
        let equity = self.total_equity();
        if equity <= Decimal::ZERO {
            return 1.0;
        }
        let symbol_exposure: Decimal = self
            .positions
            .values()
            .filter(|p| p.symbol == candidate.symbol)
            .map(|p| p.notional())
            .sum::<Decimal>()
            + candidate.notional();
        (symbol_exposure / equity).to_f64().unwrap_or(0.0)
    }

    fn book_correlation(&self, _candidate: &Position) -> f64 {
        if self.positions.is_empty() {
            0.0
        } else {
            self.limits.default_book_correlation
        }
    }

    fn reject_alert(
        &self,
        kind: AlertKind,
        message: &str,
        current: f64,
        limit: f64,
        position: &Position,
    ) {
        warn!(
            "PositionManager: rejecting {}@{}: {message} ({current:.4} > {limit:.4})",
            position.symbol, position.venue
        );
        self.risk.push_alert(
            RiskAlert::new(AlertSeverity::Warning, kind, message, current, limit)
                .for_position(position.position_id.clone()),
        );
    }

    pub fn status_report(&self) -> String {
        let mut report = String::new();
        let _ = writeln!(report, "=== Position Manager Report ===");
        let _ = writeln!(report, "Active Positions: {}", self.positions.len());
        let _ = writeln!(report, "Total Capital: ${}", self.capital.total_capital);
        let _ = writeln!(report, "Allocated Capital: ${}", self.capital.allocated_capital);
        let _ = writeln!(report, "Available Capital: ${}", self.capital.available_capital);
        let _ = writeln!(report, "Realized P&L: ${}", self.realized_pnl);
        for position in self.positions.values() {
            let _ = writeln!(
                report,
                "  {} {}@{} size={} entry={} mark={} upnl={}",
                position.position_id,
                position.symbol,
                position.venue,
                position.size,
                position.average_entry_price,
                position.mark_price,
                position.unrealized_pnl
            );
        }
        report
    }
}
