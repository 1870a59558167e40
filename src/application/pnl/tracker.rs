use super::analytics::{
    PerformanceAnalytics, annualized_volatility, expected_shortfall, max_drawdown_pct,
    sharpe_ratio, sortino_ratio, value_at_risk,
};
use crate::config::PnlConfig;
use crate::domain::market::{MarketKey, Quote, Side};
use crate::domain::position::{Position, TradeRecord};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Point-in-time portfolio P&L with headline analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PnlSnapshot {
    pub timestamp: DateTime<Utc>,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_pnl: Decimal,
    pub total_return_pct: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown_pct: f64,
    pub win_rate_pct: f64,
    pub total_trades: usize,
    pub capital_deployed: Decimal,
    pub available_capital: Decimal,
    pub capital_utilization_pct: f64,
}

/// Full report: current snapshot, analytics, open positions, recent trades
/// and realized P&L broken down by symbol and venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PnlReport {
    pub snapshot: PnlSnapshot,
    pub analytics: PerformanceAnalytics,
    pub open_positions: Vec<Position>,
    pub recent_trades: Vec<TradeRecord>,
    pub pnl_by_symbol: HashMap<String, Decimal>,
    pub pnl_by_venue: HashMap<String, Decimal>,
}

/// Immutable trade history, derived positions and periodic P&L snapshots.
///
/// The trade log is append-only with at-most-once insertion per trade id;
/// closing writes each record's exit fields exactly once and never rewrites
/// anything else.
pub struct PnlTracker {
    config: PnlConfig,
    initial_capital: Decimal,
    risk_free_rate: f64,
    trades: Vec<TradeRecord>,
    seen_trade_ids: HashSet<String>,
    /// Unconsumed quantity per open trade record.
    open_quantities: HashMap<String, Decimal>,
    /// P&L accrued against a record that is not yet fully consumed.
    pending_pnl: HashMap<String, Decimal>,
    realized_total: Decimal,
    positions: HashMap<MarketKey, Position>,
    market_prices: HashMap<MarketKey, Decimal>,
    snapshots: Vec<PnlSnapshot>,
    started_at: DateTime<Utc>,
    last_snapshot_at: DateTime<Utc>,
}

impl PnlTracker {
    pub fn new(config: PnlConfig, initial_capital: Decimal, risk_free_rate: f64) -> Self {
        let now = Utc::now();
        info!("PnlTracker: initialized with capital ${initial_capital}");
        Self {
            config,
            initial_capital,
            risk_free_rate,
            trades: Vec::new(),
            seen_trade_ids: HashSet::new(),
            open_quantities: HashMap::new(),
            pending_pnl: HashMap::new(),
            realized_total: Decimal::ZERO,
            positions: HashMap::new(),
            market_prices: HashMap::new(),
            snapshots: Vec::new(),
            started_at: now,
            last_snapshot_at: now,
        }
    }

    /// Appends a fill to the trade log and folds it into the derived
    /// position. A repeated trade id is ignored.
    #[allow(clippy::too_many_arguments)]
    pub fn record_trade(
        &mut self,
        trade_id: &str,
        plan_id: Option<&str>,
        venue: &str,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        executed_price: Decimal,
        target_price: Decimal,
    ) {
        if !self.seen_trade_ids.insert(trade_id.to_string()) {
            warn!("PnlTracker: duplicate trade id {trade_id} ignored");
            return;
        }

        let transaction_costs = executed_price * quantity * Decimal::new(1, 3); // 0.1%
        let slippage = (executed_price - target_price).abs() * quantity;
        let trade = TradeRecord {
            trade_id: trade_id.to_string(),
            plan_id: plan_id.map(|p| p.to_string()),
            venue: venue.to_string(),
            symbol: symbol.to_string(),
            side,
            quantity,
            entry_price: executed_price,
            entry_time: Utc::now(),
            exit_price: None,
            exit_time: None,
            realized_pnl: None,
            transaction_costs,
            slippage,
            total_costs: transaction_costs + slippage,
            is_closed: false,
        };
        self.trades.push(trade);
        self.open_quantities.insert(trade_id.to_string(), quantity);

        let key = MarketKey::new(symbol, venue);
        let position = self
            .positions
            .entry(key.clone())
            .or_insert_with(|| Position::new(symbol, venue));
        position.apply_fill(side, quantity, executed_price);
        position.trade_ids.push(trade_id.to_string());
        if position.is_flat() {
            self.positions.remove(&key);
        }

        info!(
            "PnlTracker: recorded {trade_id} {side} {quantity} {symbol}@{venue} at ${executed_price}"
        );
        self.maybe_snapshot();
    }

    /// Marks derived positions to the latest prices.
    pub fn update_market_prices(&mut self, quotes: &[Quote]) {
        for quote in quotes {
            if let Some(price) = quote.reference_price() {
                self.market_prices.insert(quote.key(), price);
            }
        }
        for (key, position) in self.positions.iter_mut() {
            if let Some(price) = self.market_prices.get(key) {
                position.update_mark(*price);
            }
        }
        self.maybe_snapshot();
    }

    /// Closes (part of) the derived position at `exit_price`, realizing P&L
    /// into the contributing open trade records pro rata.
    pub fn close_position(
        &mut self,
        symbol: &str,
        venue: &str,
        exit_price: Decimal,
        quantity: Option<Decimal>,
    ) -> Decimal {
        let key = MarketKey::new(symbol, venue);
        let Some(position) = self.positions.get_mut(&key) else {
            warn!("PnlTracker: close for unknown position {symbol}@{venue}");
            return Decimal::ZERO;
        };

        let close_qty = quantity.unwrap_or_else(|| position.size.abs());
        let close_qty = close_qty.min(position.size.abs());
        if close_qty.is_zero() {
            return Decimal::ZERO;
        }

        let realized = if position.size.is_sign_positive() {
            (exit_price - position.average_entry_price) * close_qty
        } else {
            (position.average_entry_price - exit_price) * close_qty
        };

        let trade_ids = position.trade_ids.clone();
        let side = if position.size.is_sign_positive() {
            Side::Sell
        } else {
            Side::Buy
        };
        position.apply_fill(side, close_qty, exit_price);
        if position.is_flat() {
            self.positions.remove(&key);
        }

        // Consume open records oldest first; a record closes once its full
        // quantity is used up, carrying all the P&L accrued against it.
        let now = Utc::now();
        let per_unit = realized / close_qty;
        let mut remaining = close_qty;
        for trade_id in trade_ids {
            if remaining <= Decimal::ZERO {
                break;
            }
            let Some(open) = self.open_quantities.get_mut(&trade_id) else {
                continue;
            };
            if *open <= Decimal::ZERO {
                continue;
            }
            let share = (*open).min(remaining);
            *open -= share;
            remaining -= share;
            *self.pending_pnl.entry(trade_id.clone()).or_default() += per_unit * share;

            if open.is_zero() {
                self.open_quantities.remove(&trade_id);
                let accrued = self.pending_pnl.remove(&trade_id).unwrap_or(Decimal::ZERO);
                if let Some(trade) = self.trades.iter_mut().find(|t| t.trade_id == trade_id) {
                    trade.close(exit_price, accrued, now);
                }
            }
        }
        self.realized_total += realized;

        info!("PnlTracker: closed {close_qty} {symbol}@{venue}, realized ${realized}");
        self.maybe_snapshot();
        realized
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_total
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.unrealized_pnl).sum()
    }

    pub fn total_pnl(&self) -> Decimal {
        self.realized_pnl() + self.unrealized_pnl()
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    pub fn current_snapshot(&self) -> PnlSnapshot {
        let realized = self.realized_pnl();
        let unrealized = self.unrealized_pnl();
        let total = realized + unrealized;

        let capital_deployed: Decimal =
            self.positions.values().map(|p| p.cost_basis.abs()).sum();
        let available = self.initial_capital + realized - capital_deployed;
        let utilization = if self.initial_capital > Decimal::ZERO {
            (capital_deployed / self.initial_capital)
                .to_f64()
                .unwrap_or(0.0)
                * 100.0
        } else {
            0.0
        };

        let analytics = self.analytics();
        PnlSnapshot {
            timestamp: Utc::now(),
            realized_pnl: realized,
            unrealized_pnl: unrealized,
            total_pnl: total,
            total_return_pct: analytics.total_return_pct,
            sharpe_ratio: analytics.sharpe_ratio,
            max_drawdown_pct: analytics.max_drawdown_pct,
            win_rate_pct: analytics.win_rate_pct,
            total_trades: analytics.total_trades,
            capital_deployed,
            available_capital: available,
            capital_utilization_pct: utilization,
        }
    }

    pub fn analytics(&self) -> PerformanceAnalytics {
        let mut analytics = PerformanceAnalytics::default();

        let total_pnl = self.total_pnl().to_f64().unwrap_or(0.0);
        let initial = self.initial_capital.to_f64().unwrap_or(0.0);
        if initial > 0.0 {
            analytics.total_return_pct = total_pnl / initial * 100.0;
            analytics.capital_efficiency = total_pnl / initial;
        }

        let years = (Utc::now() - self.started_at).num_seconds() as f64
            / (365.25 * 24.0 * 3600.0);
        if years > 0.0 && analytics.total_return_pct > -100.0 {
            analytics.annualized_return_pct =
                ((1.0 + analytics.total_return_pct / 100.0).powf(1.0 / years) - 1.0) * 100.0;
        }

        let daily_returns = self.daily_returns();
        analytics.sharpe_ratio = sharpe_ratio(&daily_returns, self.risk_free_rate);
        analytics.sortino_ratio = sortino_ratio(&daily_returns, self.risk_free_rate);
        analytics.volatility = annualized_volatility(&daily_returns);
        analytics.var_95 = value_at_risk(&daily_returns, 0.95);
        analytics.expected_shortfall = expected_shortfall(&daily_returns, 0.95);
        analytics.max_drawdown_pct = max_drawdown_pct(&self.equity_curve());

        let mut wins = 0usize;
        let mut closed = 0usize;
        let mut total_wins = 0.0;
        let mut total_losses = 0.0;
        for trade in self.trades.iter().filter(|t| t.is_closed) {
            closed += 1;
            let pnl = trade
                .realized_pnl
                .and_then(|p| p.to_f64())
                .unwrap_or(0.0);
            if pnl > 0.0 {
                wins += 1;
                total_wins += pnl;
            } else {
                total_losses += pnl.abs();
            }
        }
        analytics.total_trades = closed;
        if closed > 0 {
            analytics.win_rate_pct = wins as f64 / closed as f64 * 100.0;
            analytics.average_win = if wins > 0 { total_wins / wins as f64 } else { 0.0 };
            let losses = closed - wins;
            analytics.average_loss = if losses > 0 {
                total_losses / losses as f64
            } else {
                0.0
            };
            analytics.profit_factor = if total_losses > 0.0 {
                total_wins / total_losses
            } else if total_wins > 0.0 {
                f64::INFINITY
            } else {
                0.0
            };
        }
        if analytics.volatility > 0.0 {
            analytics.risk_adjusted_return =
                analytics.total_return_pct / (analytics.volatility * 100.0);
        }
        analytics
    }

    pub fn report(&self) -> PnlReport {
        let cutoff = Utc::now() - ChronoDuration::hours(24);
        let recent_trades = self
            .trades
            .iter()
            .filter(|t| t.entry_time >= cutoff)
            .cloned()
            .collect();

        let mut pnl_by_symbol: HashMap<String, Decimal> = HashMap::new();
        let mut pnl_by_venue: HashMap<String, Decimal> = HashMap::new();
        for trade in self.trades.iter().filter(|t| t.is_closed) {
            let pnl = trade.realized_pnl.unwrap_or(Decimal::ZERO);
            *pnl_by_symbol.entry(trade.symbol.clone()).or_default() += pnl;
            *pnl_by_venue.entry(trade.venue.clone()).or_default() += pnl;
        }

        PnlReport {
            snapshot: self.current_snapshot(),
            analytics: self.analytics(),
            open_positions: self.open_positions(),
            recent_trades,
            pnl_by_symbol,
            pnl_by_venue,
        }
    }

    pub fn snapshots(&self) -> &[PnlSnapshot] {
        &self.snapshots
    }

    /// Records a snapshot when the cadence has elapsed and prunes history
    /// beyond the retention window.
    pub fn maybe_snapshot(&mut self) {
        let now = Utc::now();
        let due = now - self.last_snapshot_at
            >= ChronoDuration::minutes(self.config.snapshot_interval_minutes);
        if !due {
            return;
        }
        let snapshot = self.current_snapshot();
        self.snapshots.push(snapshot);
        self.last_snapshot_at = now;

        let cutoff = now - ChronoDuration::days(self.config.retention_days);
        self.snapshots.retain(|s| s.timestamp >= cutoff);
    }

    /// Forces a snapshot regardless of cadence.
    pub fn take_snapshot(&mut self) {
        let snapshot = self.current_snapshot();
        self.snapshots.push(snapshot);
        self.last_snapshot_at = Utc::now();
    }

    fn equity_curve(&self) -> Vec<f64> {
        let initial = self.initial_capital.to_f64().unwrap_or(0.0);
        self.snapshots
            .iter()
            .map(|s| initial + s.total_pnl.to_f64().unwrap_or(0.0))
            .collect()
    }

    fn daily_returns(&self) -> Vec<f64> {
        let curve = self.equity_curve();
        let mut returns = Vec::with_capacity(curve.len().saturating_sub(1));
        for window in curve.windows(2) {
            if window[0] > 0.0 {
                returns.push((window[1] - window[0]) / window[0]);
            }
        }
        returns
    }
}
