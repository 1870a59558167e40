use crate::application::market_data::CacheSnapshot;
use crate::application::pricing::SyntheticPricer;
use crate::config::{PricingConfig, TradingConfig};
use crate::domain::market::MarketKey;
use crate::domain::opportunity::{Leg, Opportunity, StrategyKind};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, error};

use super::{basis, cross_venue, funding_rate, spot_perp, statistical, volatility};

/// Detection throughput counters.
#[derive(Debug, Clone)]
pub struct DetectorMetrics {
    pub detection_cycles: u64,
    pub opportunities_detected: u64,
    pub total_expected_profit: f64,
    pub last_cycle_ms: f64,
    pub last_update: DateTime<Utc>,
}

impl Default for DetectorMetrics {
    fn default() -> Self {
        Self {
            detection_cycles: 0,
            opportunities_detected: 0,
            total_expected_profit: 0.0,
            last_cycle_ms: 0.0,
            last_update: Utc::now(),
        }
    }
}

/// Read-only inputs shared by every strategy on one cycle.
pub struct StrategyContext<'a> {
    pub snapshot: &'a CacheSnapshot,
    pub trading: &'a TradingConfig,
    pub pricer: &'a SyntheticPricer,
}

/// Runs the strategy family over a cache snapshot and unions the candidates.
///
/// Strategies never mutate the cache; a strategy that panics contributes zero
/// candidates while the others proceed.
pub struct OpportunityDetector {
    trading: TradingConfig,
    pricer: SyntheticPricer,
    metrics: Mutex<DetectorMetrics>,
}

impl OpportunityDetector {
    pub fn new(trading: TradingConfig, pricing: PricingConfig) -> Self {
        Self {
            trading,
            pricer: SyntheticPricer::new(pricing),
            metrics: Mutex::new(DetectorMetrics::default()),
        }
    }

    /// Applies hot-reloaded thresholds before the next cycle.
    pub fn update_config(&mut self, trading: TradingConfig, pricing: PricingConfig) {
        self.trading = trading;
        self.pricer = SyntheticPricer::new(pricing);
    }

    pub fn metrics(&self) -> DetectorMetrics {
        match self.metrics.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// One logical detection pass.
    pub fn detect(&self, snapshot: &CacheSnapshot) -> Vec<Opportunity> {
        let started = Instant::now();
        if snapshot.is_empty() {
            self.record_cycle(&[], started);
            return Vec::new();
        }

        let ctx = StrategyContext {
            snapshot,
            trading: &self.trading,
            pricer: &self.pricer,
        };

        let candidates: Vec<Opportunity> = StrategyKind::ALL
            .par_iter()
            .map(|kind| {
                let outcome =
                    std::panic::catch_unwind(AssertUnwindSafe(|| self.run_strategy(*kind, &ctx)));
                match outcome {
                    Ok(found) => found,
                    Err(_) => {
                        error!(
                            "OpportunityDetector: {} strategy panicked, contributing no candidates",
                            kind
                        );
                        Vec::new()
                    }
                }
            })
            .flatten()
            .collect();

        self.record_cycle(&candidates, started);
        debug!(
            "OpportunityDetector: cycle found {} candidates in {:.2}ms",
            candidates.len(),
            started.elapsed().as_secs_f64() * 1000.0
        );
        candidates
    }

    fn run_strategy(&self, kind: StrategyKind, ctx: &StrategyContext) -> Vec<Opportunity> {
        match kind {
            StrategyKind::SpotPerp => spot_perp::detect(ctx),
            StrategyKind::FundingRate => funding_rate::detect(ctx),
            StrategyKind::CrossVenue => cross_venue::detect(ctx),
            StrategyKind::Basis => basis::detect(ctx),
            StrategyKind::Volatility => volatility::detect(ctx),
            StrategyKind::Statistical => statistical::detect(ctx),
        }
    }

    fn record_cycle(&self, candidates: &[Opportunity], started: Instant) {
        let mut metrics = match self.metrics.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        metrics.detection_cycles += 1;
        metrics.opportunities_detected += candidates.len() as u64;
        metrics.total_expected_profit += candidates
            .iter()
            .map(|o| o.net_profit_usd.to_f64().unwrap_or(0.0).max(0.0))
            .sum::<f64>();
        metrics.last_cycle_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics.last_update = Utc::now();
    }
}

// --- helpers shared by the strategies ---

/// Trading fees across legs: 0.1% of notional per leg. Legs without a priced
/// quantity fall back to their capital share.
pub(super) fn transaction_costs(legs: &[Leg], required_capital: Decimal) -> Decimal {
    const FEE_RATE: f64 = 0.001;
    let fee = Decimal::from_f64(FEE_RATE).unwrap_or(Decimal::ZERO);
    legs.iter()
        .map(|leg| {
            let notional = leg.notional();
            let notional = if notional.is_zero() {
                required_capital * Decimal::from_f64(leg.weight).unwrap_or(Decimal::ZERO)
            } else {
                notional
            };
            notional * fee
        })
        .sum()
}

/// Slippage grows with the square root of size and shrinks with liquidity.
pub(super) fn slippage_cost(legs: &[Leg], required_capital: Decimal, liquidity_score: f64) -> Decimal {
    const BASE_SLIPPAGE: f64 = 0.0005;
    let liquidity_factor = 1.0 / liquidity_score.max(0.1);
    let mut total = 0.0;
    for leg in legs {
        let notional = leg
            .notional()
            .to_f64()
            .filter(|n| *n > 0.0)
            .unwrap_or_else(|| {
                (required_capital.to_f64().unwrap_or(0.0) * leg.weight).max(0.0)
            });
        let size_factor = (notional / 10_000.0).sqrt();
        total += notional * BASE_SLIPPAGE * liquidity_factor * size_factor;
    }
    Decimal::from_f64(total).unwrap_or(Decimal::ZERO)
}

/// Mean over legs of `min(1, 24h volume / $1M)`.
pub(super) fn liquidity_score(legs: &[Leg], snapshot: &CacheSnapshot) -> f64 {
    let mut total = 0.0;
    let mut counted = 0usize;
    for leg in legs {
        if let Some(quote) = snapshot.quote(&leg.key()) {
            let volume = quote.volume_24h.to_f64().unwrap_or(0.0);
            total += (volume / 1_000_000.0).min(1.0);
            counted += 1;
        }
    }
    if counted > 0 { total / counted as f64 } else { 0.0 }
}

/// Annualized realized volatility from cached history, with per-asset
/// fallbacks when the sample is thin.
pub(super) fn volatility_risk(symbol: &str, venue: &str, snapshot: &CacheSnapshot) -> f64 {
    let key = MarketKey::new(symbol, venue);
    if let Some(series) = snapshot.history(&key)
        && series.len() >= 30
        && let Some(vol) = series.realized_volatility(365.0)
    {
        return vol.clamp(0.0, 1.0);
    }
    if symbol.contains("BTC") {
        0.4
    } else if symbol.contains("ETH") {
        0.5
    } else {
        0.6
    }
}

/// Base confidence shaped by spread size: very large spreads look suspicious,
/// mid-sized spreads are the sweet spot.
pub(super) fn confidence_score(percentage_spread: f64) -> f64 {
    let mut confidence: f64 = 0.8;
    if percentage_spread > 1.0 {
        confidence *= 0.9;
    } else if percentage_spread > 0.5 {
        confidence *= 1.1;
    }
    confidence.clamp(0.0, 1.0)
}
