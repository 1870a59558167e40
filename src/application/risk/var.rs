use crate::domain::market::{MarketKey, PriceSeries};
use crate::domain::position::Position;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use statrs::distribution::{ContinuousCDF, Normal};
use std::collections::HashMap;

/// Volatility assumed when a position has too little price history.
const FALLBACK_VOLATILITY: f64 = 0.02;
const MIN_HISTORY: usize = 30;

/// Monte Carlo portfolio VaR and expected shortfall.
///
/// Each simulation draws one normal return per position, scaled by that
/// position's sample volatility from cached history, and sums the notional
/// P&L. VaR is the loss at the configured confidence quantile; expected
/// shortfall averages the tail beyond it.
pub struct MonteCarloVar {
    pub confidence: f64,
    pub simulations: usize,
}

impl MonteCarloVar {
    pub fn new(confidence: f64, simulations: usize) -> Self {
        Self {
            confidence,
            simulations: simulations.max(1),
        }
    }

    /// `(VaR, expected shortfall)` in USD, both non-negative.
    pub fn portfolio_var(
        &self,
        positions: &[Position],
        history: &HashMap<MarketKey, PriceSeries>,
    ) -> (f64, f64) {
        if positions.is_empty() {
            return (0.0, 0.0);
        }

        let volatilities: Vec<(f64, f64)> = positions
            .iter()
            .map(|p| {
                let key = MarketKey::new(p.symbol.clone(), p.venue.clone());
                let vol = history
                    .get(&key)
                    .filter(|series| series.len() >= MIN_HISTORY)
                    .and_then(|series| series.realized_volatility(1.0))
                    .filter(|v| *v > 0.0)
                    .unwrap_or(FALLBACK_VOLATILITY);
                (p.notional().to_f64().unwrap_or(0.0), vol)
            })
            .collect();

        let normal = match Normal::new(0.0, 1.0) {
            Ok(n) => n,
            Err(_) => return (0.0, 0.0),
        };
        let mut rng = rand::rng();
        let mut outcomes = Vec::with_capacity(self.simulations);

        for _ in 0..self.simulations {
            let mut portfolio_return = 0.0;
            for (notional, vol) in &volatilities {
                let u: f64 = rng.random_range(f64::EPSILON..1.0);
                let z = normal.inverse_cdf(u);
                portfolio_return += z * vol * notional;
            }
            outcomes.push(portfolio_return);
        }

        outcomes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let tail_len = (((1.0 - self.confidence) * outcomes.len() as f64) as usize)
            .clamp(1, outcomes.len());
        let var = outcomes[tail_len - 1].abs();
        let shortfall =
            outcomes[..tail_len].iter().sum::<f64>().abs() / tail_len as f64;

        (var, shortfall.max(var))
    }
}
