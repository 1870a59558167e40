use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One observation in a price series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Milliseconds since epoch.
    pub timestamp: i64,
    pub price: f64,
}

/// Bounded FIFO ring of recent prices for one (symbol, venue) key.
///
/// Volatility estimation uses the 1,000-sample default; the portfolio equity
/// curve uses a 10,000-sample ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    capacity: usize,
    points: VecDeque<PricePoint>,
}

impl PriceSeries {
    pub const DEFAULT_CAPACITY: usize = 1_000;
    pub const EQUITY_CURVE_CAPACITY: usize = 10_000;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            points: VecDeque::with_capacity(capacity.min(1_024)),
        }
    }

    pub fn push(&mut self, timestamp: i64, price: f64) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(PricePoint { timestamp, price });
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<PricePoint> {
        self.points.back().copied()
    }

    /// Most recent `n` prices, oldest first.
    pub fn recent(&self, n: usize) -> Vec<f64> {
        let skip = self.points.len().saturating_sub(n);
        self.points.iter().skip(skip).map(|p| p.price).collect()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    /// Log returns of consecutive prices; zero and negative prices are skipped.
    pub fn log_returns(&self) -> Vec<f64> {
        let mut returns = Vec::with_capacity(self.points.len().saturating_sub(1));
        let mut prev: Option<f64> = None;
        for p in &self.points {
            if let Some(prior) = prev
                && prior > 0.0
                && p.price > 0.0
            {
                returns.push((p.price / prior).ln());
            }
            prev = Some(p.price);
        }
        returns
    }

    /// Sample standard deviation of log returns, scaled by
    /// `sqrt(periods_per_year)`. `None` with fewer than two returns.
    pub fn realized_volatility(&self, periods_per_year: f64) -> Option<f64> {
        let returns = self.log_returns();
        if returns.len() < 2 {
            return None;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / (returns.len() - 1) as f64;
        Some(variance.sqrt() * periods_per_year.sqrt())
    }
}

impl Default for PriceSeries {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_eviction() {
        let mut series = PriceSeries::new(3);
        for (i, price) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
            series.push(i as i64, *price);
        }
        assert_eq!(series.len(), 3);
        // Oldest (1.0) evicted first
        assert_eq!(series.prices(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_recent_returns_tail() {
        let mut series = PriceSeries::new(10);
        for i in 0..5 {
            series.push(i, 100.0 + i as f64);
        }
        assert_eq!(series.recent(2), vec![103.0, 104.0]);
        // Asking for more than stored returns everything
        assert_eq!(series.recent(100).len(), 5);
    }

    #[test]
    fn test_log_returns_skip_invalid() {
        let mut series = PriceSeries::new(10);
        series.push(0, 100.0);
        series.push(1, 0.0);
        series.push(2, 110.0);
        // 100 -> 0 and 0 -> 110 both skipped
        assert!(series.log_returns().is_empty());
    }

    #[test]
    fn test_realized_volatility_constant_prices() {
        let mut series = PriceSeries::new(100);
        for i in 0..50 {
            series.push(i, 100.0);
        }
        let vol = series.realized_volatility(365.0).unwrap();
        assert!(vol.abs() < 1e-12);
    }

    #[test]
    fn test_realized_volatility_needs_samples() {
        let mut series = PriceSeries::new(10);
        series.push(0, 100.0);
        series.push(1, 101.0);
        assert!(series.realized_volatility(365.0).is_none());
    }
}
