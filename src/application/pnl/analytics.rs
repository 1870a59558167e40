use serde::{Deserialize, Serialize};

const TRADING_DAYS: f64 = 252.0;

/// Portfolio performance statistics derived from the snapshot history and
/// closed trades.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceAnalytics {
    pub total_return_pct: f64,
    pub annualized_return_pct: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Annualized standard deviation of daily returns.
    pub volatility: f64,
    /// Historical VaR at 95%, as a positive percent of equity.
    pub var_95: f64,
    pub expected_shortfall: f64,
    pub max_drawdown_pct: f64,
    pub total_trades: usize,
    pub win_rate_pct: f64,
    pub average_win: f64,
    pub average_loss: f64,
    pub profit_factor: f64,
    pub capital_efficiency: f64,
    pub risk_adjusted_return: f64,
}

pub(super) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(super) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Annualized Sharpe over daily returns against a daily risk-free rate.
pub(super) fn sharpe_ratio(daily_returns: &[f64], annual_risk_free: f64) -> f64 {
    if daily_returns.is_empty() {
        return 0.0;
    }
    let excess = mean(daily_returns) - annual_risk_free / TRADING_DAYS;
    let sd = std_dev(daily_returns);
    if sd > 0.0 {
        (excess / sd) * TRADING_DAYS.sqrt()
    } else {
        0.0
    }
}

/// Sortino: like Sharpe but only downside deviation penalizes.
pub(super) fn sortino_ratio(daily_returns: &[f64], annual_risk_free: f64) -> f64 {
    if daily_returns.is_empty() {
        return 0.0;
    }
    let target = annual_risk_free / TRADING_DAYS;
    let downside: Vec<f64> = daily_returns
        .iter()
        .filter(|r| **r < target)
        .map(|r| (r - target).powi(2))
        .collect();
    if downside.is_empty() {
        return 0.0;
    }
    let downside_dev = (downside.iter().sum::<f64>() / daily_returns.len() as f64).sqrt();
    if downside_dev > 0.0 {
        ((mean(daily_returns) - target) / downside_dev) * TRADING_DAYS.sqrt()
    } else {
        0.0
    }
}

pub(super) fn annualized_volatility(daily_returns: &[f64]) -> f64 {
    std_dev(daily_returns) * TRADING_DAYS.sqrt()
}

/// Historical VaR of the return sample, reported as a positive percent.
pub(super) fn value_at_risk(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let index =
        (((1.0 - confidence) * sorted.len() as f64) as usize).min(sorted.len() - 1);
    (-sorted[index]).max(0.0) * 100.0
}

/// Mean loss of the tail at and beyond the VaR cutoff, positive percent.
pub(super) fn expected_shortfall(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let cutoff =
        (((1.0 - confidence) * sorted.len() as f64) as usize).min(sorted.len() - 1);
    let tail = &sorted[..=cutoff];
    (-mean(tail)).max(0.0) * 100.0
}

/// Largest peak-to-trough loss of the equity curve, in percent.
pub(super) fn max_drawdown_pct(equity_curve: &[f64]) -> f64 {
    if equity_curve.is_empty() {
        return 0.0;
    }
    let mut peak = equity_curve[0];
    let mut max_dd = 0.0;
    for equity in equity_curve {
        if *equity > peak {
            peak = *equity;
        } else if peak > 0.0 {
            max_dd = f64::max(max_dd, (peak - equity) / peak);
        }
    }
    max_dd * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sharpe_positive_for_steady_gains() {
        let returns = vec![0.01, 0.012, 0.008, 0.011, 0.009];
        assert!(sharpe_ratio(&returns, 0.05) > 1.0);
    }

    #[test]
    fn test_sharpe_zero_on_constant_returns() {
        let returns = vec![0.01; 10];
        assert_eq!(sharpe_ratio(&returns, 0.05), 0.0);
    }

    #[test]
    fn test_sortino_ignores_upside_noise() {
        // Same mean, one series with upside-only dispersion
        let upside = vec![0.001, 0.05, 0.001, 0.06, 0.001];
        let downside = vec![0.03, -0.02, 0.04, -0.03, 0.0024];
        assert!(sortino_ratio(&upside, 0.0) >= sortino_ratio(&downside, 0.0));
    }

    #[test]
    fn test_max_drawdown() {
        let curve = vec![100.0, 120.0, 90.0, 110.0, 95.0];
        // Peak 120 -> trough 90 = 25%
        assert!((max_drawdown_pct(&curve) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_var_and_es_ordering() {
        let returns = vec![
            -0.05, -0.02, -0.01, 0.0, 0.005, 0.01, 0.012, 0.02, 0.03, 0.04,
            -0.03, 0.015, 0.007, -0.008, 0.018, 0.022, -0.004, 0.009, 0.013, 0.001,
        ];
        let var = value_at_risk(&returns, 0.95);
        let es = expected_shortfall(&returns, 0.95);
        assert!(var > 0.0);
        assert!(es >= var);
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(sharpe_ratio(&[], 0.05), 0.0);
        assert_eq!(value_at_risk(&[], 0.95), 0.0);
        assert_eq!(max_drawdown_pct(&[]), 0.0);
    }
}
