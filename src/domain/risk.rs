use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Snapshot of portfolio-level risk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Monte Carlo VaR at the configured confidence, in USD.
    pub portfolio_var: f64,
    /// Mean loss of the tail beyond VaR, in USD.
    pub expected_shortfall: f64,
    pub total_exposure: Decimal,
    pub leveraged_exposure: Decimal,
    /// Largest single-symbol exposure share, in [0, 1].
    pub concentration_risk: f64,
    pub correlation_risk: f64,
    pub liquidity_risk: f64,
    /// Share of exposure carrying funding-rate sensitivity.
    pub funding_rate_risk: f64,
    pub max_drawdown: f64,
    pub timestamp: DateTime<Utc>,
    pub is_valid: bool,
}

impl Default for RiskMetrics {
    fn default() -> Self {
        Self {
            portfolio_var: 0.0,
            expected_shortfall: 0.0,
            total_exposure: Decimal::ZERO,
            leveraged_exposure: Decimal::ZERO,
            concentration_risk: 0.0,
            correlation_risk: 0.0,
            liquidity_risk: 0.0,
            funding_rate_risk: 0.0,
            max_drawdown: 0.0,
            timestamp: Utc::now(),
            is_valid: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertSeverity::Info => "INFO",
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    VarBreach,
    LeverageBreach,
    ConcentrationBreach,
    LiquidityRisk,
    CorrelationRisk,
    FundingRisk,
    ExecutionCostHigh,
}

/// A limit crossing reported by the risk monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAlert {
    pub severity: AlertSeverity,
    pub kind: AlertKind,
    pub message: String,
    pub current_value: f64,
    pub limit_value: f64,
    pub position_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RiskAlert {
    pub fn new(
        severity: AlertSeverity,
        kind: AlertKind,
        message: impl Into<String>,
        current_value: f64,
        limit_value: f64,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            current_value,
            limit_value,
            position_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn for_position(mut self, position_id: impl Into<String>) -> Self {
        self.position_id = Some(position_id.into());
        self
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.timestamp);
        age.num_milliseconds() > ttl.as_millis() as i64
    }
}

/// Portfolio risk limits with warning and critical multipliers.
#[derive(Debug, Clone)]
pub struct RiskLimits {
    pub max_portfolio_var: f64,
    pub max_leverage: f64,
    pub max_concentration: f64,
    pub max_correlation: f64,
    pub liquidity_threshold: f64,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_portfolio_var: 0.02,
            max_leverage: 3.0,
            max_concentration: 0.25,
            max_correlation: 0.8,
            liquidity_threshold: 0.3,
            warning_threshold: 0.8,
            critical_threshold: 0.95,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_expiry() {
        let alert = RiskAlert::new(
            AlertSeverity::Warning,
            AlertKind::VarBreach,
            "Portfolio VaR approaching limit",
            0.018,
            0.02,
        );
        let ttl = Duration::from_secs(30 * 60);
        assert!(!alert.is_expired(ttl, Utc::now()));
        let later = Utc::now() + chrono::Duration::minutes(31);
        assert!(alert.is_expired(ttl, later));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Critical > AlertSeverity::Warning);
        assert!(AlertSeverity::Warning > AlertSeverity::Info);
    }
}
