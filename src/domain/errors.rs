use rust_decimal::Decimal;
use thiserror::Error;

/// Risk limit categories used by `EngineError::RiskLimitBreach`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskBreachKind {
    PositionSize,
    Leverage,
    Concentration,
    Correlation,
    Var,
}

impl std::fmt::Display for RiskBreachKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskBreachKind::PositionSize => write!(f, "position size"),
            RiskBreachKind::Leverage => write!(f, "leverage"),
            RiskBreachKind::Concentration => write!(f, "concentration"),
            RiskBreachKind::Correlation => write!(f, "correlation"),
            RiskBreachKind::Var => write!(f, "portfolio VaR"),
        }
    }
}

/// Errors surfaced by the detection-to-execution pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {key} = {value} ({reason})")]
    ConfigInvalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Quote stale for {symbol}@{venue}: age {age_ms}ms > window {window_ms}ms")]
    QuoteStale {
        symbol: String,
        venue: String,
        age_ms: u64,
        window_ms: u64,
    },

    #[error("Quote missing for {symbol}@{venue}")]
    QuoteMissing { symbol: String, venue: String },

    #[error("Pricing model unavailable: {reason}")]
    ModelUnavailable { reason: String },

    #[error("Validation rejected: {reasons}")]
    ValidationRejected { reasons: String },

    #[error("Insufficient capital: need ${need}, available ${available}")]
    CapitalInsufficient { need: Decimal, available: Decimal },

    #[error("Risk limit breach ({kind}): {current:.4} > {limit:.4}")]
    RiskLimitBreach {
        kind: RiskBreachKind,
        current: f64,
        limit: f64,
    },

    #[error("Position not found: {position_id}")]
    PositionNotFound { position_id: String },

    #[error("Execution plan infeasible: {reason}")]
    PlanInfeasible { reason: String },

    #[error("Venue disconnected: {venue}")]
    VenueDisconnected { venue: String },

    #[error("Shutdown requested")]
    ShutdownRequested,
}
