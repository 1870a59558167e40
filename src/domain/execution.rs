use crate::domain::market::Side;
use crate::domain::opportunity::Opportunity;
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// When the legs of a plan are released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimingStrategy {
    Immediate,
    #[default]
    OptimalDelay,
    MarketConditionBased,
    LiquidityBased,
}

/// How the base position size of a plan is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizingStrategy {
    Fixed,
    FixedPercent,
    #[default]
    Kelly,
    VolatilityAdjusted,
    LiquidityConstrained,
    RiskParity,
    MaxDrawdownLimit,
}

impl FromStr for SizingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(SizingStrategy::Fixed),
            "fixed_percent" => Ok(SizingStrategy::FixedPercent),
            "kelly" => Ok(SizingStrategy::Kelly),
            "volatility_adjusted" => Ok(SizingStrategy::VolatilityAdjusted),
            "liquidity_constrained" => Ok(SizingStrategy::LiquidityConstrained),
            "risk_parity" => Ok(SizingStrategy::RiskParity),
            "max_drawdown_limit" => Ok(SizingStrategy::MaxDrawdownLimit),
            other => Err(format!("unknown sizing method: {other}")),
        }
    }
}

/// Lifecycle of an execution plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStatus {
    Planned,
    Ready,
    Executing,
    PartiallyFilled,
    Completed,
    Cancelled,
    Failed,
}

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::Cancelled | PlanStatus::Failed
        )
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanStatus::Planned => "planned",
            PlanStatus::Ready => "ready",
            PlanStatus::Executing => "executing",
            PlanStatus::PartiallyFilled => "partially_filled",
            PlanStatus::Completed => "completed",
            PlanStatus::Cancelled => "cancelled",
            PlanStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One sized, priced and scheduled order of a plan.
#[derive(Debug, Clone)]
pub struct ExecutionOrder {
    pub order_id: String,
    pub venue: String,
    pub instrument: String,
    pub side: Side,
    pub quantity: Decimal,
    pub target_price: Decimal,
    pub limit_price: Decimal,
    pub stop_price: Decimal,
    pub planned_at: DateTime<Utc>,

    pub is_executed: bool,
    pub executed_quantity: Decimal,
    pub executed_price: Option<Decimal>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl ExecutionOrder {
    pub fn generate_id() -> String {
        format!("ORD_{}", uuid::Uuid::new_v4())
    }

    pub fn notional(&self) -> Decimal {
        self.quantity * self.target_price
    }

    pub fn remaining(&self) -> Decimal {
        (self.quantity - self.executed_quantity).max(Decimal::ZERO)
    }
}

/// Estimated total cost of executing a plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostEstimate {
    pub transaction_costs: Decimal,
    pub market_impact: Decimal,
    pub slippage: Decimal,
    pub opportunity_cost: Decimal,
    pub total: Decimal,
}

/// Outcome of plan validation. Warnings discount confidence without
/// invalidating the plan; errors make it infeasible.
#[derive(Debug, Clone)]
pub struct PlanValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub confidence: f64,
}

impl PlanValidation {
    pub fn passed() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            confidence: 1.0,
        }
    }
}

/// A complete sized and timed plan for one ranked opportunity.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub plan_id: String,
    pub opportunity: Opportunity,
    pub orders: Vec<ExecutionOrder>,

    pub timing_strategy: TimingStrategy,
    pub sizing_strategy: SizingStrategy,

    pub max_total_capital: Decimal,
    pub stop_loss_threshold: f64,

    pub cost_estimate: CostEstimate,
    pub validation: PlanValidation,
    pub status: PlanStatus,

    pub created_at: DateTime<Utc>,
    pub planned_start_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_execution_time: Duration,

    // Post-trade metrics, filled as fills arrive.
    pub actual_profit: Decimal,
    pub actual_cost: Decimal,
    pub actual_slippage: Decimal,
}

impl ExecutionPlan {
    pub fn generate_id() -> String {
        let suffix: u32 = rand::rng().random_range(100_000..1_000_000);
        format!("PLAN_{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), suffix)
    }

    pub fn is_complete(&self) -> bool {
        !self.orders.is_empty() && self.orders.iter().all(|o| o.is_executed)
    }

    pub fn order_mut(&mut self, order_id: &str) -> Option<&mut ExecutionOrder> {
        self.orders.iter_mut().find(|o| o.order_id == order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizing_strategy_parsing() {
        assert_eq!(
            "kelly".parse::<SizingStrategy>().unwrap(),
            SizingStrategy::Kelly
        );
        assert_eq!(
            "risk_parity".parse::<SizingStrategy>().unwrap(),
            SizingStrategy::RiskParity
        );
        assert!("martingale".parse::<SizingStrategy>().is_err());
    }

    #[test]
    fn test_plan_status_terminal() {
        assert!(PlanStatus::Completed.is_terminal());
        assert!(PlanStatus::Failed.is_terminal());
        assert!(!PlanStatus::PartiallyFilled.is_terminal());
        assert!(!PlanStatus::Ready.is_terminal());
    }

    #[test]
    fn test_plan_id_format() {
        let id = ExecutionPlan::generate_id();
        assert!(id.starts_with("PLAN_"));
        assert_eq!(id.split('_').count(), 4);
    }
}
