use super::sizing::base_position_size;
use crate::application::ranking::RankedOpportunity;
use crate::config::SizingConfig;
use crate::domain::execution::{
    CostEstimate, ExecutionOrder, ExecutionPlan, PlanStatus, PlanValidation, TimingStrategy,
};
use crate::domain::market::Side;
use crate::domain::ports::FillReport;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::time::Duration;
use tracing::{info, warn};

/// Turns ranked opportunities into sized, priced, scheduled and
/// cost-estimated execution plans, and keeps plans current as fills arrive.
pub struct ExecutionPlanner {
    config: SizingConfig,
}

impl ExecutionPlanner {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    pub fn update_config(&mut self, config: SizingConfig) {
        self.config = config;
    }

    /// Builds a plan for one ranked opportunity. Validation failures produce
    /// a plan in `Failed` status rather than an error; the notes say why.
    pub fn create_plan(&self, ranked: &RankedOpportunity) -> ExecutionPlan {
        let opp = &ranked.opportunity;
        let created_at = Utc::now();
        let base_size = base_position_size(&self.config, opp, self.config.method);

        let mut orders = Vec::with_capacity(opp.legs.len());
        for (i, leg) in opp.legs.iter().enumerate() {
            let quantity = if leg.price > Decimal::ZERO {
                (base_size / leg.price).round_dp(8)
            } else {
                Decimal::ZERO
            };

            let slip = Decimal::from_f64(self.config.slippage_tolerance).unwrap_or(Decimal::ZERO);
            let stop = Decimal::from_f64(self.config.stop_loss_threshold).unwrap_or(Decimal::ZERO);
            let (limit_price, stop_price) = match leg.side {
                Side::Buy => (
                    leg.price * (Decimal::ONE + slip),
                    leg.price * (Decimal::ONE - stop),
                ),
                Side::Sell => (
                    leg.price * (Decimal::ONE - slip),
                    leg.price * (Decimal::ONE + stop),
                ),
            };

            orders.push(ExecutionOrder {
                order_id: ExecutionOrder::generate_id(),
                venue: leg.venue.clone(),
                instrument: leg.instrument.clone(),
                side: leg.side,
                quantity,
                target_price: leg.price,
                limit_price,
                stop_price,
                planned_at: created_at
                    + ChronoDuration::milliseconds((i as u64 * self.config.leg_stagger_ms) as i64),
                is_executed: false,
                executed_quantity: Decimal::ZERO,
                executed_price: None,
                executed_at: None,
            });
        }

        let mut plan = ExecutionPlan {
            plan_id: ExecutionPlan::generate_id(),
            opportunity: opp.clone(),
            orders,
            timing_strategy: TimingStrategy::OptimalDelay,
            sizing_strategy: self.config.method,
            max_total_capital: opp.required_capital,
            stop_loss_threshold: self.config.stop_loss_threshold,
            cost_estimate: CostEstimate::default(),
            validation: PlanValidation::passed(),
            status: PlanStatus::Planned,
            created_at,
            planned_start_at: None,
            completed_at: None,
            estimated_execution_time: Duration::from_millis(
                (opp.legs.len() as u64) * self.config.leg_stagger_ms.max(1) * 2,
            ),
            actual_profit: Decimal::ZERO,
            actual_cost: Decimal::ZERO,
            actual_slippage: Decimal::ZERO,
        };

        plan.cost_estimate = self.estimate_costs(&plan);
        plan.validation = self.validate_plan(&plan);

        if plan.validation.is_valid {
            plan.status = PlanStatus::Ready;
            info!(
                "ExecutionPlanner: plan {} ready ({} legs, base size ${})",
                plan.plan_id,
                plan.orders.len(),
                base_size
            );
        } else {
            plan.status = PlanStatus::Failed;
            warn!(
                "ExecutionPlanner: plan {} failed validation: {}",
                plan.plan_id,
                plan.validation.errors.join("; ")
            );
        }

        plan
    }

    /// Fees, market impact and slippage per order plus the opportunity cost
    /// of tying up the capital.
    fn estimate_costs(&self, plan: &ExecutionPlan) -> CostEstimate {
        const FEE_RATE: f64 = 0.001;
        let mut estimate = CostEstimate::default();

        for order in &plan.orders {
            let notional = order.notional().to_f64().unwrap_or(0.0);
            let fee = notional * FEE_RATE;
            // Impact scales toward 0.1% as the order approaches $1M.
            let impact_factor = (notional / 1_000_000.0).min(0.001);
            let impact = notional * impact_factor;
            let slippage = notional * self.config.slippage_tolerance;

            estimate.transaction_costs += Decimal::from_f64(fee).unwrap_or(Decimal::ZERO);
            estimate.market_impact += Decimal::from_f64(impact).unwrap_or(Decimal::ZERO);
            estimate.slippage += Decimal::from_f64(slippage).unwrap_or(Decimal::ZERO);
        }

        let profit_fraction = plan.opportunity.expected_profit_pct / 100.0;
        estimate.opportunity_cost = plan.max_total_capital
            * Decimal::from_f64(profit_fraction * 0.01).unwrap_or(Decimal::ZERO);

        estimate.total = estimate.transaction_costs
            + estimate.market_impact
            + estimate.slippage
            + estimate.opportunity_cost;
        estimate
    }

    /// Capital, risk and per-order sanity checks. Warnings discount the
    /// confidence multiplicatively; errors make the plan infeasible.
    fn validate_plan(&self, plan: &ExecutionPlan) -> PlanValidation {
        let mut validation = PlanValidation::passed();

        if plan.max_total_capital > self.config.max_single_trade_capital {
            validation
                .errors
                .push("Capital constraints violated".to_string());
        }

        for order in &plan.orders {
            if order.quantity <= Decimal::ZERO {
                validation
                    .errors
                    .push(format!("Invalid order quantity: {}", order.order_id));
            }
            if order.target_price <= Decimal::ZERO {
                validation
                    .errors
                    .push(format!("Invalid target price: {}", order.order_id));
            }
        }

        if plan.opportunity.expected_profit_pct < 0.1 {
            validation
                .warnings
                .push("Low expected profit margin".to_string());
            validation.confidence *= 0.8;
        }

        let window = Duration::from_millis(plan.orders.len() as u64 * 200);
        if window > Duration::from_millis(self.config.max_execution_window_ms) {
            validation
                .warnings
                .push("Execution window may be too long".to_string());
            validation.confidence *= 0.9;
        }

        validation.is_valid = validation.errors.is_empty();
        validation
    }

    /// Applies a fill to the plan. Partial fills spawn a remainder order when
    /// the residual notional is still worth working; otherwise the leg is
    /// considered done. A plan whose orders are all executed completes.
    pub fn handle_fill(&self, plan: &mut ExecutionPlan, fill: &FillReport) {
        let stagger = self.config.leg_stagger_ms;
        let min_size = self.config.min_position_size;

        let Some(order) = plan.order_mut(&fill.order_id) else {
            warn!(
                "ExecutionPlanner: fill for unknown order {} on plan {}",
                fill.order_id, plan.plan_id
            );
            return;
        };

        order.executed_quantity += fill.executed_quantity;
        order.executed_price = Some(fill.executed_price);
        order.executed_at = Some(fill.timestamp);

        let remaining = order.remaining();
        let remainder_notional = remaining * order.target_price;

        if remaining > Decimal::ZERO && remainder_notional >= min_size {
            // Work the residual as a fresh order.
            let mut remainder = order.clone();
            order.quantity = order.executed_quantity;
            order.is_executed = true;

            remainder.order_id = ExecutionOrder::generate_id();
            remainder.quantity = remaining;
            remainder.is_executed = false;
            remainder.executed_quantity = Decimal::ZERO;
            remainder.executed_price = None;
            remainder.executed_at = None;
            remainder.planned_at = Utc::now() + ChronoDuration::milliseconds(stagger as i64);

            info!(
                "ExecutionPlanner: partial fill on {}, remainder {} requeued as {}",
                fill.order_id, remaining, remainder.order_id
            );
            plan.orders.push(remainder);
            plan.status = PlanStatus::PartiallyFilled;
        } else {
            // Residual too small to chase; the leg is done.
            if remaining > Decimal::ZERO {
                order.quantity = order.executed_quantity;
            }
            order.is_executed = true;
            if plan.status == PlanStatus::Ready || plan.status == PlanStatus::Executing {
                plan.status = PlanStatus::Executing;
            }
        }

        if plan.is_complete() {
            plan.status = PlanStatus::Completed;
            plan.completed_at = Some(Utc::now());
            info!("ExecutionPlanner: plan {} completed", plan.plan_id);
        }
    }

    /// Emits plans for a ranked batch in rank order, staggered by the
    /// configured inter-plan delay, skipping any plan that would push
    /// cumulative capital over the utilization ceiling.
    pub fn optimize_sequence(&self, ranked: &[RankedOpportunity]) -> Vec<ExecutionPlan> {
        let ceiling = self.config.max_single_trade_capital
            * Decimal::from_f64(self.config.max_total_capital_utilization)
                .unwrap_or(Decimal::ONE);
        let mut plans = Vec::new();
        let mut capital_used = Decimal::ZERO;

        for entry in ranked {
            let required = entry.opportunity.required_capital;
            if capital_used + required > ceiling {
                warn!(
                    "ExecutionPlanner: capital ceiling reached, skipping {}",
                    entry.opportunity.id
                );
                continue;
            }

            let mut plan = self.create_plan(entry);
            if plan.status != PlanStatus::Ready {
                continue;
            }
            plan.planned_start_at = Some(
                Utc::now()
                    + ChronoDuration::milliseconds(
                        (plans.len() as u64 * self.config.inter_plan_delay_ms) as i64,
                    ),
            );
            capital_used += required;
            plans.push(plan);
        }

        info!(
            "ExecutionPlanner: sequenced {} plans, ${} capital committed",
            plans.len(),
            capital_used
        );
        plans
    }
}
