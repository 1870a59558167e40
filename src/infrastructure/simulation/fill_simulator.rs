use super::{LatencyModel, SlippageModel};
use crate::domain::execution::ExecutionPlan;
use crate::domain::ports::{ExecutionBridge, FillReport};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Simulated order router for paper trading.
///
/// Accepts plans over the execution bridge, waits out each order's planned
/// start plus modeled latency, fills at a slippage-adjusted price and
/// reports the fill back through a channel the caller wires into
/// `ArbitrageEngine::report_fill`.
pub struct SimulatedRouter {
    latency: Arc<dyn LatencyModel>,
    slippage: Arc<dyn SlippageModel>,
    fill_tx: mpsc::UnboundedSender<FillReport>,
}

impl SimulatedRouter {
    pub fn new(
        latency: Arc<dyn LatencyModel>,
        slippage: Arc<dyn SlippageModel>,
    ) -> (Self, mpsc::UnboundedReceiver<FillReport>) {
        let (fill_tx, fill_rx) = mpsc::unbounded_channel();
        (
            Self {
                latency,
                slippage,
                fill_tx,
            },
            fill_rx,
        )
    }
}

#[async_trait]
impl ExecutionBridge for SimulatedRouter {
    async fn submit_plan(&self, plan: &ExecutionPlan) -> Result<()> {
        info!(
            "SimulatedRouter: working plan {} ({} orders)",
            plan.plan_id,
            plan.orders.len()
        );

        for order in &plan.orders {
            let fill_tx = self.fill_tx.clone();
            let latency = self.latency.next_latency();
            let executed_price =
                self.slippage
                    .execution_price(order.target_price, order.quantity, order.side);
            let order_id = order.order_id.clone();
            let quantity = order.quantity;

            let schedule_delay = (order.planned_at - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);

            tokio::spawn(async move {
                tokio::time::sleep(schedule_delay + latency).await;
                debug!("SimulatedRouter: filling {order_id} at {executed_price}");
                let _ = fill_tx.send(FillReport {
                    order_id,
                    executed_price,
                    executed_quantity: quantity,
                    timestamp: Utc::now(),
                });
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::execution::ExecutionPlanner;
    use crate::application::ranking::OpportunityRanker;
    use crate::config::{RankingConfig, SizingConfig};
    use crate::domain::market::Side;
    use crate::domain::opportunity::{Leg, Opportunity, StrategyKind};
    use crate::infrastructure::simulation::{ZeroLatency, ZeroSlippage};
    use rust_decimal_macros::dec;

    fn test_plan() -> ExecutionPlan {
        let mut opp = Opportunity::new(StrategyKind::CrossVenue, "BTC-USDT");
        opp.required_capital = dec!(10000);
        opp.expected_profit_pct = 0.5;
        opp.confidence = 0.8;
        opp.risk_score = 0.3;
        opp.legs = vec![
            Leg::new("venue_a", "BTC-USDT", Side::Buy, dec!(0.1), dec!(43500), 0.5),
            Leg::new("venue_b", "BTC-USDT", Side::Sell, dec!(0.1), dec!(43520), 0.5),
        ];
        let ranked = OpportunityRanker::new(RankingConfig::default())
            .rank(vec![opp])
            .remove(0);
        ExecutionPlanner::new(SizingConfig::default()).create_plan(&ranked)
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_order_produces_a_fill() {
        let (router, mut fills) = SimulatedRouter::new(Arc::new(ZeroLatency), Arc::new(ZeroSlippage));
        let plan = test_plan();
        router.submit_plan(&plan).await.unwrap();

        let mut received = Vec::new();
        for _ in 0..plan.orders.len() {
            received.push(fills.recv().await.unwrap());
        }
        let mut expected: Vec<String> =
            plan.orders.iter().map(|o| o.order_id.clone()).collect();
        let mut got: Vec<String> = received.iter().map(|f| f.order_id.clone()).collect();
        expected.sort();
        got.sort();
        assert_eq!(expected, got);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_slippage_fills_at_target() {
        let (router, mut fills) = SimulatedRouter::new(Arc::new(ZeroLatency), Arc::new(ZeroSlippage));
        let plan = test_plan();
        router.submit_plan(&plan).await.unwrap();
        let fill = fills.recv().await.unwrap();
        let order = plan
            .orders
            .iter()
            .find(|o| o.order_id == fill.order_id)
            .unwrap();
        assert_eq!(fill.executed_price, order.target_price);
        assert_eq!(fill.executed_quantity, order.quantity);
    }
}
