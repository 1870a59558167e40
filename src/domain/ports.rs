use crate::domain::execution::ExecutionPlan;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// A fill reported back from the order router.
#[derive(Debug, Clone)]
pub struct FillReport {
    pub order_id: String,
    pub executed_price: Decimal,
    pub executed_quantity: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Bridge from the core to a venue-specific order router. Routing itself is
/// outside the core; the engine only submits plans and consumes fills.
#[async_trait]
pub trait ExecutionBridge: Send + Sync {
    async fn submit_plan(&self, plan: &ExecutionPlan) -> Result<()>;
}
