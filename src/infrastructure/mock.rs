use crate::domain::execution::ExecutionPlan;
use crate::domain::market::{ChannelKind, ConnectionState, Quote, VenueEvent};
use crate::domain::ports::ExecutionBridge;
use crate::infrastructure::venue::VenueAdapter;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::info;

/// In-memory venue adapter for tests and paper trading. Events are injected
/// by the test through the `publish_*` methods.
#[derive(Clone)]
pub struct MockVenueAdapter {
    venue: String,
    event_tx: broadcast::Sender<VenueEvent>,
    state: Arc<RwLock<ConnectionState>>,
    connect_failures: Arc<Mutex<u32>>,
}

impl MockVenueAdapter {
    pub fn new(venue: impl Into<String>) -> Self {
        let (event_tx, _) = broadcast::channel(1_000);
        Self {
            venue: venue.into(),
            event_tx,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            connect_failures: Arc::new(Mutex::new(0)),
        }
    }

    /// The next `n` connect calls will fail.
    pub fn fail_next_connects(&self, n: u32) {
        *self.connect_failures.lock().expect("mock lock") = n;
    }

    pub fn publish_quote(&self, quote: Quote) {
        let _ = self.event_tx.send(VenueEvent::Quote(quote));
    }

    pub fn publish_funding(&self, symbol: &str, rate: f64, timestamp: i64) {
        let _ = self.event_tx.send(VenueEvent::Funding {
            venue: self.venue.clone(),
            symbol: symbol.to_string(),
            rate,
            timestamp,
        });
    }

    pub fn publish_state(&self, state: ConnectionState) {
        *self.state.write().expect("mock lock") = state;
        let _ = self.event_tx.send(VenueEvent::ConnectionState {
            venue: self.venue.clone(),
            state,
        });
    }
}

#[async_trait]
impl VenueAdapter for MockVenueAdapter {
    fn venue(&self) -> &str {
        &self.venue
    }

    async fn connect(&self) -> Result<()> {
        {
            let mut failures = self.connect_failures.lock().expect("mock lock");
            if *failures > 0 {
                *failures -= 1;
                self.publish_state(ConnectionState::Error);
                anyhow::bail!("simulated connect failure");
            }
        }
        self.publish_state(ConnectionState::Connected);
        Ok(())
    }

    async fn disconnect(&self) {
        self.publish_state(ConnectionState::Disconnected);
    }

    async fn subscribe(&self, _channel: ChannelKind, _symbol: &str) -> Result<()> {
        Ok(())
    }

    async fn unsubscribe(&self, _channel: ChannelKind, _symbol: &str) -> Result<()> {
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<VenueEvent> {
        self.event_tx.subscribe()
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.read().expect("mock lock")
    }
}

/// Records submitted plans instead of routing them. The paper-trading runner
/// and the integration tests both sit on this bridge.
#[derive(Clone, Default)]
pub struct MockExecutionBridge {
    submitted: Arc<Mutex<Vec<ExecutionPlan>>>,
}

impl MockExecutionBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted_plans(&self) -> Vec<ExecutionPlan> {
        self.submitted.lock().expect("mock lock").clone()
    }
}

#[async_trait]
impl ExecutionBridge for MockExecutionBridge {
    async fn submit_plan(&self, plan: &ExecutionPlan) -> Result<()> {
        info!(
            "MockExecutionBridge: accepted plan {} ({} orders)",
            plan.plan_id,
            plan.orders.len()
        );
        self.submitted.lock().expect("mock lock").push(plan.clone());
        Ok(())
    }
}
