mod binance;
mod reconnect;

pub use binance::BinanceAdapter;
pub use reconnect::{Backoff, ReconnectPolicy};

use crate::domain::market::{ChannelKind, ConnectionState, VenueEvent};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// A market-data venue the engine can consume.
///
/// Adapters push normalized `VenueEvent`s into a broadcast channel; the
/// engine's ingestion task is the consumer. Connection lifecycle runs
/// Disconnected -> Connecting -> Connected, dropping to Reconnecting (with
/// exponential backoff) or Error on failure. Shutdown is cooperative: any
/// reconnect wait unblocks within one poll interval of the flag flipping.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn venue(&self) -> &str;

    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self);

    async fn subscribe(&self, channel: ChannelKind, symbol: &str) -> Result<()>;

    async fn unsubscribe(&self, channel: ChannelKind, symbol: &str) -> Result<()>;

    /// A fresh receiver on the adapter's event stream.
    fn events(&self) -> broadcast::Receiver<VenueEvent>;

    fn connection_state(&self) -> ConnectionState;
}
