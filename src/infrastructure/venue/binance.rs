use super::{Backoff, ReconnectPolicy, VenueAdapter};
use crate::config::VenueConfig;
use crate::domain::market::{ChannelKind, ConnectionState, Quote, Side, VenueEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::sync::{Mutex, RwLock, broadcast, mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

const VENUE: &str = "binance";
const EVENT_BUFFER: usize = 1_000;

/// Binance combined-stream websocket adapter.
///
/// Subscribes per symbol to `bookTicker` (best bid/ask), `aggTrade` and
/// `markPrice` (mark + funding), normalizes into `VenueEvent`s and reconnects
/// with exponential backoff when the stream drops.
pub struct BinanceAdapter {
    ws_url: String,
    policy: ReconnectPolicy,
    event_tx: broadcast::Sender<VenueEvent>,
    state: Arc<StdRwLock<ConnectionState>>,
    subscriptions: Arc<RwLock<HashSet<String>>>,
    shutdown_tx: watch::Sender<bool>,
    task_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BinanceAdapter {
    pub fn new(config: &VenueConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            ws_url: config.ws_url.clone(),
            policy: ReconnectPolicy::from(config),
            event_tx,
            state: Arc::new(StdRwLock::new(ConnectionState::Disconnected)),
            subscriptions: Arc::new(RwLock::new(HashSet::new())),
            shutdown_tx,
            task_handle: Mutex::new(None),
        }
    }

    fn stream_name(channel: ChannelKind, symbol: &str) -> String {
        let sym = symbol.replace('-', "").to_lowercase();
        match channel {
            ChannelKind::OrderBook | ChannelKind::Ticker => format!("{sym}@bookTicker"),
            ChannelKind::Trades => format!("{sym}@aggTrade"),
            ChannelKind::Funding | ChannelKind::MarkPrice => format!("{sym}@markPrice"),
        }
    }

    fn set_state(
        state: &Arc<StdRwLock<ConnectionState>>,
        event_tx: &broadcast::Sender<VenueEvent>,
        next: ConnectionState,
    ) {
        match state.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        let _ = event_tx.send(VenueEvent::ConnectionState {
            venue: VENUE.to_string(),
            state: next,
        });
    }

    async fn run_stream(
        ws_url: String,
        policy: ReconnectPolicy,
        subscriptions: Arc<RwLock<HashSet<String>>>,
        event_tx: broadcast::Sender<VenueEvent>,
        state: Arc<StdRwLock<ConnectionState>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut backoff = Backoff::new(policy);

        loop {
            if *shutdown.borrow() {
                break;
            }
            Self::set_state(&state, &event_tx, ConnectionState::Connecting);

            let streams: Vec<String> = subscriptions.read().await.iter().cloned().collect();
            match Self::connect_and_stream(&ws_url, &streams, &event_tx, &state, &mut shutdown)
                .await
            {
                Ok(_) => {
                    // Stream ended without error: either shutdown or a
                    // server-side close.
                    if *shutdown.borrow() {
                        break;
                    }
                    info!("BinanceAdapter: connection closed by server, reconnecting");
                    backoff.reset();
                }
                Err(e) => {
                    error!("BinanceAdapter: stream error: {e}");
                    Self::set_state(&state, &event_tx, ConnectionState::Error);
                }
            }

            Self::set_state(&state, &event_tx, ConnectionState::Reconnecting);
            match backoff.wait(&mut shutdown).await {
                Ok(true) => continue,
                Ok(false) => {
                    error!(
                        "BinanceAdapter: reconnect attempts exhausted after {} tries",
                        backoff.attempts()
                    );
                    break;
                }
                Err(_) => break,
            }
        }

        Self::set_state(&state, &event_tx, ConnectionState::Disconnected);
        info!("BinanceAdapter: stream task finished");
    }

    async fn connect_and_stream(
        ws_url: &str,
        streams: &[String],
        event_tx: &broadcast::Sender<VenueEvent>,
        state: &Arc<StdRwLock<ConnectionState>>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let url = url::Url::parse(&format!("{}/stream", ws_url.trim_end_matches('/')))
            .context("invalid websocket url")?;
        info!("BinanceAdapter: connecting to {url}");

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .context("failed to connect to Binance websocket")?;
        Self::set_state(state, event_tx, ConnectionState::Connected);
        info!("BinanceAdapter: connected");

        let (mut write, mut read) = ws_stream.split();

        // Writer task owns the sink; subscriptions and pongs go through a
        // channel so the read loop never blocks on the socket.
        let (ws_tx, mut ws_rx) = mpsc::channel::<Message>(100);
        tokio::spawn(async move {
            while let Some(msg) = ws_rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        if !streams.is_empty() {
            let subscribe = serde_json::json!({
                "method": "SUBSCRIBE",
                "params": streams,
                "id": chrono::Utc::now().timestamp_millis(),
            });
            ws_tx
                .send(Message::Text(subscribe.to_string().into()))
                .await
                .context("failed to send subscription")?;
            debug!("BinanceAdapter: subscribed to {} streams", streams.len());
        }

        let ping_tx = ws_tx.clone();
        tokio::spawn(async move {
            let mut ping_interval = tokio::time::interval(std::time::Duration::from_secs(180));
            loop {
                ping_interval.tick().await;
                if ping_tx.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = Self::handle_message(&text, event_tx)
                                && !text.contains("\"result\":null")
                            {
                                warn!("BinanceAdapter: unhandled message: {e}");
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = ws_tx.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("BinanceAdapter: server closed connection: {frame:?}");
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn handle_message(text: &str, event_tx: &broadcast::Sender<VenueEvent>) -> Result<()> {
        #[derive(serde::Deserialize)]
        struct StreamMessage {
            stream: String,
            data: serde_json::Value,
        }

        let msg: StreamMessage = serde_json::from_str(text)?;
        let data = msg.data;

        if msg.stream.ends_with("@bookTicker") {
            #[derive(serde::Deserialize)]
            struct BookTicker {
                #[serde(rename = "s")]
                symbol: String,
                #[serde(rename = "b")]
                bid: String,
                #[serde(rename = "a")]
                ask: String,
            }
            let tick: BookTicker = serde_json::from_value(data)?;
            let bid = Decimal::from_str(&tick.bid).unwrap_or(Decimal::ZERO);
            let ask = Decimal::from_str(&tick.ask).unwrap_or(Decimal::ZERO);
            let _ = event_tx.send(VenueEvent::Quote(Quote {
                symbol: normalize_symbol(&tick.symbol),
                venue: VENUE.to_string(),
                bid,
                ask,
                last: Decimal::ZERO,
                volume_24h: Decimal::ZERO,
                funding_rate: None,
                mark_price: None,
                timestamp: chrono::Utc::now().timestamp_millis(),
            }));
        } else if msg.stream.ends_with("@aggTrade") {
            #[derive(serde::Deserialize)]
            struct AggTrade {
                #[serde(rename = "s")]
                symbol: String,
                #[serde(rename = "p")]
                price: String,
                #[serde(rename = "q")]
                quantity: String,
                #[serde(rename = "m")]
                buyer_is_maker: bool,
                #[serde(rename = "T")]
                trade_time: i64,
            }
            let trade: AggTrade = serde_json::from_value(data)?;
            let _ = event_tx.send(VenueEvent::Trade {
                venue: VENUE.to_string(),
                symbol: normalize_symbol(&trade.symbol),
                price: Decimal::from_str(&trade.price).unwrap_or(Decimal::ZERO),
                quantity: Decimal::from_str(&trade.quantity).unwrap_or(Decimal::ZERO),
                side: if trade.buyer_is_maker {
                    Side::Sell
                } else {
                    Side::Buy
                },
                timestamp: trade.trade_time,
            });
        } else if msg.stream.ends_with("@markPrice") {
            #[derive(serde::Deserialize)]
            struct MarkPrice {
                #[serde(rename = "s")]
                symbol: String,
                #[serde(rename = "p")]
                mark: String,
                #[serde(rename = "r")]
                funding_rate: String,
                #[serde(rename = "E")]
                event_time: i64,
            }
            let mark: MarkPrice = serde_json::from_value(data)?;
            let symbol = format!("{}-PERP", normalize_symbol(&mark.symbol));
            let _ = event_tx.send(VenueEvent::Mark {
                venue: VENUE.to_string(),
                symbol: symbol.clone(),
                price: Decimal::from_str(&mark.mark).unwrap_or(Decimal::ZERO),
                timestamp: mark.event_time,
            });
            if let Ok(rate) = mark.funding_rate.parse::<f64>() {
                let _ = event_tx.send(VenueEvent::Funding {
                    venue: VENUE.to_string(),
                    symbol,
                    rate,
                    timestamp: mark.event_time,
                });
            }
        }

        Ok(())
    }
}

/// `BTCUSDT` -> `BTC-USDT` for the quote assets Binance actually lists.
fn normalize_symbol(raw: &str) -> String {
    for quote in ["USDT", "USDC", "BUSD", "BTC", "ETH"] {
        if let Some(base) = raw.strip_suffix(quote)
            && !base.is_empty()
        {
            return format!("{base}-{quote}");
        }
    }
    raw.to_string()
}

#[async_trait]
impl VenueAdapter for BinanceAdapter {
    fn venue(&self) -> &str {
        VENUE
    }

    async fn connect(&self) -> Result<()> {
        let mut handle_guard = self.task_handle.lock().await;
        if let Some(handle) = handle_guard.take() {
            debug!("BinanceAdapter: aborting previous stream task");
            handle.abort();
        }
        let _ = self.shutdown_tx.send(false);

        let handle = tokio::spawn(Self::run_stream(
            self.ws_url.clone(),
            self.policy.clone(),
            self.subscriptions.clone(),
            self.event_tx.clone(),
            self.state.clone(),
            self.shutdown_tx.subscribe(),
        ));
        *handle_guard = Some(handle);
        Ok(())
    }

    async fn disconnect(&self) {
        let _ = self.shutdown_tx.send(true);
        let mut handle_guard = self.task_handle.lock().await;
        if let Some(handle) = handle_guard.take() {
            // Cooperative: the stream loop observes the flag at its next
            // suspension point; abort only reclaims the task.
            let _ = tokio::time::timeout(std::time::Duration::from_millis(500), handle).await;
        }
        Self::set_state(&self.state, &self.event_tx, ConnectionState::Disconnected);
    }

    async fn subscribe(&self, channel: ChannelKind, symbol: &str) -> Result<()> {
        self.subscriptions
            .write()
            .await
            .insert(Self::stream_name(channel, symbol));
        Ok(())
    }

    async fn unsubscribe(&self, channel: ChannelKind, symbol: &str) -> Result<()> {
        self.subscriptions
            .write()
            .await
            .remove(&Self::stream_name(channel, symbol));
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<VenueEvent> {
        self.event_tx.subscribe()
    }

    fn connection_state(&self) -> ConnectionState {
        match self.state.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
