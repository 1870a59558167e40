use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Cache key: one instrument on one venue.
///
/// Perpetual contracts use the `{symbol}-PERP` instrument convention, dated
/// futures `{symbol}-FUT`, so the spot and derivative books of the same
/// underlying coexist under distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketKey {
    pub symbol: String,
    pub venue: String,
}

impl MarketKey {
    pub fn new(symbol: impl Into<String>, venue: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            venue: venue.into(),
        }
    }

    pub fn perp(underlying: &str, venue: &str) -> Self {
        Self::new(format!("{underlying}-PERP"), venue)
    }

    pub fn future(underlying: &str, venue: &str) -> Self {
        Self::new(format!("{underlying}-FUT"), venue)
    }

    /// Underlying symbol with any derivative suffix stripped.
    pub fn underlying(&self) -> &str {
        self.symbol
            .strip_suffix("-PERP")
            .or_else(|| self.symbol.strip_suffix("-FUT"))
            .unwrap_or(&self.symbol)
    }

    pub fn is_perp(&self) -> bool {
        self.symbol.ends_with("-PERP")
    }

    pub fn is_future(&self) -> bool {
        self.symbol.ends_with("-FUT")
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.venue)
    }
}

/// Latest observation for one instrument on one venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub venue: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub volume_24h: Decimal,
    /// Current funding rate, only set for perpetual contracts.
    pub funding_rate: Option<f64>,
    /// Venue mark price, only set for derivatives.
    pub mark_price: Option<Decimal>,
    /// Venue observation time, milliseconds since epoch (wall clock, audit only).
    pub timestamp: i64,
}

impl Quote {
    pub fn key(&self) -> MarketKey {
        MarketKey::new(self.symbol.clone(), self.venue.clone())
    }

    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// A quote with bid, ask and last all present must satisfy
    /// `bid <= last <= ask`. Violations mark the quote unusable.
    pub fn is_crossed(&self) -> bool {
        if self.bid <= Decimal::ZERO || self.ask <= Decimal::ZERO || self.last <= Decimal::ZERO {
            return false;
        }
        self.last < self.bid || self.last > self.ask
    }

    /// Last trade price, falling back to mid when no trade has printed.
    pub fn reference_price(&self) -> Option<Decimal> {
        if self.last > Decimal::ZERO {
            Some(self.last)
        } else if self.bid > Decimal::ZERO && self.ask > Decimal::ZERO {
            Some(self.mid())
        } else {
            None
        }
    }
}

/// Venue connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Subscription channels a venue adapter can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    OrderBook,
    Trades,
    Ticker,
    Funding,
    MarkPrice,
}

/// Normalized event pushed by a venue adapter into the ingestion task.
#[derive(Debug, Clone)]
pub enum VenueEvent {
    Quote(Quote),
    Trade {
        venue: String,
        symbol: String,
        price: Decimal,
        quantity: Decimal,
        side: Side,
        timestamp: i64,
    },
    Funding {
        venue: String,
        symbol: String,
        rate: f64,
        timestamp: i64,
    },
    Mark {
        venue: String,
        symbol: String,
        price: Decimal,
        timestamp: i64,
    },
    ConnectionState {
        venue: String,
        state: ConnectionState,
    },
}
