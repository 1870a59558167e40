use crate::domain::errors::EngineError;
use crate::domain::market::{MarketKey, PriceSeries, Quote};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

struct CachedQuote {
    quote: Quote,
    received: Instant,
}

/// Latest quote and bounded price history per (symbol, venue) key.
///
/// Readers never block on writers beyond the lock hand-off: quotes are
/// replaced wholesale under the write guard, so a reader sees either the
/// previous or the new quote, never a partial update. Writers serialize per
/// map; applying the same batch twice leaves the cache byte-identical.
pub struct MarketDataCache {
    quotes: RwLock<HashMap<MarketKey, CachedQuote>>,
    history: RwLock<HashMap<MarketKey, PriceSeries>>,
    staleness_window: Duration,
    history_capacity: usize,
}

impl std::fmt::Debug for MarketDataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataCache")
            .field("staleness_window", &self.staleness_window)
            .finish()
    }
}

impl MarketDataCache {
    pub fn new(staleness_window: Duration) -> Self {
        Self {
            quotes: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            staleness_window,
            history_capacity: PriceSeries::DEFAULT_CAPACITY,
        }
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn staleness_window(&self) -> Duration {
        self.staleness_window
    }

    /// Replaces the cached quote for each key in the batch and appends the
    /// reference price to that key's history.
    pub fn update(&self, batch: impl IntoIterator<Item = Quote>) {
        for quote in batch {
            if quote.is_crossed() {
                tracing::warn!(
                    "MarketDataCache: crossed quote for {} dropped (bid={} last={} ask={})",
                    quote.key(),
                    quote.bid,
                    quote.last,
                    quote.ask
                );
                continue;
            }
            let key = quote.key();
            if let Some(price) = quote.reference_price() {
                self.update_price_history(&key, price.to_f64().unwrap_or(0.0), quote.timestamp);
            }
            let mut quotes = match self.quotes.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            quotes.insert(
                key,
                CachedQuote {
                    quote,
                    received: Instant::now(),
                },
            );
        }
    }

    /// Merges a funding-rate update into the cached perp quote.
    pub fn apply_funding(&self, venue: &str, symbol: &str, rate: f64, timestamp: i64) {
        let key = MarketKey::new(symbol, venue);
        let mut quotes = match self.quotes.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(entry) = quotes.get_mut(&key) {
            entry.quote.funding_rate = Some(rate);
            entry.quote.timestamp = entry.quote.timestamp.max(timestamp);
            entry.received = Instant::now();
        } else {
            // Funding can arrive before the first ticker; hold it on a bare quote.
            quotes.insert(
                key,
                CachedQuote {
                    quote: Quote {
                        symbol: symbol.to_string(),
                        venue: venue.to_string(),
                        bid: Decimal::ZERO,
                        ask: Decimal::ZERO,
                        last: Decimal::ZERO,
                        volume_24h: Decimal::ZERO,
                        funding_rate: Some(rate),
                        mark_price: None,
                        timestamp,
                    },
                    received: Instant::now(),
                },
            );
        }
    }

    /// Merges a mark-price update into the cached quote.
    pub fn apply_mark(&self, venue: &str, symbol: &str, price: Decimal, timestamp: i64) {
        let key = MarketKey::new(symbol, venue);
        let mut quotes = match self.quotes.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(entry) = quotes.get_mut(&key) {
            entry.quote.mark_price = Some(price);
            entry.quote.timestamp = entry.quote.timestamp.max(timestamp);
            entry.received = Instant::now();
        }
    }

    /// The cached quote for a key; stale or missing quotes are errors.
    pub fn get_quote(&self, symbol: &str, venue: &str) -> Result<Quote, EngineError> {
        let key = MarketKey::new(symbol, venue);
        let quotes = match self.quotes.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = quotes.get(&key).ok_or_else(|| EngineError::QuoteMissing {
            symbol: symbol.to_string(),
            venue: venue.to_string(),
        })?;
        let age = entry.received.elapsed();
        if age > self.staleness_window {
            return Err(EngineError::QuoteStale {
                symbol: symbol.to_string(),
                venue: venue.to_string(),
                age_ms: age.as_millis() as u64,
                window_ms: self.staleness_window.as_millis() as u64,
            });
        }
        Ok(entry.quote.clone())
    }

    pub fn get_spot(&self, symbol: &str, venue: &str) -> Option<Decimal> {
        self.get_quote(symbol, venue)
            .ok()
            .and_then(|q| q.reference_price())
    }

    pub fn get_perp(&self, symbol: &str, venue: &str) -> Option<Decimal> {
        let perp_symbol = format!("{symbol}-PERP");
        self.get_quote(&perp_symbol, venue)
            .ok()
            .and_then(|q| q.reference_price().or(q.mark_price))
    }

    pub fn get_funding(&self, symbol: &str, venue: &str) -> Option<f64> {
        let perp_symbol = format!("{symbol}-PERP");
        self.get_quote(&perp_symbol, venue)
            .ok()
            .and_then(|q| q.funding_rate)
    }

    pub fn update_price_history(&self, key: &MarketKey, price: f64, timestamp: i64) {
        if price <= 0.0 {
            return;
        }
        let mut history = match self.history.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        history
            .entry(key.clone())
            .or_insert_with(|| PriceSeries::new(self.history_capacity))
            .push(timestamp, price);
    }

    /// Most recent `n` prices for a key, oldest first.
    pub fn recent_prices(&self, key: &MarketKey, n: usize) -> Vec<f64> {
        let history = match self.history.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        history.get(key).map(|s| s.recent(n)).unwrap_or_default()
    }

    /// An immutable copy of all fresh quotes and their histories. Detection
    /// runs entirely against snapshots, so strategies cannot mutate the cache
    /// and identical snapshots produce identical candidate sets.
    pub fn snapshot(&self) -> CacheSnapshot {
        let quotes = match self.quotes.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let fresh: HashMap<MarketKey, Quote> = quotes
            .iter()
            .filter(|(_, entry)| entry.received.elapsed() <= self.staleness_window)
            .map(|(key, entry)| (key.clone(), entry.quote.clone()))
            .collect();
        drop(quotes);

        let history = match self.history.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let histories = history
            .iter()
            .filter(|(key, _)| fresh.contains_key(key))
            .map(|(key, series)| (key.clone(), series.clone()))
            .collect();

        CacheSnapshot {
            quotes: fresh,
            histories,
            taken_at: Instant::now(),
        }
    }
}

/// Immutable view of the cache at one instant.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    pub quotes: HashMap<MarketKey, Quote>,
    pub histories: HashMap<MarketKey, PriceSeries>,
    pub taken_at: Instant,
}

impl CacheSnapshot {
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn quote(&self, key: &MarketKey) -> Option<&Quote> {
        self.quotes.get(key)
    }

    pub fn contains(&self, key: &MarketKey) -> bool {
        self.quotes.contains_key(key)
    }

    pub fn spot(&self, symbol: &str, venue: &str) -> Option<Decimal> {
        self.quotes
            .get(&MarketKey::new(symbol, venue))
            .and_then(|q| q.reference_price())
    }

    pub fn perp(&self, symbol: &str, venue: &str) -> Option<Decimal> {
        self.quotes
            .get(&MarketKey::perp(symbol, venue))
            .and_then(|q| q.reference_price().or(q.mark_price))
    }

    pub fn funding(&self, symbol: &str, venue: &str) -> Option<f64> {
        self.quotes
            .get(&MarketKey::perp(symbol, venue))
            .and_then(|q| q.funding_rate)
    }

    pub fn history(&self, key: &MarketKey) -> Option<&PriceSeries> {
        self.histories.get(key)
    }

    /// Distinct underlying symbols present in the snapshot.
    pub fn underlyings(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .quotes
            .keys()
            .map(|k| k.underlying().to_string())
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    /// Venues quoting the exact instrument symbol, with the quote.
    pub fn venues_for(&self, symbol: &str) -> Vec<(&str, &Quote)> {
        let mut venues: Vec<(&str, &Quote)> = self
            .quotes
            .iter()
            .filter(|(key, _)| key.symbol == symbol)
            .map(|(key, quote)| (key.venue.as_str(), quote))
            .collect();
        venues.sort_by(|a, b| a.0.cmp(b.0));
        venues
    }
}
