use crate::application::market_data::CacheSnapshot;
use crate::application::pricing::option_model::{OptionInputs, black_scholes};
use crate::config::PricingConfig;
use crate::domain::errors::EngineError;
use crate::domain::pricing::{PriceComponents, PricingModel, SyntheticPrice};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use tracing::debug;

const DAYS_PER_YEAR: f64 = 365.25;

/// Derives fair values for derivatives from spot, funding and carry inputs.
///
/// Confidence reflects input coverage: a price built from every required
/// input scores 0.95, each missing input reduces the score proportionally.
pub struct SyntheticPricer {
    config: PricingConfig,
}

impl SyntheticPricer {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    /// Fair perpetual price from spot and funding.
    ///
    /// `P = S * (1 - f_annual * k)`: positive funding means longs pay shorts,
    /// which depresses the fair perp below spot. `k` is the configured
    /// damping constant.
    pub fn synthetic_perpetual(
        &self,
        symbol: &str,
        venue: &str,
        snapshot: &CacheSnapshot,
    ) -> Result<SyntheticPrice, EngineError> {
        let spot = snapshot
            .spot(symbol, venue)
            .and_then(|p| p.to_f64())
            .filter(|p| *p > 0.0)
            .ok_or_else(|| EngineError::QuoteMissing {
                symbol: symbol.to_string(),
                venue: venue.to_string(),
            })?;

        let funding = snapshot.funding(symbol, venue);
        let periods_per_year = self.config.funding_periods_per_day * DAYS_PER_YEAR;
        let annual_funding = funding.unwrap_or(0.0) * periods_per_year;
        let funding_adjustment = -spot * annual_funding * self.config.funding_damping;
        let price = spot + funding_adjustment;

        // Two inputs: spot (required, present) and funding (optional).
        let confidence = if funding.is_some() { 0.95 } else { 0.95 / 2.0 };

        debug!(
            "SyntheticPricer: perp {} on {} spot={:.2} funding={:?} synthetic={:.2}",
            symbol, venue, spot, funding, price
        );

        Ok(SyntheticPrice {
            instrument_id: format!("{symbol}-PERP@{venue}"),
            price: Decimal::from_f64(price).unwrap_or(Decimal::ZERO),
            model: PricingModel::PerpSynthetic,
            confidence,
            components: PriceComponents {
                base_price: spot,
                funding_adjustment,
                ..PriceComponents::default()
            },
            timestamp: Utc::now(),
        })
    }

    /// Cost-of-carry fair value for a dated future: `F = S * exp(r * tau)`.
    /// An expired contract prices at spot.
    pub fn synthetic_future(
        &self,
        symbol: &str,
        venue: &str,
        snapshot: &CacheSnapshot,
        time_to_expiry_years: f64,
    ) -> Result<SyntheticPrice, EngineError> {
        let spot = snapshot
            .spot(symbol, venue)
            .and_then(|p| p.to_f64())
            .filter(|p| *p > 0.0)
            .ok_or_else(|| EngineError::QuoteMissing {
                symbol: symbol.to_string(),
                venue: venue.to_string(),
            })?;

        let (price, carry) = if time_to_expiry_years > 0.0 {
            let fair = spot * (self.config.risk_free_rate * time_to_expiry_years).exp();
            (fair, fair - spot)
        } else {
            (spot, 0.0)
        };

        Ok(SyntheticPrice {
            instrument_id: format!("{symbol}-FUT@{venue}"),
            price: Decimal::from_f64(price).unwrap_or(Decimal::ZERO),
            model: PricingModel::FutureCostOfCarry,
            confidence: 0.95,
            components: PriceComponents {
                base_price: spot,
                carry,
                ..PriceComponents::default()
            },
            timestamp: Utc::now(),
        })
    }

    /// Black-Scholes fair value for a European option on the cached spot.
    /// Reports `ModelUnavailable` when the vol input is absent or degenerate.
    pub fn synthetic_option(
        &self,
        symbol: &str,
        venue: &str,
        snapshot: &CacheSnapshot,
        strike: f64,
        time_to_expiry_years: f64,
        implied_vol: Option<f64>,
        kind: crate::domain::pricing::OptionKind,
    ) -> Result<SyntheticPrice, EngineError> {
        let spot = snapshot
            .spot(symbol, venue)
            .and_then(|p| p.to_f64())
            .filter(|p| *p > 0.0)
            .ok_or_else(|| EngineError::QuoteMissing {
                symbol: symbol.to_string(),
                venue: venue.to_string(),
            })?;

        let sigma = implied_vol.ok_or_else(|| EngineError::ModelUnavailable {
            reason: format!("no implied volatility for {symbol}"),
        })?;

        let price = black_scholes(&OptionInputs {
            spot,
            strike,
            time_to_expiry: time_to_expiry_years,
            volatility: sigma,
            risk_free_rate: self.config.risk_free_rate,
            kind,
        })?;

        Ok(SyntheticPrice {
            instrument_id: format!("{symbol}-OPT@{venue}"),
            price: Decimal::from_f64(price).unwrap_or(Decimal::ZERO),
            model: PricingModel::OptionBlackScholes,
            confidence: 0.95,
            components: PriceComponents {
                base_price: spot,
                vol_component: price - (spot - strike).max(0.0),
                ..PriceComponents::default()
            },
            timestamp: Utc::now(),
        })
    }

    /// Default tenor for `-FUT` instruments quoted without an expiry.
    pub fn default_future_tenor_years(&self) -> f64 {
        self.config.future_tenor_days / DAYS_PER_YEAR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::market_data::MarketDataCache;
    use crate::domain::market::Quote;
    use crate::domain::pricing::OptionKind;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn snapshot_with(symbol: &str, venue: &str, last: Decimal, funding: Option<f64>) -> CacheSnapshot {
        let cache = MarketDataCache::new(Duration::from_secs(5));
        cache.update([Quote {
            symbol: symbol.to_string(),
            venue: venue.to_string(),
            bid: last - dec!(1),
            ask: last + dec!(1),
            last,
            volume_24h: dec!(1000000),
            funding_rate: None,
            mark_price: None,
            timestamp: 0,
        }]);
        if let Some(rate) = funding {
            cache.update([Quote {
                symbol: format!("{symbol}-PERP"),
                venue: venue.to_string(),
                bid: last - dec!(1),
                ask: last + dec!(1),
                last,
                volume_24h: dec!(1000000),
                funding_rate: Some(rate),
                mark_price: None,
                timestamp: 0,
            }]);
        }
        cache.snapshot()
    }

    fn pricer() -> SyntheticPricer {
        SyntheticPricer::new(PricingConfig::default())
    }

    #[test]
    fn test_positive_funding_depresses_perp() {
        let snapshot = snapshot_with("BTC-USDT", "binance", dec!(43500), Some(0.0001));
        let synth = pricer()
            .synthetic_perpetual("BTC-USDT", "binance", &snapshot)
            .unwrap();
        // f_annual = 0.0001 * 3 * 365.25 = 0.1096; adjustment ~ -43500 * 0.1096 * 0.01
        let price = synth.price.to_f64().unwrap();
        assert!(price < 43500.0);
        assert!((price - (43500.0 - 43500.0 * 0.0001 * 1095.75 * 0.01)).abs() < 1e-6);
        assert_eq!(synth.model, PricingModel::PerpSynthetic);
        assert!((synth.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_missing_funding_halves_confidence() {
        let snapshot = snapshot_with("BTC-USDT", "binance", dec!(43500), None);
        let synth = pricer()
            .synthetic_perpetual("BTC-USDT", "binance", &snapshot)
            .unwrap();
        assert_eq!(synth.price.to_f64().unwrap(), 43500.0);
        assert!(synth.confidence < 0.5);
    }

    #[test]
    fn test_missing_spot_is_error() {
        let snapshot = snapshot_with("BTC-USDT", "binance", dec!(43500), None);
        let err = pricer()
            .synthetic_perpetual("ETH-USDT", "binance", &snapshot)
            .unwrap_err();
        assert!(matches!(err, EngineError::QuoteMissing { .. }));
    }

    #[test]
    fn test_future_cost_of_carry() {
        let snapshot = snapshot_with("BTC-USDT", "binance", dec!(43500), None);
        let synth = pricer()
            .synthetic_future("BTC-USDT", "binance", &snapshot, 0.25)
            .unwrap();
        let expected = 43500.0 * (0.05f64 * 0.25).exp();
        assert!((synth.price.to_f64().unwrap() - expected).abs() < 1e-6);
        assert!(synth.components.carry > 0.0);
    }

    #[test]
    fn test_expired_future_equals_spot() {
        let snapshot = snapshot_with("BTC-USDT", "binance", dec!(43500), None);
        let synth = pricer()
            .synthetic_future("BTC-USDT", "binance", &snapshot, 0.0)
            .unwrap();
        assert_eq!(synth.price.to_f64().unwrap(), 43500.0);
    }

    #[test]
    fn test_option_requires_vol() {
        let snapshot = snapshot_with("BTC-USDT", "binance", dec!(43500), None);
        let err = pricer()
            .synthetic_option(
                "BTC-USDT",
                "binance",
                &snapshot,
                45000.0,
                0.25,
                None,
                OptionKind::Call,
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::ModelUnavailable { .. }));
    }
}
