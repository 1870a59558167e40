use super::detector::{StrategyContext, liquidity_score, slippage_cost, transaction_costs};
use crate::domain::market::Side;
use crate::domain::opportunity::{Leg, Opportunity, StrategyKind};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::time::Duration;

const SHORT_WINDOW: usize = 30;
const MIN_SAMPLES: usize = 120;
const DISLOCATION_RATIO: f64 = 1.5;
/// Fraction of the vol gap assumed to be captured before normalization.
const CAPTURE_FACTOR: f64 = 0.25;

/// Volatility dislocation between the short-horizon and long-horizon
/// realized vol of one instrument.
///
/// With no options feed in the core, the long-horizon realized vol stands in
/// for the implied anchor; when the short window trades far above or below it
/// the gap tends to close. Elevated vol widens the perp basis, so the
/// expression is the same delta-neutral spot/perp pair as the basis trades.
/// Returns no candidates while history is insufficient.
pub(super) fn detect(ctx: &StrategyContext) -> Vec<Opportunity> {
    let mut opportunities = Vec::new();

    for (key, _quote) in &ctx.snapshot.quotes {
        if key.is_perp() || key.is_future() {
            continue;
        }
        let symbol = key.symbol.as_str();
        let venue = key.venue.as_str();

        let Some(series) = ctx.snapshot.history(key) else {
            continue;
        };
        if series.len() < MIN_SAMPLES {
            continue;
        }

        let long_vol = match series.realized_volatility(365.0) {
            Some(v) if v > 0.0 => v,
            _ => continue,
        };
        let recent = series.recent(SHORT_WINDOW);
        let mut short_series = crate::domain::market::PriceSeries::new(SHORT_WINDOW);
        for (i, price) in recent.iter().enumerate() {
            short_series.push(i as i64, *price);
        }
        let short_vol = match short_series.realized_volatility(365.0) {
            Some(v) if v > 0.0 => v,
            _ => continue,
        };

        let ratio = short_vol / long_vol;
        if ratio < DISLOCATION_RATIO && ratio > 1.0 / DISLOCATION_RATIO {
            continue;
        }

        let Some(spot) = ctx.snapshot.spot(symbol, venue) else {
            continue;
        };
        let Some(perp) = ctx.snapshot.perp(symbol, venue) else {
            continue;
        };

        let capital = ctx.trading.max_position_usd.min(Decimal::from(10_000));
        let half = capital / Decimal::TWO;
        let perp_instrument = format!("{symbol}-PERP");
        // Elevated short vol: the perp trades rich to spot while vol mean-
        // reverts, so sell the perp; depressed vol is the mirror image.
        let legs = if ratio >= DISLOCATION_RATIO {
            vec![
                Leg::new(venue, perp_instrument.clone(), Side::Sell, (half / perp).round_dp(8), perp, 0.5),
                Leg::new(venue, symbol, Side::Buy, (half / spot).round_dp(8), spot, 0.5),
            ]
        } else {
            vec![
                Leg::new(venue, perp_instrument.clone(), Side::Buy, (half / perp).round_dp(8), perp, 0.5),
                Leg::new(venue, symbol, Side::Sell, (half / spot).round_dp(8), spot, 0.5),
            ]
        };

        let gap = (short_vol - long_vol).abs();
        let pct_spread = gap * 100.0 * CAPTURE_FACTOR;
        let liquidity = liquidity_score(&legs, ctx.snapshot);

        let mut opp = Opportunity::new(StrategyKind::Volatility, symbol);
        opp.venue_a = venue.to_string();
        opp.venue_b = venue.to_string();
        opp.price_a = Decimal::from_f64(short_vol).unwrap_or(Decimal::ZERO);
        opp.price_b = Decimal::from_f64(long_vol).unwrap_or(Decimal::ZERO);
        opp.price_difference = Decimal::from_f64(gap).unwrap_or(Decimal::ZERO);
        opp.percentage_spread = pct_spread;
        opp.required_capital = capital;
        opp.gross_profit_usd =
            capital * Decimal::from_f64(gap * CAPTURE_FACTOR).unwrap_or(Decimal::ZERO);
        opp.expected_profit_pct = pct_spread;
        // Vol forecasts are the weakest signal in the family.
        opp.confidence = 0.6;
        opp.liquidity_score = liquidity;
        opp.volatility_risk = short_vol.clamp(0.0, 1.0);
        opp.risk_score = short_vol.clamp(0.0, 1.0);
        opp.estimated_duration = Duration::from_secs(6 * 3600);
        opp.time_to_expiry = Duration::from_secs(12 * 3600);
        opp.legs = legs;

        let exec_cost = transaction_costs(&opp.legs, capital);
        let slip = slippage_cost(&opp.legs, capital, liquidity);
        opp.finalize_costs(exec_cost, slip);
        opp.risk_adjusted_return = opp.compute_risk_adjusted_return();

        opportunities.push(opp);
    }

    opportunities.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    opportunities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::market_data::{CacheSnapshot, MarketDataCache};
    use crate::application::pricing::SyntheticPricer;
    use crate::config::{PricingConfig, TradingConfig};
    use crate::domain::market::{MarketKey, Quote};
    use rust_decimal_macros::dec;
    use std::time::Duration as StdDuration;

    fn quote(symbol: &str, venue: &str, last: Decimal) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            venue: venue.to_string(),
            bid: last - dec!(1),
            ask: last + dec!(1),
            last,
            volume_24h: dec!(2000000),
            funding_rate: None,
            mark_price: None,
            timestamp: 0,
        }
    }

    fn snapshot_with_history(prices: &[f64]) -> CacheSnapshot {
        let cache = MarketDataCache::new(StdDuration::from_secs(5));
        cache.update([
            quote("BTC-USDT", "venue_a", dec!(43500)),
            quote("BTC-USDT-PERP", "venue_a", dec!(43510)),
        ]);
        let key = MarketKey::new("BTC-USDT", "venue_a");
        for (i, p) in prices.iter().enumerate() {
            cache.update_price_history(&key, *p, i as i64);
        }
        cache.snapshot()
    }

    fn run(snapshot: &CacheSnapshot) -> Vec<Opportunity> {
        let trading = TradingConfig::default();
        let pricer = SyntheticPricer::new(PricingConfig::default());
        let ctx = StrategyContext {
            snapshot,
            trading: &trading,
            pricer: &pricer,
        };
        detect(&ctx)
    }

    #[test]
    fn test_insufficient_history_is_silent() {
        let prices: Vec<f64> = (0..50).map(|i| 43500.0 + i as f64).collect();
        assert!(run(&snapshot_with_history(&prices)).is_empty());
    }

    #[test]
    fn test_vol_spike_emits_short_perp() {
        // Calm regime followed by a violent last window.
        let mut prices: Vec<f64> = (0..170)
            .map(|i| 43500.0 * (1.0 + 0.0001 * ((i % 2) as f64 - 0.5)))
            .collect();
        for i in 0..30 {
            let swing = if i % 2 == 0 { 1.03 } else { 0.97 };
            prices.push(43500.0 * swing);
        }
        let found = run(&snapshot_with_history(&prices));
        assert_eq!(found.len(), 1);
        let opp = &found[0];
        assert_eq!(opp.strategy, StrategyKind::Volatility);
        assert_eq!(opp.legs[0].side, Side::Sell);
        assert_eq!(opp.legs[0].instrument, "BTC-USDT-PERP");
    }

    #[test]
    fn test_steady_vol_is_silent() {
        let prices: Vec<f64> = (0..200)
            .map(|i| 43500.0 * (1.0 + 0.001 * ((i % 2) as f64 - 0.5)))
            .collect();
        assert!(run(&snapshot_with_history(&prices)).is_empty());
    }
}
