use super::detector::{StrategyContext, liquidity_score, slippage_cost, transaction_costs, volatility_risk};
use crate::domain::market::Side;
use crate::domain::opportunity::{Leg, Opportunity, StrategyKind};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use statrs::statistics::{Data, Distribution};
use std::time::Duration;

const LOOKBACK: usize = 30;
const ENTRY_Z: f64 = 2.0;
/// Assumed share of the gap to the mean that is recovered.
const REVERSION_FACTOR: f64 = 0.5;

/// Z-score mean reversion on a single instrument.
///
/// Two standard deviations from the rolling mean is treated as stretched;
/// the candidate fades the move back toward the mean. Confidence scales with
/// how far beyond the entry threshold the z-score sits.
pub(super) fn detect(ctx: &StrategyContext) -> Vec<Opportunity> {
    let mut opportunities = Vec::new();

    for (key, quote) in &ctx.snapshot.quotes {
        if key.is_future() {
            continue;
        }
        let Some(series) = ctx.snapshot.history(key) else {
            continue;
        };
        if series.len() < LOOKBACK {
            continue;
        }
        let Some(price) = quote.reference_price().and_then(|p| p.to_f64()) else {
            continue;
        };

        let window = Data::new(series.recent(LOOKBACK));
        let (Some(mean), Some(std_dev)) = (window.mean(), window.std_dev()) else {
            continue;
        };
        if std_dev <= f64::EPSILON || mean <= 0.0 {
            continue;
        }

        let zscore = (price - mean) / std_dev;
        if zscore.abs() < ENTRY_Z {
            continue;
        }

        let side = if zscore > 0.0 { Side::Sell } else { Side::Buy };
        let capital = ctx.trading.max_position_usd.min(Decimal::from(10_000));
        let price_d = Decimal::from_f64(price).unwrap_or(Decimal::ZERO);
        if price_d <= Decimal::ZERO {
            continue;
        }
        let quantity = (capital / price_d).round_dp(8);
        let legs = vec![Leg::new(
            key.venue.as_str(),
            key.symbol.as_str(),
            side,
            quantity,
            price_d,
            1.0,
        )];

        let reversion_pct = ((price - mean).abs() / price) * 100.0 * REVERSION_FACTOR;
        let excess = zscore.abs() - ENTRY_Z;
        let liquidity = liquidity_score(&legs, ctx.snapshot);
        let vol_risk = volatility_risk(&key.symbol, &key.venue, ctx.snapshot);

        let mut opp = Opportunity::new(StrategyKind::Statistical, key.symbol.as_str());
        opp.venue_a = key.venue.clone();
        opp.venue_b = key.venue.clone();
        opp.price_a = price_d;
        opp.price_b = Decimal::from_f64(mean).unwrap_or(Decimal::ZERO);
        opp.price_difference = (opp.price_a - opp.price_b).abs();
        opp.percentage_spread = reversion_pct;
        opp.required_capital = capital;
        opp.gross_profit_usd =
            capital * Decimal::from_f64(reversion_pct / 100.0).unwrap_or(Decimal::ZERO);
        opp.expected_profit_pct = reversion_pct;
        opp.confidence = (0.5 + excess * 0.15).min(0.95);
        opp.liquidity_score = liquidity;
        opp.volatility_risk = vol_risk;
        opp.risk_score = vol_risk.clamp(0.0, 1.0);
        opp.estimated_duration = Duration::from_secs(60);
        opp.time_to_expiry = Duration::from_secs(300);
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

    fn snapshot(last: Decimal, history: &[f64]) -> CacheSnapshot {
        let cache = MarketDataCache::new(StdDuration::from_secs(5));
        cache.update([Quote {
            symbol: "SOL-USDT".to_string(),
            venue: "venue_a".to_string(),
            bid: last - dec!(1),
            ask: last + dec!(1),
            last,
            volume_24h: dec!(2000000),
            funding_rate: None,
            mark_price: None,
            timestamp: 0,
        }]);
        let key = MarketKey::new("SOL-USDT", "venue_a");
        for (i, p) in history.iter().enumerate() {
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
    fn test_stretched_price_fades_toward_mean() {
        // Mean ~100 with modest noise; last print far above.
        let mut history: Vec<f64> = (0..40)
            .map(|i| 100.0 + 0.5 * ((i % 2) as f64 - 0.5))
            .collect();
        history.push(110.0);
        let snap = snapshot(dec!(110), &history);
        let found = run(&snap);
        assert_eq!(found.len(), 1);
        let opp = &found[0];
        assert_eq!(opp.strategy, StrategyKind::Statistical);
        assert_eq!(opp.legs.len(), 1);
        assert_eq!(opp.legs[0].side, Side::Sell);
        assert!((opp.weights_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_depressed_price_is_bought() {
        let mut history: Vec<f64> = (0..40)
            .map(|i| 100.0 + 0.5 * ((i % 2) as f64 - 0.5))
            .collect();
        history.push(90.0);
        let snap = snapshot(dec!(90), &history);
        let found = run(&snap);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].legs[0].side, Side::Buy);
    }

    #[test]
    fn test_price_near_mean_is_silent() {
        let history: Vec<f64> = (0..40)
            .map(|i| 100.0 + 0.5 * ((i % 2) as f64 - 0.5))
            .collect();
        let snap = snapshot(dec!(100), &history);
        assert!(run(&snap).is_empty());
    }

    #[test]
    fn test_short_history_is_silent() {
        let history: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let snap = snapshot(dec!(150), &history);
        assert!(run(&snap).is_empty());
    }
}
