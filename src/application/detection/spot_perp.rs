use super::detector::{
    StrategyContext, confidence_score, liquidity_score, slippage_cost, transaction_costs,
    volatility_risk,
};
use crate::domain::market::Side;
use crate::domain::opportunity::{Leg, Opportunity, StrategyKind};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::time::Duration;

/// Spot versus perpetual on the same venue.
///
/// Perps anchor to spot through funding, so a spread beyond the threshold is
/// a dislocation: sell the rich side, buy the cheap side, equally weighted.
pub(super) fn detect(ctx: &StrategyContext) -> Vec<Opportunity> {
    let mut opportunities = Vec::new();

    for (key, _quote) in &ctx.snapshot.quotes {
        // Iterate spot keys only; the perp leg is looked up per venue.
        if key.is_perp() || key.is_future() {
            continue;
        }
        let symbol = key.symbol.as_str();
        let venue = key.venue.as_str();

        let Some(spot) = ctx.snapshot.spot(symbol, venue) else {
            continue;
        };
        let Some(perp) = ctx.snapshot.perp(symbol, venue) else {
            continue;
        };
        if spot <= Decimal::ZERO || perp <= Decimal::ZERO {
            continue;
        }

        let diff = (spot - perp).abs();
        let avg = (spot + perp) / Decimal::TWO;
        let pct_spread = (diff / avg).to_f64().unwrap_or(0.0) * 100.0;
        if pct_spread < ctx.trading.min_profit_pct {
            continue;
        }

        let capital = ctx.trading.max_position_usd.min(Decimal::from(10_000));
        let half = capital / Decimal::TWO;
        let perp_qty = (half / perp).round_dp(8);
        let spot_qty = (half / spot).round_dp(8);
        let perp_instrument = format!("{symbol}-PERP");

        let legs = if perp > spot {
            vec![
                Leg::new(venue, perp_instrument.clone(), Side::Sell, perp_qty, perp, 0.5),
                Leg::new(venue, symbol, Side::Buy, spot_qty, spot, 0.5),
            ]
        } else {
            vec![
                Leg::new(venue, perp_instrument.clone(), Side::Buy, perp_qty, perp, 0.5),
                Leg::new(venue, symbol, Side::Sell, spot_qty, spot, 0.5),
            ]
        };

        let liquidity = liquidity_score(&legs, ctx.snapshot);
        let vol_risk = volatility_risk(symbol, venue, ctx.snapshot);

        let mut opp = Opportunity::new(StrategyKind::SpotPerp, symbol);
        opp.venue_a = venue.to_string();
        opp.venue_b = venue.to_string();
        opp.price_a = spot;
        opp.price_b = perp;
        opp.price_difference = diff;
        opp.percentage_spread = pct_spread;
        opp.required_capital = capital;
        opp.gross_profit_usd = (capital / avg) * diff;
        opp.expected_profit_pct = pct_spread;
        opp.confidence = confidence_score(pct_spread);
        opp.liquidity_score = liquidity;
        opp.volatility_risk = vol_risk;
        opp.risk_score = vol_risk.clamp(0.0, 1.0);
        opp.estimated_duration = Duration::from_secs(30);
        opp.time_to_expiry = Duration::from_secs(60);
        opp.legs = legs;

        let exec_cost = transaction_costs(&opp.legs, capital);
        let slip = slippage_cost(&opp.legs, capital, liquidity);
        opp.finalize_costs(exec_cost, slip);
        opp.risk_adjusted_return = opp.compute_risk_adjusted_return();

        opportunities.push(opp);
    }

    opportunities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::market_data::MarketDataCache;
    use crate::application::pricing::SyntheticPricer;
    use crate::config::{PricingConfig, TradingConfig};
    use crate::domain::market::Quote;
    use rust_decimal_macros::dec;
    use std::time::Duration as StdDuration;

    fn quote(symbol: &str, venue: &str, last: Decimal) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            venue: venue.to_string(),
            bid: last - dec!(1),
            ask: last + dec!(1),
            last,
            volume_24h: dec!(5000000),
            funding_rate: None,
            mark_price: None,
            timestamp: 0,
        }
    }

    #[test]
    fn test_emits_on_dislocation() {
        let cache = MarketDataCache::new(StdDuration::from_secs(5));
        cache.update([
            quote("BTC-USDT", "venue_a", dec!(43500)),
            quote("BTC-USDT-PERP", "venue_a", dec!(43480)),
        ]);
        let snapshot = cache.snapshot();
        let trading = TradingConfig {
            min_profit_pct: 0.02,
            ..TradingConfig::default()
        };
        let pricer = SyntheticPricer::new(PricingConfig::default());
        let ctx = StrategyContext {
            snapshot: &snapshot,
            trading: &trading,
            pricer: &pricer,
        };

        let found = detect(&ctx);
        assert_eq!(found.len(), 1);
        let opp = &found[0];
        assert_eq!(opp.strategy, StrategyKind::SpotPerp);
        assert_eq!(opp.price_a, dec!(43500));
        assert_eq!(opp.price_b, dec!(43480));
        assert_eq!(opp.price_difference, dec!(20));
        assert!((opp.percentage_spread - 0.046).abs() < 0.001);

        // Spot above perp: buy the perp, sell the spot, half weight each
        assert_eq!(opp.legs.len(), 2);
        let perp_leg = &opp.legs[0];
        assert_eq!(perp_leg.instrument, "BTC-USDT-PERP");
        assert_eq!(perp_leg.side, Side::Buy);
        assert_eq!(perp_leg.weight, 0.5);
        let spot_leg = &opp.legs[1];
        assert_eq!(spot_leg.side, Side::Sell);
        assert_eq!(spot_leg.weight, 0.5);

        assert!(opp.net_profit_usd <= opp.gross_profit_usd);
    }

    #[test]
    fn test_below_threshold_is_silent() {
        let cache = MarketDataCache::new(StdDuration::from_secs(5));
        cache.update([
            quote("BTC-USDT", "venue_a", dec!(43500)),
            quote("BTC-USDT-PERP", "venue_a", dec!(43499)),
        ]);
        let snapshot = cache.snapshot();
        let trading = TradingConfig {
            min_profit_pct: 0.02,
            ..TradingConfig::default()
        };
        let pricer = SyntheticPricer::new(PricingConfig::default());
        let ctx = StrategyContext {
            snapshot: &snapshot,
            trading: &trading,
            pricer: &pricer,
        };
        assert!(detect(&ctx).is_empty());
    }

    #[test]
    fn test_spot_only_is_silent() {
        let cache = MarketDataCache::new(StdDuration::from_secs(5));
        cache.update([quote("BTC-USDT", "venue_a", dec!(43500))]);
        let snapshot = cache.snapshot();
        let trading = TradingConfig::default();
        let pricer = SyntheticPricer::new(PricingConfig::default());
        let ctx = StrategyContext {
            snapshot: &snapshot,
            trading: &trading,
            pricer: &pricer,
        };
        assert!(detect(&ctx).is_empty());
    }
}
