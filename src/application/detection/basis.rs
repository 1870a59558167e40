use super::detector::{
    StrategyContext, confidence_score, liquidity_score, slippage_cost, transaction_costs,
    volatility_risk,
};
use crate::domain::market::Side;
use crate::domain::opportunity::{Leg, Opportunity, StrategyKind};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::time::Duration;

/// Dated future against its cost-of-carry fair value.
///
/// The quoted `-FUT` contract is compared with `S * exp(r * tau)` from the
/// pricer; a rich future is sold against spot, a cheap one bought.
pub(super) fn detect(ctx: &StrategyContext) -> Vec<Opportunity> {
    let mut opportunities = Vec::new();
    let tenor = ctx.pricer.default_future_tenor_years();

    for (key, quote) in &ctx.snapshot.quotes {
        if !key.is_future() {
            continue;
        }
        let symbol = key.underlying();
        let venue = key.venue.as_str();

        let Some(future_price) = quote.reference_price().or(quote.mark_price) else {
            continue;
        };
        let Ok(fair) = ctx
            .pricer
            .synthetic_future(symbol, venue, ctx.snapshot, tenor)
        else {
            continue;
        };
        let Some(spot) = ctx.snapshot.spot(symbol, venue) else {
            continue;
        };
        if fair.price <= Decimal::ZERO {
            continue;
        }

        let deviation = (future_price - fair.price).abs();
        let pct_spread = (deviation / fair.price).to_f64().unwrap_or(0.0) * 100.0;
        if pct_spread < ctx.trading.min_profit_pct {
            continue;
        }

        let capital = ctx.trading.max_position_usd.min(Decimal::from(10_000));
        let half = capital / Decimal::TWO;
        let fut_qty = (half / future_price).round_dp(8);
        let spot_qty = (half / spot).round_dp(8);

        let legs = if future_price > fair.price {
            vec![
                Leg::new(venue, key.symbol.clone(), Side::Sell, fut_qty, future_price, 0.5),
                Leg::new(venue, symbol, Side::Buy, spot_qty, spot, 0.5),
            ]
        } else {
            vec![
                Leg::new(venue, key.symbol.clone(), Side::Buy, fut_qty, future_price, 0.5),
                Leg::new(venue, symbol, Side::Sell, spot_qty, spot, 0.5),
            ]
        };

        let liquidity = liquidity_score(&legs, ctx.snapshot);
        let vol_risk = volatility_risk(symbol, venue, ctx.snapshot);

        let mut opp = Opportunity::new(StrategyKind::Basis, symbol);
        opp.venue_a = venue.to_string();
        opp.venue_b = venue.to_string();
        opp.price_a = future_price;
        opp.price_b = fair.price;
        opp.price_difference = deviation;
        opp.percentage_spread = pct_spread;
        opp.required_capital = capital;
        opp.gross_profit_usd = (capital / fair.price) * deviation;
        opp.expected_profit_pct = pct_spread;
        // Fair value is itself a model output; blend its confidence in.
        opp.confidence = confidence_score(pct_spread) * fair.confidence;
        opp.liquidity_score = liquidity;
        opp.volatility_risk = vol_risk;
        opp.risk_score = vol_risk.clamp(0.0, 1.0);
        // Basis converges by expiry; the trade is not latency-critical.
        opp.estimated_duration = Duration::from_secs(3600);
        opp.time_to_expiry = Duration::from_secs(2 * 3600);
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
            volume_24h: dec!(2000000),
            funding_rate: None,
            mark_price: None,
            timestamp: 0,
        }
    }

    fn run(quotes: Vec<Quote>) -> Vec<Opportunity> {
        let cache = MarketDataCache::new(StdDuration::from_secs(5));
        cache.update(quotes);
        let snapshot = cache.snapshot();
        let trading = TradingConfig::default();
        let pricer = SyntheticPricer::new(PricingConfig::default());
        let ctx = StrategyContext {
            snapshot: &snapshot,
            trading: &trading,
            pricer: &pricer,
        };
        detect(&ctx)
    }

    #[test]
    fn test_rich_future_sold_against_spot() {
        // Fair value at 90d / 5% is ~43500 * 1.0124 ~ 44039; quote it rich.
        let found = run(vec![
            quote("BTC-USDT", "venue_a", dec!(43500)),
            quote("BTC-USDT-FUT", "venue_a", dec!(45000)),
        ]);
        assert_eq!(found.len(), 1);
        let opp = &found[0];
        assert_eq!(opp.strategy, StrategyKind::Basis);
        assert_eq!(opp.legs[0].instrument, "BTC-USDT-FUT");
        assert_eq!(opp.legs[0].side, Side::Sell);
        assert_eq!(opp.legs[1].side, Side::Buy);
    }

    #[test]
    fn test_future_near_fair_is_silent() {
        let fair = 43500.0 * (0.05f64 * 90.0 / 365.25).exp();
        let found = run(vec![
            quote("BTC-USDT", "venue_a", dec!(43500)),
            quote(
                "BTC-USDT-FUT",
                "venue_a",
                Decimal::from_f64_retain(fair).unwrap().round_dp(2),
            ),
        ]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_no_future_quote_is_silent() {
        let found = run(vec![quote("BTC-USDT", "venue_a", dec!(43500))]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_no_spot_is_silent() {
        let found = run(vec![quote("BTC-USDT-FUT", "venue_a", dec!(45000))]);
        assert!(found.is_empty());
    }
}
