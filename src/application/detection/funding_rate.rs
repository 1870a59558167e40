use super::detector::{StrategyContext, liquidity_score, slippage_cost, transaction_costs, volatility_risk};
use crate::domain::market::Side;
use crate::domain::opportunity::{Leg, Opportunity, StrategyKind};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::collections::HashMap;
use std::time::Duration;

const FUNDING_PERIOD: Duration = Duration::from_secs(8 * 3600);

/// Funding-rate differential across venues.
///
/// Short the perp on the venue paying the highest funding, long the perp on
/// the venue paying the lowest, equal notionals; price exposure nets out and
/// the funding differential is captured each settlement.
pub(super) fn detect(ctx: &StrategyContext) -> Vec<Opportunity> {
    let mut opportunities = Vec::new();

    // Group perp funding observations by underlying symbol.
    let mut by_symbol: HashMap<&str, Vec<(&str, f64, Decimal)>> = HashMap::new();
    for (key, quote) in &ctx.snapshot.quotes {
        if !key.is_perp() {
            continue;
        }
        let Some(rate) = quote.funding_rate else {
            continue;
        };
        let Some(price) = quote.reference_price().or(quote.mark_price) else {
            continue;
        };
        by_symbol
            .entry(key.underlying())
            .or_default()
            .push((key.venue.as_str(), rate, price));
    }

    for (symbol, mut venues) in by_symbol {
        if venues.len() < 2 {
            continue;
        }
        venues.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        let (low_venue, low_rate, low_price) = venues[0];
        let (high_venue, high_rate, high_price) = *venues.last().expect("len >= 2");

        let diff = high_rate - low_rate;
        // Exactly at the threshold is not actionable; strictly above is.
        if diff.abs() <= ctx.trading.min_funding_diff {
            continue;
        }

        let capital = ctx.trading.max_position_usd.min(Decimal::from(20_000));
        if high_price <= Decimal::ZERO || low_price <= Decimal::ZERO {
            continue;
        }
        let perp = format!("{symbol}-PERP");
        let legs = vec![
            Leg::new(
                high_venue,
                perp.clone(),
                Side::Sell,
                (capital / high_price).round_dp(8),
                high_price,
                0.5,
            ),
            Leg::new(
                low_venue,
                perp.clone(),
                Side::Buy,
                (capital / low_price).round_dp(8),
                low_price,
                0.5,
            ),
        ];

        let liquidity = liquidity_score(&legs, ctx.snapshot);
        let vol_risk = volatility_risk(symbol, high_venue, ctx.snapshot);
        let diff_abs = diff.abs();

        let mut opp = Opportunity::new(StrategyKind::FundingRate, symbol);
        opp.venue_a = high_venue.to_string();
        opp.venue_b = low_venue.to_string();
        // Funding differentials are displayed in basis points.
        opp.price_a = Decimal::from_f64(high_rate * 10_000.0).unwrap_or(Decimal::ZERO);
        opp.price_b = Decimal::from_f64(low_rate * 10_000.0).unwrap_or(Decimal::ZERO);
        opp.price_difference = Decimal::from_f64(diff_abs * 10_000.0).unwrap_or(Decimal::ZERO);
        opp.percentage_spread = diff_abs * 100.0;
        opp.required_capital = capital;
        // One settlement of the differential on the hedged notional.
        opp.gross_profit_usd = capital * Decimal::from_f64(diff_abs).unwrap_or(Decimal::ZERO);
        // Annualized capture at three settlements a day.
        opp.expected_profit_pct = diff_abs * 3.0 * 365.0 * 100.0;
        // Funding prints are known in advance, which keeps confidence high.
        opp.confidence = 0.8;
        opp.liquidity_score = liquidity;
        opp.volatility_risk = vol_risk;
        opp.risk_score = (vol_risk * 0.5).clamp(0.0, 1.0);
        opp.estimated_duration = FUNDING_PERIOD;
        opp.time_to_expiry = FUNDING_PERIOD;
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
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal_macros::dec;
    use std::time::Duration as StdDuration;

    fn perp_quote(symbol: &str, venue: &str, last: Decimal, funding: f64) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            venue: venue.to_string(),
            bid: last - dec!(1),
            ask: last + dec!(1),
            last,
            volume_24h: dec!(3000000),
            funding_rate: Some(funding),
            mark_price: Some(last),
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
    fn test_shorts_high_longs_low() {
        let found = run(vec![
            perp_quote("ETH-USDT-PERP", "venue_a", dec!(2300), 0.0001),
            perp_quote("ETH-USDT-PERP", "venue_b", dec!(2301), 0.0003),
        ]);
        assert_eq!(found.len(), 1);
        let opp = &found[0];
        assert_eq!(opp.strategy, StrategyKind::FundingRate);
        assert_eq!(opp.venue_a, "venue_b"); // high funding side
        assert_eq!(opp.venue_b, "venue_a");
        assert_eq!(opp.estimated_duration, FUNDING_PERIOD);

        let short = &opp.legs[0];
        assert_eq!(short.venue, "venue_b");
        assert_eq!(short.side, Side::Sell);
        let long = &opp.legs[1];
        assert_eq!(long.venue, "venue_a");
        assert_eq!(long.side, Side::Buy);

        // One settlement on $10k at 2bp differential = $2 gross
        let gross = opp.gross_profit_usd.to_f64().unwrap();
        assert!((gross - 2.0).abs() < 0.01, "got {gross}");
    }

    #[test]
    fn test_exactly_one_bp_excluded() {
        let found = run(vec![
            perp_quote("ETH-USDT-PERP", "venue_a", dec!(2300), 0.0001),
            perp_quote("ETH-USDT-PERP", "venue_b", dec!(2301), 0.0002),
        ]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_strictly_above_one_bp_included() {
        let found = run(vec![
            perp_quote("ETH-USDT-PERP", "venue_a", dec!(2300), 0.0001),
            perp_quote("ETH-USDT-PERP", "venue_b", dec!(2301), 0.00021),
        ]);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_single_venue_is_silent() {
        let found = run(vec![perp_quote(
            "ETH-USDT-PERP",
            "venue_a",
            dec!(2300),
            0.0005,
        )]);
        assert!(found.is_empty());
    }
}
