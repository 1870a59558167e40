use super::detector::{
    StrategyContext, confidence_score, liquidity_score, slippage_cost, transaction_costs,
    volatility_risk,
};
use crate::domain::market::Side;
use crate::domain::opportunity::{Leg, Opportunity, StrategyKind};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::time::Duration;

/// Same instrument, different venues: buy where it is cheap, sell where it is
/// rich. Costs and slippage run higher than intra-venue trades and the
/// confidence haircut reflects the transfer/execution timing risk.
pub(super) fn detect(ctx: &StrategyContext) -> Vec<Opportunity> {
    let mut opportunities = Vec::new();

    let mut by_instrument: HashMap<&str, Vec<(&str, Decimal, Decimal)>> = HashMap::new();
    for (key, quote) in &ctx.snapshot.quotes {
        if let Some(price) = quote.reference_price() {
            by_instrument
                .entry(key.symbol.as_str())
                .or_default()
                .push((key.venue.as_str(), price, quote.volume_24h));
        }
    }

    for (instrument, mut venues) in by_instrument {
        if venues.len() < 2 {
            continue;
        }
        venues.sort_by(|a, b| a.1.cmp(&b.1));
        let (low_venue, low_price, _) = venues[0].clone();
        let (high_venue, high_price, _) = venues.last().expect("len >= 2").clone();

        let diff = high_price - low_price;
        let avg = (high_price + low_price) / Decimal::TWO;
        let pct_spread = (diff / avg).to_f64().unwrap_or(0.0) * 100.0;
        if pct_spread < ctx.trading.min_profit_pct {
            continue;
        }

        let capital = ctx.trading.max_position_usd.min(Decimal::from(15_000));
        let quantity = (capital / low_price).round_dp(8);
        let legs = vec![
            Leg::new(low_venue, instrument, Side::Buy, quantity, low_price, 0.5),
            Leg::new(high_venue, instrument, Side::Sell, quantity, high_price, 0.5),
        ];

        let liquidity = liquidity_score(&legs, ctx.snapshot);
        let vol_risk = (volatility_risk(instrument, low_venue, ctx.snapshot) * 1.2).min(1.0);

        let mut opp = Opportunity::new(StrategyKind::CrossVenue, instrument);
        opp.venue_a = low_venue.to_string();
        opp.venue_b = high_venue.to_string();
        opp.price_a = low_price;
        opp.price_b = high_price;
        opp.price_difference = diff;
        opp.percentage_spread = pct_spread;
        opp.required_capital = capital;
        opp.gross_profit_usd = quantity * diff;
        opp.expected_profit_pct = pct_spread;
        // Two venues in flight at once: discount confidence.
        opp.confidence = confidence_score(pct_spread) * 0.8;
        opp.liquidity_score = liquidity;
        opp.volatility_risk = vol_risk;
        opp.risk_score = vol_risk.clamp(0.0, 1.0);
        opp.estimated_duration = Duration::from_secs(10);
        opp.time_to_expiry = Duration::from_secs(30);
        opp.legs = legs;

        let exec_cost = transaction_costs(&opp.legs, capital) * Decimal::TWO;
        let slip = slippage_cost(&opp.legs, capital, liquidity) * Decimal::from_f64_retain(1.5).unwrap_or(Decimal::ONE);
        opp.finalize_costs(exec_cost, slip);
        opp.risk_adjusted_return = opp.compute_risk_adjusted_return();

        opportunities.push(opp);
    }

    opportunities
}
