use crate::config::SizingConfig;
use crate::domain::execution::SizingStrategy;
use crate::domain::opportunity::Opportunity;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use tracing::debug;

/// Base position size in USD for one opportunity under the chosen strategy,
/// clamped to the configured min/max bounds.
pub fn base_position_size(
    config: &SizingConfig,
    opp: &Opportunity,
    method: SizingStrategy,
) -> Decimal {
    let size = match method {
        SizingStrategy::Fixed => config.min_position_size,
        SizingStrategy::FixedPercent => fixed_percent(config),
        SizingStrategy::Kelly => kelly(config, opp),
        SizingStrategy::VolatilityAdjusted => volatility_adjusted(config, opp),
        SizingStrategy::LiquidityConstrained => liquidity_constrained(config, opp),
        SizingStrategy::RiskParity => risk_parity(config, opp),
        SizingStrategy::MaxDrawdownLimit => drawdown_limited(config, opp),
    };
    size.clamp(config.min_position_size, config.max_position_size)
}

fn fixed_percent(config: &SizingConfig) -> Decimal {
    config.max_single_trade_capital
        * Decimal::from_f64(config.fixed_percent).unwrap_or(Decimal::ZERO)
}

/// Fractional Kelly: `f* = (p*b - q) / b`, scaled by the configured fraction.
///
/// The loss magnitude input is the opportunity risk score, a stand-in for the
/// true loss distribution; with degenerate inputs (no edge, no modeled risk)
/// the sizer falls back to fixed-percent rather than extrapolating.
fn kelly(config: &SizingConfig, opp: &Opportunity) -> Decimal {
    let win_probability = opp.confidence;
    let loss_probability = 1.0 - win_probability;
    let win_amount = opp.expected_profit_pct / 100.0;
    let loss_amount = opp.risk_score;

    if win_amount <= 0.0 || loss_amount <= f64::EPSILON {
        debug!("sizing: degenerate Kelly inputs, using fixed-percent fallback");
        return fixed_percent(config);
    }

    let kelly_fraction =
        ((win_probability * win_amount - loss_probability) / loss_amount) * config.kelly_fraction;
    let kelly_fraction = kelly_fraction.clamp(0.0, 1.0);
    if kelly_fraction == 0.0 {
        return fixed_percent(config);
    }

    config.max_single_trade_capital
        * Decimal::from_f64(kelly_fraction).unwrap_or(Decimal::ZERO)
}

/// Inverse to modeled risk: riskier opportunities size down smoothly.
fn volatility_adjusted(config: &SizingConfig, opp: &Opportunity) -> Decimal {
    let adjustment = 1.0 / (1.0 + opp.risk_score);
    config.max_position_size * Decimal::from_f64(adjustment).unwrap_or(Decimal::ONE)
}

/// A tenth of the naive per-level liquidity estimate across legs.
fn liquidity_constrained(config: &SizingConfig, opp: &Opportunity) -> Decimal {
    let estimated_liquidity: f64 = opp
        .legs
        .iter()
        .map(|leg| leg.price.to_f64().unwrap_or(0.0) * 1_000.0)
        .sum();
    let constrained = Decimal::from_f64(estimated_liquidity * 0.1).unwrap_or(Decimal::ZERO);
    constrained.min(config.max_position_size)
}

/// Equal risk contribution per leg against the portfolio VaR budget.
fn risk_parity(config: &SizingConfig, opp: &Opportunity) -> Decimal {
    let legs = opp.legs.len().max(1) as f64;
    let target_risk = config.max_portfolio_var / legs;
    let position_risk = opp.risk_score.max(0.01);
    config.max_single_trade_capital
        * Decimal::from_f64(target_risk / position_risk).unwrap_or(Decimal::ZERO)
}

/// Sized so a two-sigma move stays inside the drawdown budget.
fn drawdown_limited(config: &SizingConfig, opp: &Opportunity) -> Decimal {
    let vol = opp.volatility_risk.max(0.01);
    config.max_single_trade_capital
        * Decimal::from_f64(config.max_drawdown_limit / (2.0 * vol)).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Side;
    use crate::domain::opportunity::{Leg, StrategyKind};
    use rust_decimal_macros::dec;

    fn opportunity(confidence: f64, profit_pct: f64, risk: f64) -> Opportunity {
        let mut opp = Opportunity::new(StrategyKind::CrossVenue, "BTC-USDT");
        opp.confidence = confidence;
        opp.expected_profit_pct = profit_pct;
        opp.risk_score = risk;
        opp.volatility_risk = risk;
        opp.legs = vec![
            Leg::new("a", "BTC-USDT", Side::Buy, dec!(0.1), dec!(43500), 0.5),
            Leg::new("b", "BTC-USDT", Side::Sell, dec!(0.1), dec!(43520), 0.5),
        ];
        opp
    }

    #[test]
    fn test_fixed_uses_minimum() {
        let config = SizingConfig::default();
        let size = base_position_size(&config, &opportunity(0.8, 1.0, 0.3), SizingStrategy::Fixed);
        assert_eq!(size, config.min_position_size);
    }

    #[test]
    fn test_sizes_respect_bounds() {
        let config = SizingConfig::default();
        for method in [
            SizingStrategy::Fixed,
            SizingStrategy::FixedPercent,
            SizingStrategy::Kelly,
            SizingStrategy::VolatilityAdjusted,
            SizingStrategy::LiquidityConstrained,
            SizingStrategy::RiskParity,
            SizingStrategy::MaxDrawdownLimit,
        ] {
            let size = base_position_size(&config, &opportunity(0.9, 2.0, 0.3), method);
            assert!(size >= config.min_position_size, "{method:?} below floor");
            assert!(size <= config.max_position_size, "{method:?} above cap");
        }
    }

    #[test]
    fn test_kelly_scales_with_edge() {
        let config = SizingConfig::default();
        let weak = base_position_size(&config, &opportunity(0.95, 30.0, 0.5), SizingStrategy::Kelly);
        let strong =
            base_position_size(&config, &opportunity(0.95, 60.0, 0.5), SizingStrategy::Kelly);
        assert!(strong >= weak);
    }

    #[test]
    fn test_kelly_degenerate_falls_back() {
        let config = SizingConfig::default();
        let degenerate =
            base_position_size(&config, &opportunity(0.8, 0.0, 0.0), SizingStrategy::Kelly);
        let fallback =
            base_position_size(&config, &opportunity(0.8, 1.0, 0.3), SizingStrategy::FixedPercent);
        assert_eq!(degenerate, fallback);
    }

    #[test]
    fn test_volatility_adjusted_shrinks_with_risk() {
        let config = SizingConfig::default();
        let calm = base_position_size(
            &config,
            &opportunity(0.8, 1.0, 0.1),
            SizingStrategy::VolatilityAdjusted,
        );
        let wild = base_position_size(
            &config,
            &opportunity(0.8, 1.0, 0.9),
            SizingStrategy::VolatilityAdjusted,
        );
        assert!(calm > wild);
    }
}
