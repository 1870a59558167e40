use crate::domain::market::{MarketKey, Side};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::fmt;
use std::time::{Duration, Instant};

/// Strategy family that produced an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    SpotPerp,
    FundingRate,
    CrossVenue,
    Basis,
    Volatility,
    Statistical,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::SpotPerp,
        StrategyKind::FundingRate,
        StrategyKind::CrossVenue,
        StrategyKind::Basis,
        StrategyKind::Volatility,
        StrategyKind::Statistical,
    ];

    /// Tag used in generated opportunity ids.
    pub fn tag(&self) -> &'static str {
        match self {
            StrategyKind::SpotPerp => "SPOT_PERP",
            StrategyKind::FundingRate => "FUNDING",
            StrategyKind::CrossVenue => "CROSS_VENUE",
            StrategyKind::Basis => "BASIS",
            StrategyKind::Volatility => "VOLATILITY",
            StrategyKind::Statistical => "STATISTICAL",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrategyKind::SpotPerp => "Spot-Perpetual",
            StrategyKind::FundingRate => "Funding Rate",
            StrategyKind::CrossVenue => "Cross-Venue",
            StrategyKind::Basis => "Basis",
            StrategyKind::Volatility => "Volatility",
            StrategyKind::Statistical => "Statistical",
        };
        write!(f, "{s}")
    }
}

/// One order of a multi-leg opportunity.
#[derive(Debug, Clone)]
pub struct Leg {
    pub venue: String,
    pub instrument: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    /// Share of total position, legs of a plan sum to 1.
    pub weight: f64,
    pub expected_slippage: Option<Decimal>,
    pub fee_estimate: Option<Decimal>,
    pub is_synthetic: bool,
}

impl Leg {
    pub fn new(
        venue: impl Into<String>,
        instrument: impl Into<String>,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        weight: f64,
    ) -> Self {
        Self {
            venue: venue.into(),
            instrument: instrument.into(),
            side,
            quantity,
            price,
            weight,
            expected_slippage: None,
            fee_estimate: None,
            is_synthetic: false,
        }
    }

    pub fn synthetic(mut self) -> Self {
        self.is_synthetic = true;
        self
    }

    pub fn key(&self) -> MarketKey {
        MarketKey::new(self.instrument.clone(), self.venue.clone())
    }

    pub fn notional(&self) -> Decimal {
        self.quantity * self.price
    }
}

/// A candidate multi-leg trade detected on one cycle.
///
/// Opportunities are ephemeral values: they live from detection through
/// ranking and planning and are never persisted.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub id: String,
    pub strategy: StrategyKind,
    pub symbol: String,
    pub venue_a: String,
    pub venue_b: String,
    pub legs: Vec<Leg>,

    pub price_a: Decimal,
    pub price_b: Decimal,
    pub price_difference: Decimal,
    /// Spread over the mid, in percent.
    pub percentage_spread: f64,

    pub required_capital: Decimal,
    pub gross_profit_usd: Decimal,
    pub expected_profit_pct: f64,
    pub execution_cost: Decimal,
    pub slippage_cost: Decimal,
    pub net_profit_usd: Decimal,

    pub risk_adjusted_return: f64,
    pub confidence: f64,
    pub liquidity_score: f64,
    pub volatility_risk: f64,
    pub risk_score: f64,

    pub detected_at: DateTime<Utc>,
    /// Monotonic detection instant, used for age checks only.
    pub detected_mono: Instant,
    pub estimated_duration: Duration,
    pub time_to_expiry: Duration,

    pub is_valid: bool,
    pub is_executable: bool,
    pub validation_notes: String,
}

impl Opportunity {
    /// `{STRATEGY}_{SYMBOL}_{ms-timestamp}_{4-digit random}`, unique across
    /// cycles.
    pub fn generate_id(strategy: StrategyKind, symbol: &str) -> String {
        let ts = Utc::now().timestamp_millis();
        let suffix: u32 = rand::rng().random_range(1000..10000);
        format!("{}_{}_{}_{}", strategy.tag(), symbol, ts, suffix)
    }

    pub fn new(strategy: StrategyKind, symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        Self {
            id: Self::generate_id(strategy, &symbol),
            strategy,
            symbol,
            venue_a: String::new(),
            venue_b: String::new(),
            legs: Vec::new(),
            price_a: Decimal::ZERO,
            price_b: Decimal::ZERO,
            price_difference: Decimal::ZERO,
            percentage_spread: 0.0,
            required_capital: Decimal::ZERO,
            gross_profit_usd: Decimal::ZERO,
            expected_profit_pct: 0.0,
            execution_cost: Decimal::ZERO,
            slippage_cost: Decimal::ZERO,
            net_profit_usd: Decimal::ZERO,
            risk_adjusted_return: 0.0,
            confidence: 0.0,
            liquidity_score: 0.0,
            volatility_risk: 0.0,
            risk_score: 0.0,
            detected_at: Utc::now(),
            detected_mono: Instant::now(),
            estimated_duration: Duration::from_secs(30),
            time_to_expiry: Duration::from_secs(60),
            is_valid: false,
            is_executable: false,
            validation_notes: String::new(),
        }
    }

    /// Derives net expected profit from gross minus estimated costs.
    /// Maintains `net_profit_usd = gross_profit_usd - execution_cost - slippage_cost`.
    pub fn finalize_costs(&mut self, execution_cost: Decimal, slippage_cost: Decimal) {
        self.execution_cost = execution_cost;
        self.slippage_cost = slippage_cost;
        self.net_profit_usd = self.gross_profit_usd - execution_cost - slippage_cost;
    }

    /// Age since detection on the monotonic clock.
    pub fn age(&self) -> Duration {
        self.detected_mono.elapsed()
    }

    pub fn weights_sum(&self) -> f64 {
        self.legs.iter().map(|l| l.weight).sum()
    }

    /// Expected profit per unit of risk, used as the ranking input.
    pub fn compute_risk_adjusted_return(&self) -> f64 {
        let net = self.net_profit_usd.to_f64().unwrap_or(0.0).max(0.0);
        let volatility_adjustment = 1.0 - (self.volatility_risk * 0.5);
        net * volatility_adjustment * self.liquidity_score * self.confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_id_format() {
        let id = Opportunity::generate_id(StrategyKind::SpotPerp, "BTC-USDT");
        assert!(id.starts_with("SPOT_PERP_BTC-USDT_"));
        let suffix = id.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 4);
        assert!(suffix.parse::<u32>().is_ok());
    }

    #[test]
    fn test_net_profit_identity() {
        let mut opp = Opportunity::new(StrategyKind::CrossVenue, "ETH-USDT");
        opp.gross_profit_usd = dec!(100);
        opp.finalize_costs(dec!(12), dec!(3));
        assert_eq!(opp.net_profit_usd, dec!(85));
        assert_eq!(
            opp.net_profit_usd,
            opp.gross_profit_usd - opp.execution_cost - opp.slippage_cost
        );
        // Net never exceeds gross for non-negative costs
        assert!(opp.net_profit_usd <= opp.gross_profit_usd);
    }

    #[test]
    fn test_weights_sum() {
        let mut opp = Opportunity::new(StrategyKind::SpotPerp, "BTC-USDT");
        opp.legs.push(Leg::new(
            "binance",
            "BTC-USDT-PERP",
            Side::Sell,
            dec!(1),
            dec!(43480),
            0.5,
        ));
        opp.legs.push(Leg::new(
            "binance",
            "BTC-USDT",
            Side::Buy,
            dec!(1),
            dec!(43500),
            0.5,
        ));
        assert!((opp.weights_sum() - 1.0).abs() < 1e-9);
    }
}
