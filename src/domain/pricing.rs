use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Model that produced a synthetic fair value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingModel {
    PerpSynthetic,
    FutureCostOfCarry,
    OptionBlackScholes,
}

impl fmt::Display for PricingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PricingModel::PerpSynthetic => "perp_synthetic",
            PricingModel::FutureCostOfCarry => "future_cost_of_carry",
            PricingModel::OptionBlackScholes => "option_bs",
        };
        write!(f, "{s}")
    }
}

/// Additive breakdown of a synthetic price.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PriceComponents {
    pub base_price: f64,
    pub funding_adjustment: f64,
    pub carry: f64,
    pub convenience_yield: f64,
    pub vol_component: f64,
}

/// Fair value derived from spot plus carry and funding inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticPrice {
    pub instrument_id: String,
    pub price: Decimal,
    pub model: PricingModel,
    /// Input freshness and coverage, in [0, 1].
    pub confidence: f64,
    pub components: PriceComponents,
    pub timestamp: DateTime<Utc>,
}

/// Option payoff direction for the Black-Scholes model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Call,
    Put,
}
