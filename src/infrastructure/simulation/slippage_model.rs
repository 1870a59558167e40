use crate::domain::market::Side;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

/// Execution-price slippage model for simulated fills.
pub trait SlippageModel: Send + Sync {
    /// Effective execution price given the quoted price and order size.
    fn execution_price(&self, price: Decimal, quantity: Decimal, side: Side) -> Decimal;
}

/// Random slippage within a volatility band plus a fixed adverse impact:
/// buys fill a touch higher, sells a touch lower, with occasional positive
/// slippage inside the noise band.
#[derive(Debug, Clone)]
pub struct VolatilitySlippage {
    /// Half-width of the noise band as a fraction (0.0005 = 5 bps).
    volatility_factor: f64,
}

impl VolatilitySlippage {
    pub fn new(volatility_factor: f64) -> Self {
        Self { volatility_factor }
    }
}

impl SlippageModel for VolatilitySlippage {
    fn execution_price(&self, price: Decimal, _quantity: Decimal, side: Side) -> Decimal {
        let mut rng = rand::rng();
        let noise = rng.random_range(-self.volatility_factor..=self.volatility_factor);
        let impact = self.volatility_factor * 0.2;

        let pct_change = match side {
            Side::Buy => impact + noise,
            Side::Sell => -(impact + noise),
        };

        let adjusted = price.to_f64().unwrap_or(0.0) * (1.0 + pct_change);
        Decimal::from_f64(adjusted.max(0.0)).unwrap_or(price)
    }
}

/// Perfect execution at the quoted price.
pub struct ZeroSlippage;

impl SlippageModel for ZeroSlippage {
    fn execution_price(&self, price: Decimal, _quantity: Decimal, _side: Side) -> Decimal {
        price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_slippage_bounded_by_band() {
        let model = VolatilitySlippage::new(0.01);
        let price = dec!(100);
        for _ in 0..100 {
            let exec = model.execution_price(price, Decimal::ONE, Side::Buy);
            let diff = (exec - price).abs();
            // Band plus impact: at most ~1.2% of price
            assert!(diff < dec!(1.5), "slippage {diff} outside band");
        }
    }

    #[test]
    fn test_adverse_bias_direction() {
        let model = VolatilitySlippage::new(0.001);
        let price = dec!(100);
        let mut buy_total = Decimal::ZERO;
        let mut sell_total = Decimal::ZERO;
        for _ in 0..500 {
            buy_total += model.execution_price(price, Decimal::ONE, Side::Buy);
            sell_total += model.execution_price(price, Decimal::ONE, Side::Sell);
        }
        // The fixed impact pushes average buys above average sells
        assert!(buy_total > sell_total);
    }

    #[test]
    fn test_zero_slippage_identity() {
        let exec = ZeroSlippage.execution_price(dec!(100), Decimal::ONE, Side::Sell);
        assert_eq!(exec, dec!(100));
    }
}
