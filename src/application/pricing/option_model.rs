use crate::domain::errors::EngineError;
use crate::domain::pricing::OptionKind;
use statrs::distribution::{ContinuousCDF, Normal};

/// Inputs to the Black-Scholes model. Rates and volatility are annualized,
/// time to expiry is in years.
#[derive(Debug, Clone, Copy)]
pub struct OptionInputs {
    pub spot: f64,
    pub strike: f64,
    pub time_to_expiry: f64,
    pub volatility: f64,
    pub risk_free_rate: f64,
    pub kind: OptionKind,
}

/// European option price under Black-Scholes.
///
/// Degenerate inputs (expired, zero vol, non-positive spot or strike) report
/// `ModelUnavailable` rather than extrapolating.
pub fn black_scholes(inputs: &OptionInputs) -> Result<f64, EngineError> {
    let OptionInputs {
        spot,
        strike,
        time_to_expiry: tau,
        volatility: sigma,
        risk_free_rate: r,
        kind,
    } = *inputs;

    if spot <= 0.0 || strike <= 0.0 {
        return Err(EngineError::ModelUnavailable {
            reason: "non-positive spot or strike".to_string(),
        });
    }
    if tau <= 0.0 {
        return Err(EngineError::ModelUnavailable {
            reason: "option expired".to_string(),
        });
    }
    if sigma <= 0.0 {
        return Err(EngineError::ModelUnavailable {
            reason: "implied volatility unavailable".to_string(),
        });
    }

    let normal = Normal::new(0.0, 1.0).map_err(|e| EngineError::ModelUnavailable {
        reason: e.to_string(),
    })?;

    let sqrt_tau = tau.sqrt();
    let d1 = ((spot / strike).ln() + (r + sigma * sigma / 2.0) * tau) / (sigma * sqrt_tau);
    let d2 = d1 - sigma * sqrt_tau;
    let discount = (-r * tau).exp();

    let price = match kind {
        OptionKind::Call => spot * normal.cdf(d1) - strike * discount * normal.cdf(d2),
        OptionKind::Put => strike * discount * normal.cdf(-d2) - spot * normal.cdf(-d1),
    };

    Ok(price.max(0.0))
}
