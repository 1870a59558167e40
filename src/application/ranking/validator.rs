use crate::application::market_data::CacheSnapshot;
use crate::config::{PricingConfig, TradingConfig};
use crate::domain::opportunity::Opportunity;
use std::time::Duration;
use tracing::debug;

/// Applies the validation gates to detector candidates.
///
/// A failed gate is an expected outcome, not an error: the candidate comes
/// back non-executable with the failed gate names joined into its notes.
pub struct OpportunityValidator {
    trading: TradingConfig,
    pricing: PricingConfig,
    /// Debug mode: surface non-executable candidates instead of dropping them.
    keep_rejected: bool,
}

impl OpportunityValidator {
    pub fn new(trading: TradingConfig, pricing: PricingConfig) -> Self {
        Self {
            trading,
            pricing,
            keep_rejected: false,
        }
    }

    pub fn keep_rejected(mut self, keep: bool) -> Self {
        self.keep_rejected = keep;
        self
    }

    pub fn update_config(&mut self, trading: TradingConfig, pricing: PricingConfig) {
        self.trading = trading;
        self.pricing = pricing;
    }

    /// Runs every gate, stamps the flags and notes, and reports the verdict.
    pub fn validate(&self, opp: &mut Opportunity, snapshot: &CacheSnapshot) -> bool {
        let mut issues: Vec<&str> = Vec::new();

        if opp.gross_profit_usd < self.trading.min_profit_usd {
            issues.push("Profit below USD threshold");
        }
        if opp.percentage_spread < self.trading.min_profit_pct {
            issues.push("Profit below percentage threshold");
        }
        if opp.confidence < self.trading.min_confidence {
            issues.push("Confidence score too low");
        }
        if opp.liquidity_score < self.trading.min_liquidity {
            issues.push("Insufficient liquidity");
        }
        if opp.required_capital > self.trading.max_position_usd {
            issues.push("Required capital exceeds position limit");
        }
        if self.correlation_risk(opp) > self.trading.max_correlation {
            issues.push("Correlation risk too high");
        }
        if opp.estimated_duration < Duration::from_millis(self.trading.min_opportunity_duration_ms)
        {
            issues.push("Opportunity window too short");
        }
        if opp.legs.is_empty() {
            issues.push("No execution legs defined");
        }
        if opp.legs.iter().any(|leg| !snapshot.contains(&leg.key())) {
            issues.push("Missing market data for legs");
        }
        if opp.age() > Duration::from_millis(self.trading.max_data_age_ms) {
            issues.push("Market data too stale");
        }

        opp.validation_notes = issues.join("; ");
        opp.is_valid = issues.is_empty();
        opp.is_executable = opp.is_valid;

        if !opp.is_valid {
            debug!(
                "OpportunityValidator: {} rejected ({})",
                opp.id, opp.validation_notes
            );
        }
        opp.is_valid
    }

    /// Validates a detection batch. Non-executable candidates are dropped
    /// unless debug mode keeps them (flags and notes populated either way).
    pub fn validate_all(
        &self,
        mut candidates: Vec<Opportunity>,
        snapshot: &CacheSnapshot,
    ) -> Vec<Opportunity> {
        let total = candidates.len();
        for opp in candidates.iter_mut() {
            self.validate(opp, snapshot);
        }
        let result: Vec<Opportunity> = if self.keep_rejected {
            candidates
        } else {
            candidates.into_iter().filter(|o| o.is_executable).collect()
        };
        debug!(
            "OpportunityValidator: {} of {} candidates executable",
            result.iter().filter(|o| o.is_executable).count(),
            total
        );
        result
    }

    /// Correlation between the legs. Multi-leg trades on the same underlying
    /// assume the configured default; single-leg trades carry none.
    fn correlation_risk(&self, opp: &Opportunity) -> f64 {
        if opp.legs.len() <= 1 {
            0.0
        } else {
            self.pricing.default_leg_correlation
        }
    }
}
