use crate::config::RankingConfig;
use crate::domain::opportunity::Opportunity;
use rust_decimal::prelude::ToPrimitive;
use statrs::statistics::{Data, Distribution};
use tracing::debug;

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// An opportunity with its normalized sub-scores and final rank.
#[derive(Debug, Clone)]
pub struct RankedOpportunity {
    pub opportunity: Opportunity,
    pub profit_score: f64,
    pub risk_adjusted_score: f64,
    pub sharpe_score: f64,
    pub capital_efficiency_score: f64,
    pub liquidity_score: f64,
    pub execution_probability: f64,
    pub composite_score: f64,
    pub rank: usize,
}

/// Summary statistics over one detection batch.
#[derive(Debug, Clone, Default)]
pub struct OpportunityStatistics {
    pub total: usize,
    pub ranked: usize,
    pub mean_profit_pct: f64,
    pub std_profit_pct: f64,
    pub mean_risk: f64,
    pub std_risk: f64,
    pub mean_capital_required: f64,
}

/// Scores validated opportunities and sorts them into execution order.
pub struct OpportunityRanker {
    config: RankingConfig,
}

impl OpportunityRanker {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    pub fn update_config(&mut self, config: RankingConfig) {
        self.config = config;
    }

    /// Scores each candidate and returns the list sorted by composite score
    /// descending. Ties preserve detection order (earlier first, then id).
    pub fn rank(&self, opportunities: Vec<Opportunity>) -> Vec<RankedOpportunity> {
        if opportunities.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<RankedOpportunity> = opportunities
            .into_iter()
            .map(|opp| self.score(opp))
            .collect();

        ranked.sort_by(|a, b| {
            b.composite_score
                .partial_cmp(&a.composite_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.opportunity.detected_at.cmp(&b.opportunity.detected_at))
                .then_with(|| a.opportunity.id.cmp(&b.opportunity.id))
        });

        for (i, entry) in ranked.iter_mut().enumerate() {
            entry.rank = i + 1;
        }

        debug!("OpportunityRanker: ranked {} opportunities", ranked.len());
        ranked
    }

    fn score(&self, opp: Opportunity) -> RankedOpportunity {
        // Sub-scores work in return fractions; the spread is carried in percent.
        let profit_pct = opp.expected_profit_pct;
        let profit_fraction = profit_pct / 100.0;
        let risk = opp.risk_score.max(0.001);
        let capital = opp.required_capital.to_f64().unwrap_or(0.0).max(1.0);

        let profit_score = clamp01(profit_pct / 10.0);
        let risk_adjusted_score = clamp01((profit_fraction / risk) / 10.0);
        let sharpe_score =
            clamp01(((profit_fraction - self.config.risk_free_rate) / risk) / 3.0);
        let capital_efficiency_score = clamp01((profit_fraction / capital) / 1e-3);
        let liquidity_score = clamp01(opp.liquidity_score);
        // Not part of the composite; confidence already carries it.
        let market_adjustment = 1.0;
        let execution_probability =
            clamp01(opp.confidence * (1.0 - opp.risk_score) * market_adjustment);

        let composite_score = self.config.profit_weight * profit_score
            + self.config.risk_weight * risk_adjusted_score
            + self.config.sharpe_weight * sharpe_score
            + self.config.capital_efficiency_weight * capital_efficiency_score
            + self.config.liquidity_weight * liquidity_score;

        RankedOpportunity {
            opportunity: opp,
            profit_score,
            risk_adjusted_score,
            sharpe_score,
            capital_efficiency_score,
            liquidity_score,
            execution_probability,
            composite_score,
            rank: 0,
        }
    }

    /// Batch statistics over raw candidates, before any filtering.
    pub fn statistics(&self, opportunities: &[Opportunity]) -> OpportunityStatistics {
        let mut stats = OpportunityStatistics {
            total: opportunities.len(),
            ..OpportunityStatistics::default()
        };
        if opportunities.is_empty() {
            return stats;
        }

        let profits: Vec<f64> = opportunities.iter().map(|o| o.expected_profit_pct).collect();
        let risks: Vec<f64> = opportunities.iter().map(|o| o.risk_score).collect();
        let capitals: Vec<f64> = opportunities
            .iter()
            .map(|o| o.required_capital.to_f64().unwrap_or(0.0))
            .collect();

        let profit_data = Data::new(profits);
        let risk_data = Data::new(risks);
        let capital_data = Data::new(capitals);

        stats.mean_profit_pct = profit_data.mean().unwrap_or(0.0);
        stats.std_profit_pct = profit_data.std_dev().unwrap_or(0.0);
        stats.mean_risk = risk_data.mean().unwrap_or(0.0);
        stats.std_risk = risk_data.std_dev().unwrap_or(0.0);
        stats.mean_capital_required = capital_data.mean().unwrap_or(0.0);
        stats.ranked = opportunities.iter().filter(|o| o.is_executable).count();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::opportunity::StrategyKind;
    use rust_decimal_macros::dec;

    fn opportunity(pct: f64, risk: f64, liquidity: f64) -> Opportunity {
        let mut opp = Opportunity::new(StrategyKind::CrossVenue, "BTC-USDT");
        opp.expected_profit_pct = pct;
        opp.risk_score = risk;
        opp.liquidity_score = liquidity;
        opp.confidence = 0.8;
        opp.required_capital = dec!(10000);
        opp
    }

    fn ranker() -> OpportunityRanker {
        OpportunityRanker::new(RankingConfig::default())
    }

    #[test]
    fn test_sorted_descending_with_ranks() {
        let ranked = ranker().rank(vec![
            opportunity(0.1, 0.5, 0.5),
            opportunity(5.0, 0.2, 0.9),
            opportunity(1.0, 0.4, 0.7),
        ]);
        assert_eq!(ranked.len(), 3);
        assert!(ranked[0].composite_score >= ranked[1].composite_score);
        assert!(ranked[1].composite_score >= ranked[2].composite_score);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[2].rank, 3);
        // The 5% spread with low risk and deep liquidity wins
        assert!((ranked[0].opportunity.expected_profit_pct - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_equal_scores_preserve_detection_order() {
        let first = opportunity(1.0, 0.4, 0.7);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = opportunity(1.0, 0.4, 0.7);
        // Feed in reverse detection order
        let ranked = ranker().rank(vec![second.clone(), first.clone()]);
        assert_eq!(ranked[0].opportunity.id, first.id);
        assert_eq!(ranked[1].opportunity.id, second.id);
    }

    #[test]
    fn test_scores_clamped_to_unit_interval() {
        let ranked = ranker().rank(vec![opportunity(500.0, 0.0001, 3.0)]);
        let r = &ranked[0];
        for score in [
            r.profit_score,
            r.risk_adjusted_score,
            r.sharpe_score,
            r.capital_efficiency_score,
            r.liquidity_score,
            r.execution_probability,
        ] {
            assert!((0.0..=1.0).contains(&score), "score {score} out of range");
        }
        assert!(r.composite_score <= 1.0);
    }

    #[test]
    fn test_statistics() {
        let stats = ranker().statistics(&[opportunity(1.0, 0.2, 0.5), opportunity(3.0, 0.4, 0.5)]);
        assert_eq!(stats.total, 2);
        assert!((stats.mean_profit_pct - 2.0).abs() < 1e-9);
        assert!((stats.mean_risk - 0.3).abs() < 1e-9);
        assert!((stats.mean_capital_required - 10000.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_batch() {
        assert!(ranker().rank(Vec::new()).is_empty());
        assert_eq!(ranker().statistics(&[]).total, 0);
    }
}
