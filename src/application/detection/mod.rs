mod basis;
mod cross_venue;
mod detector;
mod funding_rate;
mod spot_perp;
mod statistical;
mod volatility;

pub use detector::{DetectorMetrics, OpportunityDetector, StrategyContext};
