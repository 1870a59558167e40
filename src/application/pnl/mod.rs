mod analytics;
mod tracker;

pub use analytics::PerformanceAnalytics;
pub use tracker::{PnlReport, PnlSnapshot, PnlTracker};
