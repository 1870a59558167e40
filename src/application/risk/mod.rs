mod monitor;
mod var;

pub use monitor::RiskMonitor;
pub use var::MonteCarloVar;
