mod fill_simulator;
mod latency_model;
mod slippage_model;

pub use fill_simulator::SimulatedRouter;
pub use latency_model::{LatencyModel, NetworkLatency, ZeroLatency};
pub use slippage_model::{SlippageModel, VolatilitySlippage, ZeroSlippage};
