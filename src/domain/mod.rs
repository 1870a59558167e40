// Market data domain
pub mod market;

// Derivative fair-value domain
pub mod pricing;

// Arbitrage opportunity domain
pub mod opportunity;

// Execution planning domain
pub mod execution;

// Position and trade domain
pub mod position;

// Risk metrics and alerts
pub mod risk;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;
