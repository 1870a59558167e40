mod manager;

pub use manager::{PositionLimits, PositionManager};
