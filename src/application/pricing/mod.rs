mod option_model;
mod synthetic_pricer;

pub use option_model::{OptionInputs, black_scholes};
pub use synthetic_pricer::SyntheticPricer;
