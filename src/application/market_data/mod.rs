mod cache;

pub use cache::{CacheSnapshot, MarketDataCache};
