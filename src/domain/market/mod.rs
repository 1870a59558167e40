mod price_series;
mod quote;

pub use price_series::{PricePoint, PriceSeries};
pub use quote::{ChannelKind, ConnectionState, MarketKey, Quote, Side, VenueEvent};
