pub mod candle;
pub mod market_data;
pub mod timeframe;

pub use candle::{Candle, validate_series};
pub use market_data::MarketData;
pub use timeframe::Timeframe;
