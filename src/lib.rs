//! Technical-analysis watcher for cryptocurrency spot markets.
//!
//! The engine pulls OHLCV candles from spot exchanges, synthesizes
//! cross-rates for unlisted pairs via a bridge currency, evaluates
//! indicator strategies over a {symbol x timeframe} matrix, and
//! batches the resulting signals into consolidated notifications.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::rate_calculator::RateCalculator;
pub use application::strategies::{Strategy, StrategyFactory};
pub use application::validator::{AssetValidator, ValidationResult};
pub use application::watcher::{SignalInfo, Watcher, WatcherConfig, WatcherStats};
pub use config::Config;
pub use domain::errors::{WatchError, WatchResult};
pub use domain::market::{Candle, MarketData, Timeframe};
pub use domain::signal::{Signal, StrategyResult, Strength};
pub use infrastructure::datasource::{BinanceSource, CoinbaseSource, DataSource};
pub use infrastructure::notifier::{Notification, Notifier, NotifierManager};
