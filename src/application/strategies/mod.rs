mod composite;
mod ma_cross;
mod macd;
mod rsi;
pub mod strategy_factory;
mod traits;

pub use composite::CompositeStrategy;
pub use ma_cross::{MaCrossStrategy, MaType};
pub use macd::MacdStrategy;
pub use rsi::RsiStrategy;
pub use strategy_factory::StrategyFactory;
pub use traits::Strategy;
