use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// The assembled input of one strategy evaluation: an ordered candle
/// series for a single (symbol, timeframe) cell. Never mutated after
/// construction.
#[derive(Debug, Clone)]
pub struct MarketData {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
    pub assembled_at: DateTime<Utc>,
}

impl MarketData {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            candles,
            assembled_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Close prices as f64, in candle order. Indicator kernels work in
    /// IEEE-754 doubles.
    pub fn closes(&self) -> Vec<f64> {
        self.candles
            .iter()
            .map(|c| c.close.to_f64().unwrap_or(0.0))
            .collect()
    }

    pub fn last_close(&self) -> Option<Decimal> {
        self.candles.last().map(|c| c.close)
    }

    pub fn last_open_time(&self) -> Option<DateTime<Utc>> {
        self.candles.last().map(|c| c.open_time)
    }
}
