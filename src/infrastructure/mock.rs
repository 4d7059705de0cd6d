//! In-memory test doubles for the data-source seam.

use crate::domain::errors::{WatchError, WatchResult};
use crate::domain::market::{Candle, Timeframe};
use crate::infrastructure::datasource::DataSource;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

/// Candle feed backed by canned series, keyed by (symbol, timeframe).
///
/// Unknown symbols answer with `NotFound`, mirroring how the real
/// adapters classify exchange "unknown symbol" responses.
pub struct MockDataSource {
    series: RwLock<HashMap<(String, Timeframe), Vec<Candle>>>,
    transient_failures: RwLock<HashMap<String, u32>>,
    calls: AtomicU32,
}

impl MockDataSource {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            transient_failures: RwLock::new(HashMap::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Registers a close-price walk for (symbol, timeframe); candles
    /// are synthesized around the closes with a 1% wick.
    pub fn with_series(self, symbol: &str, timeframe: Timeframe, closes: &[f64]) -> Self {
        self.add_series(symbol, timeframe, closes);
        self
    }

    pub fn add_series(&self, symbol: &str, timeframe: Timeframe, closes: &[f64]) {
        let candles = candles_from_closes(symbol, timeframe, closes);
        self.series
            .write()
            .expect("mock series lock")
            .insert((symbol.to_string(), timeframe), candles);
    }

    pub fn add_candles(&self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        self.series
            .write()
            .expect("mock series lock")
            .insert((symbol.to_string(), timeframe), candles);
    }

    /// The next `count` requests for `symbol` fail transiently.
    pub fn fail_transiently(&self, symbol: &str, count: u32) {
        self.transient_failures
            .write()
            .expect("mock failure lock")
            .insert(symbol.to_string(), count);
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn known_symbols(&self) -> HashSet<String> {
        self.series
            .read()
            .expect("mock series lock")
            .keys()
            .map(|(s, _)| s.clone())
            .collect()
    }
}

impl Default for MockDataSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        _start: Option<DateTime<Utc>>,
        _end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> WatchResult<Vec<Candle>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        {
            let mut failures = self.transient_failures.write().expect("mock failure lock");
            if let Some(remaining) = failures.get_mut(symbol)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(WatchError::transient("mock: injected failure"));
            }
        }

        let series = self.series.read().expect("mock series lock");
        let candles = series
            .get(&(symbol.to_string(), timeframe))
            .ok_or_else(|| WatchError::not_found(format!("mock: no series for {}", symbol)))?;

        let mut out = candles.clone();
        if out.len() > limit {
            out.drain(..out.len() - limit);
        }
        Ok(out)
    }

    async fn is_symbol_valid(&self, symbol: &str) -> WatchResult<bool> {
        Ok(self.known_symbols().contains(symbol))
    }
}

/// Synthesizes a valid candle series from a close-price walk, aligned
/// to the timeframe boundary starting 2024-01-01 UTC.
pub fn candles_from_closes(symbol: &str, timeframe: Timeframe, closes: &[f64]) -> Vec<Candle> {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let step = Duration::seconds(timeframe.to_seconds());
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let c = Decimal::from_f64(close).unwrap_or(Decimal::ONE);
            let open = if i == 0 {
                c
            } else {
                Decimal::from_f64(closes[i - 1]).unwrap_or(c)
            };
            let body_high = open.max(c);
            let body_low = open.min(c);
            let wick = Decimal::from_f64(1.01).unwrap();
            let open_time = t0 + step * i as i32;
            Candle {
                symbol: symbol.to_string(),
                open_time,
                close_time: open_time + step,
                open,
                high: body_high * wick,
                low: body_low / wick,
                close: c,
                volume: Decimal::from(100),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::validate_series;

    #[tokio::test]
    async fn serves_registered_series() {
        let source = MockDataSource::new().with_series(
            "BTCUSDT",
            Timeframe::OneHour,
            &[100.0, 101.0, 102.0, 103.0],
        );

        let candles = source
            .get_klines("BTCUSDT", Timeframe::OneHour, None, None, 3)
            .await
            .unwrap();
        assert_eq!(candles.len(), 3);
        validate_series(&candles).unwrap();
        assert!(source.is_symbol_valid("BTCUSDT").await.unwrap());
        assert!(!source.is_symbol_valid("ETHUSDT").await.unwrap());
    }

    #[tokio::test]
    async fn injected_failures_run_out() {
        let source =
            MockDataSource::new().with_series("BTCUSDT", Timeframe::OneDay, &[1.0, 2.0, 3.0]);
        source.fail_transiently("BTCUSDT", 2);

        for _ in 0..2 {
            let err = source
                .get_klines("BTCUSDT", Timeframe::OneDay, None, None, 3)
                .await
                .unwrap_err();
            assert!(err.is_retryable());
        }
        assert!(
            source
                .get_klines("BTCUSDT", Timeframe::OneDay, None, None, 3)
                .await
                .is_ok()
        );
    }

    #[test]
    fn synthesized_candles_are_valid() {
        let candles = candles_from_closes("ETHUSDT", Timeframe::OneDay, &[10.0, 12.0, 9.0, 11.0]);
        validate_series(&candles).unwrap();
        assert_eq!(
            candles[1].open_time - candles[0].open_time,
            Duration::days(1)
        );
    }
}
