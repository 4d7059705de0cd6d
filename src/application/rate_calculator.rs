use crate::domain::errors::{WatchError, WatchResult};
use crate::domain::indicators::safe_div;
use crate::domain::market::{Candle, Timeframe, validate_series};
use crate::infrastructure::datasource::DataSource;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Floor on aligned candles so downstream indicators stay stable.
pub const MIN_RATE_POINTS: usize = 30;
/// A single candle whose high/low ratio exceeds this is treated as an
/// alignment artifact and dropped.
const MAX_WICK_RATIO: f64 = 10.0;

/// Synthesizes OHLC series for pairs the active exchange does not
/// list, by dividing two legs that share a bridge currency:
/// `base/quote = (base/bridge) / (quote/bridge)`.
pub struct RateCalculator {
    source: Arc<dyn DataSource>,
}

impl RateCalculator {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self { source }
    }

    /// Builds `limit` synthetic candles for `base/quote` via `bridge`.
    pub async fn rate_candles(
        &self,
        base: &str,
        quote: &str,
        bridge: &str,
        timeframe: Timeframe,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> WatchResult<Vec<Candle>> {
        if base.is_empty() || quote.is_empty() || bridge.is_empty() {
            return Err(WatchError::invalid_argument(
                "base, quote and bridge must be non-empty",
            ));
        }
        if base == quote {
            return Err(WatchError::invalid_argument(format!(
                "cannot derive a rate of {} against itself",
                base
            )));
        }

        let leg_limit = limit.max(MIN_RATE_POINTS);
        let base_leg = format!("{}{}", base, bridge);
        let quote_leg = format!("{}{}", quote, bridge);

        let base_candles = self
            .source
            .get_klines(&base_leg, timeframe, start, end, leg_limit)
            .await?;
        let quote_candles = self
            .source
            .get_klines(&quote_leg, timeframe, start, end, leg_limit)
            .await?;

        if base_candles.len() < MIN_RATE_POINTS {
            return Err(WatchError::InsufficientData {
                need: MIN_RATE_POINTS,
                have: base_candles.len(),
            });
        }
        if quote_candles.len() < MIN_RATE_POINTS {
            return Err(WatchError::InsufficientData {
                need: MIN_RATE_POINTS,
                have: quote_candles.len(),
            });
        }

        let pair = format!("{}{}", base, quote);
        let mut synthesized = synthesize_pair(&pair, &base_candles, &quote_candles);

        if synthesized.len() < MIN_RATE_POINTS {
            return Err(WatchError::InsufficientData {
                need: MIN_RATE_POINTS,
                have: synthesized.len(),
            });
        }

        if synthesized.len() > limit {
            synthesized.drain(..synthesized.len() - limit);
        }
        validate_series(&synthesized)?;

        debug!(pair = %pair, bridge, timeframe = %timeframe, count = synthesized.len(), "rate candles synthesized");
        Ok(synthesized)
    }

    /// Probes which `symbol+bridge` pairs the source can serve at the
    /// daily timeframe. Returns (available, unavailable).
    pub async fn available_rate_pairs(
        &self,
        symbols: &[String],
        bridge: &str,
    ) -> WatchResult<(Vec<String>, Vec<String>)> {
        let mut available = Vec::new();
        let mut unavailable = Vec::new();

        for symbol in symbols {
            let pair = format!("{}{}", symbol, bridge);
            match self.source.is_symbol_valid(&pair).await {
                Ok(true) => available.push(symbol.clone()),
                Ok(false) => unavailable.push(symbol.clone()),
                Err(WatchError::Cancelled) => return Err(WatchError::Cancelled),
                Err(err) => {
                    debug!(pair = %pair, error = %err, "rate pair probe failed");
                    unavailable.push(symbol.clone());
                }
            }
        }
        Ok((available, unavailable))
    }
}

/// Aligns two legs on open time and derives one synthetic candle per
/// shared timestamp. Open and close divide like-for-like; high and
/// low are the extremes of the six positive, finite ratio candidates.
/// Candles failing the sanity rules are dropped.
fn synthesize_pair(pair: &str, base: &[Candle], quote: &[Candle]) -> Vec<Candle> {
    let quote_by_time: HashMap<i64, &Candle> = quote
        .iter()
        .map(|c| (c.open_time.timestamp(), c))
        .collect();

    let mut out = Vec::new();
    for b in base {
        let Some(q) = quote_by_time.get(&b.open_time.timestamp()) else {
            continue;
        };

        let open = safe_div(to_f64(b.open), to_f64(q.open));
        let close = safe_div(to_f64(b.close), to_f64(q.close));

        let candidates = [
            open,
            safe_div(to_f64(b.open), to_f64(q.close)),
            safe_div(to_f64(b.high), to_f64(q.low)),
            safe_div(to_f64(b.low), to_f64(q.high)),
            safe_div(to_f64(b.close), to_f64(q.open)),
            close,
        ];
        let mut high = f64::NEG_INFINITY;
        let mut low = f64::INFINITY;
        for candidate in candidates {
            if candidate > 0.0 && candidate.is_finite() {
                high = high.max(candidate);
                low = low.min(candidate);
            }
        }

        if open <= 0.0 || close <= 0.0 || low <= 0.0 || !high.is_finite() {
            continue;
        }
        if high < low || safe_div(high, low) > MAX_WICK_RATIO {
            continue;
        }

        let (Some(open), Some(high), Some(low), Some(close)) = (
            Decimal::from_f64(open),
            Decimal::from_f64(high),
            Decimal::from_f64(low),
            Decimal::from_f64(close),
        ) else {
            continue;
        };

        out.push(Candle {
            symbol: pair.to_string(),
            open_time: b.open_time,
            close_time: b.close_time,
            open,
            high,
            low,
            close,
            // A synthetic series carries no traded volume.
            volume: Decimal::ZERO,
        });
    }
    out
}

fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::{MockDataSource, candles_from_closes};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn shifted(candles: Vec<Candle>, by: Duration) -> Vec<Candle> {
        candles
            .into_iter()
            .map(|mut c| {
                c.open_time += by;
                c.close_time += by;
                c
            })
            .collect()
    }

    #[tokio::test]
    async fn synthesizes_cross_rate() {
        let btc: Vec<f64> = (0..50).map(|i| 60_000.0 + i as f64 * 100.0).collect();
        let eth: Vec<f64> = (0..50).map(|i| 3_000.0 + i as f64 * 10.0).collect();
        let source = Arc::new(
            MockDataSource::new()
                .with_series("BTCUSDT", Timeframe::OneDay, &btc)
                .with_series("ETHUSDT", Timeframe::OneDay, &eth),
        );

        let calculator = RateCalculator::new(source);
        let candles = calculator
            .rate_candles("BTC", "ETH", "USDT", Timeframe::OneDay, None, None, 20)
            .await
            .unwrap();

        assert_eq!(candles.len(), 20);
        validate_series(&candles).unwrap();
        assert!(candles.iter().all(|c| c.volume == Decimal::ZERO));
        assert!(candles.iter().all(|c| c.symbol == "BTCETH"));

        // Last candle: open = base.open / quote.open within 1e-9.
        let expected_open = btc[48] / eth[48]; // mock open = previous close
        let open = candles.last().unwrap().open.to_f64().unwrap();
        assert!((open - expected_open).abs() < 1e-9);
    }

    #[tokio::test]
    async fn zero_alignment_is_insufficient_data() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let source = MockDataSource::new().with_series("BTCUSDT", Timeframe::OneDay, &closes);
        // Quote leg shifted by 12 hours: no shared open times.
        source.add_candles(
            "ETHUSDT",
            Timeframe::OneDay,
            shifted(
                candles_from_closes("ETHUSDT", Timeframe::OneDay, &closes),
                Duration::hours(12),
            ),
        );

        let calculator = RateCalculator::new(Arc::new(source));
        let err = calculator
            .rate_candles("BTC", "ETH", "USDT", Timeframe::OneDay, None, None, 20)
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::InsufficientData { have: 0, .. }));
    }

    #[tokio::test]
    async fn short_leg_is_insufficient_data() {
        let source = Arc::new(
            MockDataSource::new()
                .with_series("BTCUSDT", Timeframe::OneDay, &vec![100.0; 10])
                .with_series("ETHUSDT", Timeframe::OneDay, &vec![10.0; 50]),
        );

        let calculator = RateCalculator::new(source);
        let err = calculator
            .rate_candles("BTC", "ETH", "USDT", Timeframe::OneDay, None, None, 20)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WatchError::InsufficientData { need: 30, have: 10 }
        ));
    }

    #[tokio::test]
    async fn missing_leg_propagates_not_found() {
        let source = Arc::new(MockDataSource::new().with_series(
            "BTCUSDT",
            Timeframe::OneDay,
            &vec![100.0; 50],
        ));

        let calculator = RateCalculator::new(source);
        let err = calculator
            .rate_candles("BTC", "ETH", "USDT", Timeframe::OneDay, None, None, 20)
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::NotFound(_)));
    }

    #[test]
    fn unphysical_wicks_are_rejected() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let candle = |open: Decimal, high: Decimal, low: Decimal, close: Decimal| Candle {
            symbol: "X".to_string(),
            open_time: t0,
            close_time: t0 + Duration::days(1),
            open,
            high,
            low,
            close,
            volume: dec!(1),
        };

        // base high / quote low = 1000 / 1 blows past the wick guard.
        let base = [candle(dec!(100), dec!(1000), dec!(90), dec!(110))];
        let quote = [candle(dec!(10), dec!(20), dec!(1), dec!(11))];
        assert!(synthesize_pair("XY", &base, &quote).is_empty());

        // Sane legs survive.
        let base = [candle(dec!(100), dec!(112), dec!(95), dec!(110))];
        let quote = [candle(dec!(10), dec!(11), dec!(9.5), dec!(10.5))];
        let out = synthesize_pair("XY", &base, &quote);
        assert_eq!(out.len(), 1);
        out[0].validate().unwrap();
    }

    #[test]
    fn open_and_close_divide_like_for_like() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mk = |open: f64, high: f64, low: f64, close: f64| Candle {
            symbol: "X".to_string(),
            open_time: t0,
            close_time: t0 + Duration::days(1),
            open: Decimal::from_f64(open).unwrap(),
            high: Decimal::from_f64(high).unwrap(),
            low: Decimal::from_f64(low).unwrap(),
            close: Decimal::from_f64(close).unwrap(),
            volume: Decimal::ONE,
        };

        let base = [mk(50.0, 55.0, 48.0, 52.0)];
        let quote = [mk(10.0, 10.4, 9.8, 10.2)];
        let out = synthesize_pair("XY", &base, &quote);
        assert_eq!(out.len(), 1);
        assert!((out[0].open.to_f64().unwrap() - 5.0).abs() < 1e-12);
        assert!((out[0].close.to_f64().unwrap() - 52.0 / 10.2).abs() < 1e-12);
        // High is the extreme candidate base.high / quote.low.
        assert!((out[0].high.to_f64().unwrap() - 55.0 / 9.8).abs() < 1e-12);
        assert!((out[0].low.to_f64().unwrap() - 48.0 / 10.4).abs() < 1e-12);
    }

    #[tokio::test]
    async fn probes_rate_pairs() {
        let source = Arc::new(
            MockDataSource::new()
                .with_series("BTCUSDT", Timeframe::OneDay, &vec![100.0; 5])
                .with_series("ETHUSDT", Timeframe::OneDay, &vec![10.0; 5]),
        );
        let calculator = RateCalculator::new(source);

        let (available, unavailable) = calculator
            .available_rate_pairs(
                &["BTC".to_string(), "ETH".to_string(), "WAT".to_string()],
                "USDT",
            )
            .await
            .unwrap();
        assert_eq!(available, vec!["BTC", "ETH"]);
        assert_eq!(unavailable, vec!["WAT"]);
    }
}
