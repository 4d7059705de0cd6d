use crate::domain::errors::{WatchError, WatchResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One normalized OHLCV bar.
///
/// Every candle handed out by an adapter or the rate calculator
/// satisfies [`Candle::validate`]; consumers treat candles as
/// immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Checks the candle invariants: positive prices, non-negative
    /// volume, `low <= min(open, close) <= max(open, close) <= high`,
    /// and `close_time > open_time`.
    pub fn validate(&self) -> WatchResult<()> {
        if self.open <= Decimal::ZERO
            || self.high <= Decimal::ZERO
            || self.low <= Decimal::ZERO
            || self.close <= Decimal::ZERO
        {
            return Err(WatchError::invalid_argument(format!(
                "{}: non-positive price in candle at {}",
                self.symbol, self.open_time
            )));
        }
        if self.volume < Decimal::ZERO {
            return Err(WatchError::invalid_argument(format!(
                "{}: negative volume in candle at {}",
                self.symbol, self.open_time
            )));
        }
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);
        if self.low > body_low || self.high < body_high {
            return Err(WatchError::invalid_argument(format!(
                "{}: wick invariant violated at {} (o={} h={} l={} c={})",
                self.symbol, self.open_time, self.open, self.high, self.low, self.close
            )));
        }
        if self.close_time <= self.open_time {
            return Err(WatchError::invalid_argument(format!(
                "{}: close_time {} not after open_time {}",
                self.symbol, self.close_time, self.open_time
            )));
        }
        Ok(())
    }
}

/// Checks that a candle slice is strictly ascending by open time with
/// no overlaps, and that every candle is individually valid.
pub fn validate_series(candles: &[Candle]) -> WatchResult<()> {
    for candle in candles {
        candle.validate()?;
    }
    for pair in candles.windows(2) {
        if pair[1].open_time <= pair[0].open_time {
            return Err(WatchError::invalid_argument(format!(
                "candle series not strictly ascending at {}",
                pair[1].open_time
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn candle(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Candle {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        Candle {
            symbol: "BTCUSDT".to_string(),
            open_time: t0,
            close_time: t0 + chrono::Duration::hours(1),
            open,
            high,
            low,
            close,
            volume: dec!(12.5),
        }
    }

    #[test]
    fn valid_candle_passes() {
        let c = candle(dec!(100), dec!(110), dec!(95), dec!(105));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_price() {
        let c = candle(dec!(0), dec!(110), dec!(95), dec!(105));
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_high_below_body() {
        let c = candle(dec!(100), dec!(101), dec!(95), dec!(105));
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_low_above_body() {
        let c = candle(dec!(100), dec!(110), dec!(101), dec!(105));
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_inverted_times() {
        let mut c = candle(dec!(100), dec!(110), dec!(95), dec!(105));
        c.close_time = c.open_time;
        assert!(c.validate().is_err());
    }

    #[test]
    fn series_must_ascend() {
        let a = candle(dec!(100), dec!(110), dec!(95), dec!(105));
        let mut b = a.clone();
        b.open_time = a.open_time + chrono::Duration::hours(1);
        b.close_time = b.open_time + chrono::Duration::hours(1);

        assert!(validate_series(&[a.clone(), b.clone()]).is_ok());
        assert!(validate_series(&[b, a]).is_err());
    }
}
