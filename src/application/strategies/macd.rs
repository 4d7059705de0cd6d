use crate::application::strategies::traits::{Strategy, ensure_data_points};
use crate::domain::errors::WatchResult;
use crate::domain::indicators;
use crate::domain::market::{MarketData, Timeframe};
use crate::domain::signal::{Signal, StrategyResult, Strength};

const DEFAULT_FAST: usize = 12;
const DEFAULT_SLOW: usize = 26;
const DEFAULT_SIGNAL: usize = 9;

const STRONG_GAP: f64 = 2e-3;
const NORMAL_GAP: f64 = 1e-3;

/// MACD line / signal line crossover strategy.
#[derive(Debug, Clone)]
pub struct MacdStrategy {
    name: String,
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl MacdStrategy {
    /// Degenerate parameter sets (zero periods, fast not below slow)
    /// fall back to the 12/26/9 defaults.
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        let (fast, slow, signal) =
            if fast_period == 0 || slow_period == 0 || signal_period == 0 || fast_period >= slow_period {
                (DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
            } else {
                (fast_period, slow_period, signal_period)
            };
        Self {
            name: format!("macd_{}_{}_{}", fast, slow, signal),
            fast_period: fast,
            slow_period: slow,
            signal_period: signal,
        }
    }

    pub fn periods(&self) -> (usize, usize, usize) {
        (self.fast_period, self.slow_period, self.signal_period)
    }
}

impl Default for MacdStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
    }
}

impl Strategy for MacdStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!(
            "MACD({}/{}/{}): buy when the MACD line crosses above its signal line, sell on the opposite cross",
            self.fast_period, self.slow_period, self.signal_period
        )
    }

    fn required_data_points(&self) -> usize {
        self.slow_period + self.signal_period + 10
    }

    fn supported_timeframes(&self) -> Vec<Timeframe> {
        Timeframe::all()
    }

    fn evaluate(&self, data: &MarketData) -> WatchResult<StrategyResult> {
        ensure_data_points(data, self.required_data_points())?;

        let closes = data.closes();
        let series = indicators::macd(&closes, self.fast_period, self.slow_period, self.signal_period)?;

        let n = series.macd.len();
        let macd_curr = series.macd[n - 1];
        let macd_prev = series.macd[n - 2];
        let sig_curr = series.signal[n - 1];
        let sig_prev = series.signal[n - 2];
        let hist_curr = series.histogram[n - 1];

        let (signal, cross) = if macd_prev <= sig_prev && macd_curr > sig_curr {
            (Signal::Buy, "bullish")
        } else if macd_prev >= sig_prev && macd_curr < sig_curr {
            (Signal::Sell, "bearish")
        } else {
            (Signal::None, "none")
        };

        let gap = (macd_curr - sig_curr).abs();
        let strength = if gap > STRONG_GAP {
            Strength::Strong
        } else if gap > NORMAL_GAP {
            Strength::Normal
        } else {
            Strength::Weak
        };

        let mut result = StrategyResult::new(signal, strength);
        result.timestamp = data
            .candles
            .last()
            .map(|c| c.close_time)
            .unwrap_or(data.assembled_at);

        result.message = match signal {
            Signal::Buy => format!(
                "{} {}: MACD crossed above signal ({:.6} > {:.6})",
                data.symbol, data.timeframe, macd_curr, sig_curr
            ),
            Signal::Sell => format!(
                "{} {}: MACD crossed below signal ({:.6} < {:.6})",
                data.symbol, data.timeframe, macd_curr, sig_curr
            ),
            _ => format!("{} {}: no MACD crossover", data.symbol, data.timeframe),
        };
        result.indicator_summary = format!(
            "MACD({}/{}/{}): {:.6} sig {:.6} hist {:.6}",
            self.fast_period, self.slow_period, self.signal_period, macd_curr, sig_curr, hist_curr
        );
        result.detailed_analysis = format!(
            "MACD line {:.6} (prev {:.6}) against signal {:.6} (prev {:.6}); histogram {:.6}. \
             Cross: {}.",
            macd_curr, macd_prev, sig_curr, sig_prev, hist_curr, cross
        );

        result.indicators.insert("macd".to_string(), macd_curr);
        result.indicators.insert("macd_prev".to_string(), macd_prev);
        result.indicators.insert("macd_signal".to_string(), sig_curr);
        result
            .indicators
            .insert("macd_signal_prev".to_string(), sig_prev);
        result
            .indicators
            .insert("macd_histogram".to_string(), hist_curr);
        result.thresholds.insert("strong_gap".to_string(), STRONG_GAP);
        result.thresholds.insert("normal_gap".to_string(), NORMAL_GAP);
        result.metadata.insert("cross".to_string(), cross.to_string());

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::WatchError;
    use crate::domain::market::Candle;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal::prelude::FromPrimitive;

    fn market_data(closes: &[f64]) -> MarketData {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let c = Decimal::from_f64(close).unwrap();
                Candle {
                    symbol: "SOLUSDT".to_string(),
                    open_time: t0 + chrono::Duration::hours(i as i64),
                    close_time: t0 + chrono::Duration::hours(i as i64 + 1),
                    open: c,
                    high: c * Decimal::from_f64(1.01).unwrap(),
                    low: c * Decimal::from_f64(0.99).unwrap(),
                    close: c,
                    volume: Decimal::ONE,
                }
            })
            .collect();
        MarketData::new("SOLUSDT", Timeframe::OneHour, candles)
    }

    #[test]
    fn degenerate_parameters_fall_back_to_defaults() {
        assert_eq!(MacdStrategy::new(0, 26, 9).periods(), (12, 26, 9));
        assert_eq!(MacdStrategy::new(26, 12, 9).periods(), (12, 26, 9));
        assert_eq!(MacdStrategy::new(12, 26, 0).periods(), (12, 26, 9));
        assert_eq!(MacdStrategy::new(8, 21, 5).periods(), (8, 21, 5));
    }

    #[test]
    fn required_data_points_formula() {
        let s = MacdStrategy::default();
        assert_eq!(s.required_data_points(), 26 + 9 + 10);
    }

    #[test]
    fn downtrend_reversal_emits_buy() {
        // Long decline, one last flush, then a violent rebound: the
        // MACD line crosses up through its signal line on the final
        // bar (histogram moves from -0.45 to +1.91).
        let mut closes: Vec<f64> = (0..63).map(|i| 200.0 - i as f64).collect();
        closes.extend([130.0, 170.0]);
        let data = market_data(&closes);

        let result = MacdStrategy::default().evaluate(&data).unwrap();
        assert_eq!(result.signal, Signal::Buy);
        assert_eq!(result.strength, Strength::Strong);
        assert_eq!(result.metadata["cross"], "bullish");
    }

    #[test]
    fn uptrend_reversal_emits_sell() {
        let mut closes: Vec<f64> = (0..63).map(|i| 100.0 + i as f64).collect();
        closes.extend([170.0, 130.0]);
        let data = market_data(&closes);

        let result = MacdStrategy::default().evaluate(&data).unwrap();
        assert_eq!(result.signal, Signal::Sell);
        assert_eq!(result.metadata["cross"], "bearish");
    }

    #[test]
    fn flat_tape_emits_none() {
        let closes = vec![100.0; 60];
        let result = MacdStrategy::default().evaluate(&market_data(&closes)).unwrap();
        assert_eq!(result.signal, Signal::None);
        assert_eq!(result.strength, Strength::Weak);
    }

    #[test]
    fn insufficient_data_is_reported() {
        let err = MacdStrategy::default()
            .evaluate(&market_data(&vec![100.0; 44]))
            .unwrap_err();
        assert!(matches!(
            err,
            WatchError::InsufficientData { need: 45, have: 44 }
        ));
    }
}
