use crate::application::strategies::traits::{Strategy, ensure_data_points};
use crate::domain::errors::WatchResult;
use crate::domain::indicators;
use crate::domain::market::{MarketData, Timeframe};
use crate::domain::signal::{Signal, StrategyResult, Strength};

/// Relative Strength Index strategy.
///
/// Sells when the latest RSI reaches the overbought threshold, buys
/// at the oversold threshold; strength scales with how far past the
/// threshold the reading sits.
#[derive(Debug, Clone)]
pub struct RsiStrategy {
    name: String,
    period: usize,
    overbought: f64,
    oversold: f64,
}

impl RsiStrategy {
    pub fn new(period: usize, overbought: f64, oversold: f64) -> Self {
        Self {
            name: format!("rsi_{}", period),
            period,
            overbought,
            oversold,
        }
    }
}

impl Default for RsiStrategy {
    fn default() -> Self {
        Self::new(14, 70.0, 30.0)
    }
}

impl Strategy for RsiStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!(
            "RSI({}) mean-reversion: sell at {}, buy at {}",
            self.period, self.overbought, self.oversold
        )
    }

    fn required_data_points(&self) -> usize {
        self.period * 5
    }

    fn supported_timeframes(&self) -> Vec<Timeframe> {
        Timeframe::all()
    }

    fn evaluate(&self, data: &MarketData) -> WatchResult<StrategyResult> {
        ensure_data_points(data, self.required_data_points())?;

        let closes = data.closes();
        let series = indicators::rsi(&closes, self.period)?;
        let current = *series.last().expect("RSI output is non-empty");
        let previous = if series.len() >= 2 {
            series[series.len() - 2]
        } else {
            current
        };

        let (signal, strength) = if current >= self.overbought {
            let strength = if current >= self.overbought + 10.0 {
                Strength::Strong
            } else if current >= self.overbought + 5.0 {
                Strength::Normal
            } else {
                Strength::Weak
            };
            (Signal::Sell, strength)
        } else if current <= self.oversold {
            let strength = if current <= self.oversold - 10.0 {
                Strength::Strong
            } else if current <= self.oversold - 5.0 {
                Strength::Normal
            } else {
                Strength::Weak
            };
            (Signal::Buy, strength)
        } else {
            (Signal::None, Strength::Weak)
        };

        let mut result = StrategyResult::new(signal, strength);
        // Deterministic timestamp: evaluation time plays no role.
        result.timestamp = data
            .candles
            .last()
            .map(|c| c.close_time)
            .unwrap_or(data.assembled_at);

        result.message = match signal {
            Signal::Sell => format!(
                "{} {}: RSI {:.2} at or above overbought {}",
                data.symbol, data.timeframe, current, self.overbought
            ),
            Signal::Buy => format!(
                "{} {}: RSI {:.2} at or below oversold {}",
                data.symbol, data.timeframe, current, self.oversold
            ),
            _ => format!(
                "{} {}: RSI {:.2} inside neutral band",
                data.symbol, data.timeframe, current
            ),
        };
        result.indicator_summary = format!(
            "RSI-{}: {:.2} ({}/{})",
            self.period, current, self.overbought, self.oversold
        );

        let trend = if current > previous {
            "rising"
        } else if current < previous {
            "falling"
        } else {
            "flat"
        };
        result.detailed_analysis = format!(
            "Wilder RSI over {} closes: current {:.2}, previous {:.2} ({}). \
             Overbought at {}, oversold at {}.",
            closes.len(),
            current,
            previous,
            trend,
            self.overbought,
            self.oversold
        );

        result.indicators.insert("rsi".to_string(), current);
        result.indicators.insert("rsi_prev".to_string(), previous);
        result
            .thresholds
            .insert("overbought".to_string(), self.overbought);
        result
            .thresholds
            .insert("oversold".to_string(), self.oversold);
        result
            .metadata
            .insert("period".to_string(), self.period.to_string());
        result
            .metadata
            .insert("rsi_trend".to_string(), trend.to_string());

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
                    symbol: "BTCUSDT".to_string(),
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
        MarketData::new("BTCUSDT", Timeframe::OneHour, candles)
    }

    #[test]
    fn requires_five_periods_of_data() {
        let strategy = RsiStrategy::new(14, 70.0, 30.0);
        assert_eq!(strategy.required_data_points(), 70);

        let data = market_data(&vec![100.0; 69]);
        let err = strategy.evaluate(&data).unwrap_err();
        assert!(matches!(
            err,
            crate::domain::errors::WatchError::InsufficientData { need: 70, have: 69 }
        ));
    }

    #[test]
    fn relentless_rally_sells_strong() {
        let strategy = RsiStrategy::new(14, 70.0, 30.0);
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + i as f64).collect();
        let result = strategy.evaluate(&market_data(&closes)).unwrap();

        assert_eq!(result.signal, Signal::Sell);
        assert_eq!(result.strength, Strength::Strong);
        let rsi = result.indicators["rsi"];
        assert!((99.0..=100.0).contains(&rsi));
        assert!(result.is_notifiable());
    }

    #[test]
    fn relentless_selloff_buys() {
        let strategy = RsiStrategy::new(14, 70.0, 30.0);
        let closes: Vec<f64> = (0..80).map(|i| 500.0 - i as f64 * 2.0).collect();
        let result = strategy.evaluate(&market_data(&closes)).unwrap();

        assert_eq!(result.signal, Signal::Buy);
        assert_eq!(result.strength, Strength::Strong);
    }

    #[test]
    fn neutral_band_emits_none() {
        let strategy = RsiStrategy::new(14, 70.0, 30.0);
        let closes: Vec<f64> = (0..80)
            .map(|i| 100.0 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let result = strategy.evaluate(&market_data(&closes)).unwrap();

        assert_eq!(result.signal, Signal::None);
        assert!(!result.is_notifiable());
    }

    #[test]
    fn evaluation_is_deterministic() {
        let strategy = RsiStrategy::default();
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.3).sin() * 4.0).collect();
        let data = market_data(&closes);

        let a = strategy.evaluate(&data).unwrap();
        let b = strategy.evaluate(&data).unwrap();
        assert_eq!(a.signal, b.signal);
        assert_eq!(a.strength, b.strength);
        assert_eq!(a.timestamp, b.timestamp);
        assert_eq!(a.indicators, b.indicators);
    }
}
