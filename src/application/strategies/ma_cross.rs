use crate::application::strategies::traits::{Strategy, ensure_data_points};
use crate::domain::errors::{WatchError, WatchResult};
use crate::domain::indicators::{self, safe_div};
use crate::domain::market::{MarketData, Timeframe};
use crate::domain::signal::{Signal, StrategyResult, Strength};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DEFAULT_FAST: usize = 5;
const DEFAULT_SLOW: usize = 20;

/// Moving-average family used by the crossover strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaType {
    Sma,
    Ema,
    Wma,
}

impl MaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaType::Sma => "sma",
            MaType::Ema => "ema",
            MaType::Wma => "wma",
        }
    }

    fn compute(&self, prices: &[f64], period: usize) -> WatchResult<Vec<f64>> {
        match self {
            MaType::Sma => indicators::sma(prices, period),
            MaType::Ema => indicators::ema(prices, period),
            MaType::Wma => indicators::wma(prices, period),
        }
    }
}

impl fmt::Display for MaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MaType {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sma" => Ok(MaType::Sma),
            "ema" => Ok(MaType::Ema),
            "wma" => Ok(MaType::Wma),
            _ => Err(WatchError::invalid_argument(format!(
                "unknown moving-average type '{}'",
                s
            ))),
        }
    }
}

/// Golden/death-cross strategy over two moving averages of one family.
///
/// Buys when the fast average crosses above the slow one between the
/// previous and current candle, sells on the opposite cross. Strength
/// scales with the separation relative to the slow average.
#[derive(Debug, Clone)]
pub struct MaCrossStrategy {
    name: String,
    fast_period: usize,
    slow_period: usize,
    ma_type: MaType,
}

impl MaCrossStrategy {
    /// Constructor is defensive about degenerate periods: zeroes fall
    /// back to the 5/20 defaults, and `fast >= slow` is reordered to
    /// `(slow / 2, fast)` so the fast leg stays the shorter one.
    pub fn new(fast_period: usize, slow_period: usize, ma_type: MaType) -> Self {
        let mut fast = if fast_period == 0 { DEFAULT_FAST } else { fast_period };
        let mut slow = if slow_period == 0 { DEFAULT_SLOW } else { slow_period };
        if fast >= slow {
            let reordered_fast = (slow / 2).max(1);
            slow = fast;
            fast = reordered_fast;
        }
        Self {
            name: format!("{}_cross_{}_{}", ma_type.as_str(), fast, slow),
            fast_period: fast,
            slow_period: slow,
            ma_type,
        }
    }

    pub fn fast_period(&self) -> usize {
        self.fast_period
    }

    pub fn slow_period(&self) -> usize {
        self.slow_period
    }
}

impl Default for MaCrossStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_FAST, DEFAULT_SLOW, MaType::Sma)
    }
}

impl Strategy for MaCrossStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!(
            "{} {}/{} crossover: buy on golden cross, sell on death cross",
            self.ma_type.as_str().to_uppercase(),
            self.fast_period,
            self.slow_period
        )
    }

    fn required_data_points(&self) -> usize {
        self.slow_period + 2
    }

    fn supported_timeframes(&self) -> Vec<Timeframe> {
        Timeframe::all()
    }

    fn evaluate(&self, data: &MarketData) -> WatchResult<StrategyResult> {
        ensure_data_points(data, self.required_data_points())?;

        let closes = data.closes();
        let fast = self.ma_type.compute(&closes, self.fast_period)?;
        let slow = self.ma_type.compute(&closes, self.slow_period)?;

        // Both series end at the most recent candle; compare the last
        // two aligned points of each.
        let fast_curr = fast[fast.len() - 1];
        let fast_prev = fast[fast.len() - 2];
        let slow_curr = slow[slow.len() - 1];
        let slow_prev = slow[slow.len() - 2];

        let diff_curr = fast_curr - slow_curr;
        let diff_prev = fast_prev - slow_prev;

        let (signal, cross) = if diff_prev <= 0.0 && diff_curr > 0.0 {
            (Signal::Buy, "golden")
        } else if diff_prev >= 0.0 && diff_curr < 0.0 {
            (Signal::Sell, "death")
        } else {
            (Signal::None, "none")
        };

        let separation = safe_div(diff_curr.abs(), slow_curr);
        let strength = if separation >= 0.02 {
            Strength::Strong
        } else if separation >= 0.01 {
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
                "{} {}: golden cross, {}({}) {:.4} over {}({}) {:.4}",
                data.symbol,
                data.timeframe,
                self.ma_type,
                self.fast_period,
                fast_curr,
                self.ma_type,
                self.slow_period,
                slow_curr
            ),
            Signal::Sell => format!(
                "{} {}: death cross, {}({}) {:.4} under {}({}) {:.4}",
                data.symbol,
                data.timeframe,
                self.ma_type,
                self.fast_period,
                fast_curr,
                self.ma_type,
                self.slow_period,
                slow_curr
            ),
            _ => format!("{} {}: no crossover", data.symbol, data.timeframe),
        };
        result.indicator_summary = format!(
            "{}-{}: {:.4} / {}-{}: {:.4}",
            self.ma_type.as_str().to_uppercase(),
            self.fast_period,
            fast_curr,
            self.ma_type.as_str().to_uppercase(),
            self.slow_period,
            slow_curr
        );
        result.detailed_analysis = format!(
            "Fast {} over {} candles at {:.6} (prev {:.6}); slow over {} at {:.6} (prev {:.6}). \
             Separation {:.4}% of the slow average.",
            self.ma_type,
            self.fast_period,
            fast_curr,
            fast_prev,
            self.slow_period,
            slow_curr,
            slow_prev,
            separation * 100.0
        );

        result.indicators.insert("fast_ma".to_string(), fast_curr);
        result.indicators.insert("slow_ma".to_string(), slow_curr);
        result.indicators.insert("fast_ma_prev".to_string(), fast_prev);
        result.indicators.insert("slow_ma_prev".to_string(), slow_prev);
        result.indicators.insert("ma_diff".to_string(), diff_curr);
        result.thresholds.insert("strong_separation".to_string(), 0.02);
        result.thresholds.insert("normal_separation".to_string(), 0.01);
        result
            .metadata
            .insert("ma_type".to_string(), self.ma_type.to_string());
        result.metadata.insert("cross".to_string(), cross.to_string());

        Ok(result)
    }
}
