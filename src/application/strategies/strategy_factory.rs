use crate::application::strategies::composite::CompositeStrategy;
use crate::application::strategies::ma_cross::{MaCrossStrategy, MaType};
use crate::application::strategies::macd::MacdStrategy;
use crate::application::strategies::rsi::RsiStrategy;
use crate::application::strategies::traits::Strategy;
use crate::domain::errors::{WatchError, WatchResult};
use crate::domain::market::Timeframe;

/// Builds strategies from preset names and parametric descriptors.
///
/// Two name families are accepted:
///   * preset aliases such as `rsi_conservative` or `macd_default`;
///   * parametric forms `rsi_<p>_<ob>_<os>`, `sma|ema|wma_<fast>_<slow>`
///     and `macd_<fast>_<slow>_<signal>`.
pub struct StrategyFactory;

impl StrategyFactory {
    pub fn create(name: &str) -> WatchResult<Box<dyn Strategy>> {
        match name {
            "rsi_default" => return Ok(Box::new(RsiStrategy::new(14, 70.0, 30.0))),
            "rsi_conservative" => return Ok(Box::new(RsiStrategy::new(14, 75.0, 25.0))),
            "rsi_aggressive" => return Ok(Box::new(RsiStrategy::new(14, 65.0, 35.0))),
            "sma_default" => return Ok(Box::new(MaCrossStrategy::new(5, 20, MaType::Sma))),
            "ema_default" => return Ok(Box::new(MaCrossStrategy::new(12, 26, MaType::Ema))),
            "wma_default" => return Ok(Box::new(MaCrossStrategy::new(10, 30, MaType::Wma))),
            "macd_default" => return Ok(Box::new(MacdStrategy::new(12, 26, 9))),
            "composite_default" => {
                let composite = CompositeStrategy::new("composite_default")
                    .with_child(Box::new(RsiStrategy::new(14, 70.0, 30.0)))
                    .with_child(Box::new(MaCrossStrategy::new(5, 20, MaType::Sma)))
                    .with_child(Box::new(MacdStrategy::new(12, 26, 9)));
                return Ok(Box::new(composite));
            }
            _ => {}
        }
        Self::create_parametric(name)
    }

    /// Names of all preset strategies.
    pub fn presets() -> Vec<&'static str> {
        vec![
            "rsi_default",
            "rsi_conservative",
            "rsi_aggressive",
            "sma_default",
            "ema_default",
            "wma_default",
            "macd_default",
            "composite_default",
        ]
    }

    /// Convenience mapping from a timeframe to a sensible preset:
    /// fast mean-reversion for scalping intervals, the full composite
    /// intraday, trend-following presets for daily and above.
    pub fn recommended_for(timeframe: Timeframe) -> &'static str {
        match timeframe {
            Timeframe::OneMin
            | Timeframe::ThreeMin
            | Timeframe::FiveMin
            | Timeframe::FifteenMin
            | Timeframe::ThirtyMin => "rsi_aggressive",
            Timeframe::OneHour
            | Timeframe::TwoHour
            | Timeframe::FourHour
            | Timeframe::SixHour
            | Timeframe::EightHour
            | Timeframe::TwelveHour => "composite_default",
            Timeframe::OneDay | Timeframe::ThreeDay => "macd_default",
            Timeframe::OneWeek | Timeframe::OneMonth => "sma_default",
        }
    }

    fn create_parametric(name: &str) -> WatchResult<Box<dyn Strategy>> {
        let parts: Vec<&str> = name.split('_').collect();
        let unknown = || {
            WatchError::invalid_argument(format!(
                "unknown strategy '{}' (presets: {})",
                name,
                Self::presets().join(", ")
            ))
        };

        match parts.as_slice() {
            ["rsi", period, overbought, oversold] => {
                let period = parse_usize(period).ok_or_else(unknown)?;
                let overbought = parse_f64(overbought).ok_or_else(unknown)?;
                let oversold = parse_f64(oversold).ok_or_else(unknown)?;
                if oversold >= overbought {
                    return Err(WatchError::invalid_argument(format!(
                        "strategy '{}': oversold {} must be below overbought {}",
                        name, oversold, overbought
                    )));
                }
                Ok(Box::new(RsiStrategy::new(period, overbought, oversold)))
            }
            [ma @ ("sma" | "ema" | "wma"), fast, slow] => {
                let fast = parse_usize(fast).ok_or_else(unknown)?;
                let slow = parse_usize(slow).ok_or_else(unknown)?;
                let ma_type: MaType = ma.parse()?;
                Ok(Box::new(MaCrossStrategy::new(fast, slow, ma_type)))
            }
            ["macd", fast, slow, signal] => {
                let fast = parse_usize(fast).ok_or_else(unknown)?;
                let slow = parse_usize(slow).ok_or_else(unknown)?;
                let signal = parse_usize(signal).ok_or_else(unknown)?;
                Ok(Box::new(MacdStrategy::new(fast, slow, signal)))
            }
            _ => Err(unknown()),
        }
    }
}

fn parse_usize(s: &str) -> Option<usize> {
    s.parse().ok()
}

fn parse_f64(s: &str) -> Option<f64> {
    s.parse().ok().filter(|v: &f64| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_resolve() {
        for preset in StrategyFactory::presets() {
            let strategy = StrategyFactory::create(preset).unwrap();
            assert!(strategy.required_data_points() > 0, "{}", preset);
        }
    }

    #[test]
    fn parametric_rsi() {
        let s = StrategyFactory::create("rsi_21_80_20").unwrap();
        assert_eq!(s.name(), "rsi_21");
        assert_eq!(s.required_data_points(), 105);
    }

    #[test]
    fn parametric_ma_cross() {
        let s = StrategyFactory::create("ema_12_26").unwrap();
        assert_eq!(s.name(), "ema_cross_12_26");
        assert_eq!(s.required_data_points(), 28);
    }

    #[test]
    fn parametric_macd() {
        let s = StrategyFactory::create("macd_8_21_5").unwrap();
        assert_eq!(s.required_data_points(), 21 + 5 + 10);
    }

    #[test]
    fn unknown_names_fail() {
        assert!(StrategyFactory::create("bollinger_20").is_err());
        assert!(StrategyFactory::create("rsi").is_err());
        assert!(StrategyFactory::create("sma_x_20").is_err());
        assert!(StrategyFactory::create("").is_err());
    }

    #[test]
    fn inverted_rsi_band_fails() {
        assert!(StrategyFactory::create("rsi_14_30_70").is_err());
    }

    #[test]
    fn recommendation_covers_every_timeframe() {
        for tf in Timeframe::all() {
            let preset = StrategyFactory::recommended_for(tf);
            assert!(StrategyFactory::create(preset).is_ok());
        }
    }
}
