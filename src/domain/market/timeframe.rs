use crate::domain::errors::WatchError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Candle interval of the monitoring matrix.
///
/// The canonical string forms ("1m" .. "1M") are a bijection over the
/// supported set; parsing happens once at the config boundary. Note
/// that "1m" (minute) and "1M" (month) differ only by case, so
/// parsing is case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    OneMin,
    ThreeMin,
    FiveMin,
    FifteenMin,
    ThirtyMin,
    OneHour,
    TwoHour,
    FourHour,
    SixHour,
    EightHour,
    TwelveHour,
    OneDay,
    ThreeDay,
    OneWeek,
    OneMonth,
}

impl Timeframe {
    /// Canonical string form, also the Binance interval encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneMin => "1m",
            Timeframe::ThreeMin => "3m",
            Timeframe::FiveMin => "5m",
            Timeframe::FifteenMin => "15m",
            Timeframe::ThirtyMin => "30m",
            Timeframe::OneHour => "1h",
            Timeframe::TwoHour => "2h",
            Timeframe::FourHour => "4h",
            Timeframe::SixHour => "6h",
            Timeframe::EightHour => "8h",
            Timeframe::TwelveHour => "12h",
            Timeframe::OneDay => "1d",
            Timeframe::ThreeDay => "3d",
            Timeframe::OneWeek => "1w",
            Timeframe::OneMonth => "1M",
        }
    }

    /// Nominal duration of one candle in minutes. A month counts as
    /// 30 days; the orchestrator only uses this for lookback windows.
    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::OneMin => 1,
            Timeframe::ThreeMin => 3,
            Timeframe::FiveMin => 5,
            Timeframe::FifteenMin => 15,
            Timeframe::ThirtyMin => 30,
            Timeframe::OneHour => 60,
            Timeframe::TwoHour => 120,
            Timeframe::FourHour => 240,
            Timeframe::SixHour => 360,
            Timeframe::EightHour => 480,
            Timeframe::TwelveHour => 720,
            Timeframe::OneDay => 1440,
            Timeframe::ThreeDay => 4320,
            Timeframe::OneWeek => 10080,
            Timeframe::OneMonth => 43200,
        }
    }

    pub fn to_seconds(&self) -> i64 {
        self.to_minutes() * 60
    }

    /// Nominal duration used by the watcher to compute lookback windows.
    pub fn duration(&self) -> Duration {
        Duration::minutes(self.to_minutes())
    }

    /// All supported timeframes in ascending order.
    pub fn all() -> Vec<Timeframe> {
        vec![
            Timeframe::OneMin,
            Timeframe::ThreeMin,
            Timeframe::FiveMin,
            Timeframe::FifteenMin,
            Timeframe::ThirtyMin,
            Timeframe::OneHour,
            Timeframe::TwoHour,
            Timeframe::FourHour,
            Timeframe::SixHour,
            Timeframe::EightHour,
            Timeframe::TwelveHour,
            Timeframe::OneDay,
            Timeframe::ThreeDay,
            Timeframe::OneWeek,
            Timeframe::OneMonth,
        ]
    }

    /// True for intraday intervals (shorter than one day).
    pub fn is_intraday(&self) -> bool {
        self.to_minutes() < Timeframe::OneDay.to_minutes()
    }
}

impl FromStr for Timeframe {
    type Err = WatchError;

    // Case-sensitive on purpose: "1m" is a minute, "1M" a month.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::OneMin),
            "3m" => Ok(Timeframe::ThreeMin),
            "5m" => Ok(Timeframe::FiveMin),
            "15m" => Ok(Timeframe::FifteenMin),
            "30m" => Ok(Timeframe::ThirtyMin),
            "1h" => Ok(Timeframe::OneHour),
            "2h" => Ok(Timeframe::TwoHour),
            "4h" => Ok(Timeframe::FourHour),
            "6h" => Ok(Timeframe::SixHour),
            "8h" => Ok(Timeframe::EightHour),
            "12h" => Ok(Timeframe::TwelveHour),
            "1d" => Ok(Timeframe::OneDay),
            "3d" => Ok(Timeframe::ThreeDay),
            "1w" => Ok(Timeframe::OneWeek),
            "1M" => Ok(Timeframe::OneMonth),
            _ => Err(WatchError::invalid_argument(format!(
                "unsupported timeframe '{}' (expected one of 1m 3m 5m 15m 30m 1h 2h 4h 6h 8h 12h 1d 3d 1w 1M)",
                s
            ))),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for Timeframe {
    type Error = WatchError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> String {
        tf.as_str().to_string()
    }
}
