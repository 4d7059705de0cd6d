use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Direction emitted by a strategy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    None,
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::None => write!(f, "NONE"),
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

/// Confidence tier of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Strength {
    Weak,
    Normal,
    Strong,
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strength::Weak => write!(f, "WEAK"),
            Strength::Normal => write!(f, "NORMAL"),
            Strength::Strong => write!(f, "STRONG"),
        }
    }
}

/// Outcome of one strategy evaluation on one cell.
///
/// Carries both the human-oriented strings and the machine-oriented
/// maps so notifications can render rich reports without re-deriving
/// indicator values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyResult {
    pub signal: Signal,
    pub strength: Strength,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub indicator_summary: String,
    pub detailed_analysis: String,
    pub indicators: HashMap<String, f64>,
    pub thresholds: HashMap<String, f64>,
    pub metadata: HashMap<String, String>,
}

impl StrategyResult {
    pub fn new(signal: Signal, strength: Strength) -> Self {
        Self {
            signal,
            strength,
            timestamp: Utc::now(),
            message: String::new(),
            indicator_summary: String::new(),
            detailed_analysis: String::new(),
            indicators: HashMap::new(),
            thresholds: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    /// Neutral result with no trigger.
    pub fn none() -> Self {
        Self::new(Signal::None, Strength::Weak)
    }

    /// Only BUY and SELL results reach the notification surface.
    pub fn is_notifiable(&self) -> bool {
        matches!(self.signal, Signal::Buy | Signal::Sell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifiable_covers_buy_and_sell_only() {
        assert!(StrategyResult::new(Signal::Buy, Strength::Weak).is_notifiable());
        assert!(StrategyResult::new(Signal::Sell, Strength::Strong).is_notifiable());
        assert!(!StrategyResult::new(Signal::Hold, Strength::Normal).is_notifiable());
        assert!(!StrategyResult::none().is_notifiable());
    }

    #[test]
    fn strength_ordering() {
        assert!(Strength::Strong > Strength::Normal);
        assert!(Strength::Normal > Strength::Weak);
    }

    #[test]
    fn display_forms() {
        assert_eq!(Signal::Buy.to_string(), "BUY");
        assert_eq!(Signal::Sell.to_string(), "SELL");
        assert_eq!(Strength::Strong.to_string(), "STRONG");
    }
}
