use crate::application::strategies::traits::Strategy;
use crate::domain::errors::WatchResult;
use crate::domain::market::{MarketData, Timeframe};
use crate::domain::signal::{Signal, StrategyResult};
use std::collections::BTreeMap;

/// Bundles several strategies behind the [`Strategy`] contract.
///
/// Semantics are deliberately "any child triggers, report": the goal
/// is breadth of alerting, not a voting ensemble. When several
/// children trigger, the strongest one (latest timestamp breaking
/// ties) represents the bundle.
pub struct CompositeStrategy {
    name: String,
    children: BTreeMap<String, Box<dyn Strategy>>,
}

impl CompositeStrategy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: BTreeMap::new(),
        }
    }

    pub fn with_child(mut self, child: Box<dyn Strategy>) -> Self {
        self.add_child(child);
        self
    }

    pub fn add_child(&mut self, child: Box<dyn Strategy>) {
        self.children.insert(child.name().to_string(), child);
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

impl Strategy for CompositeStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        let names: Vec<&str> = self.children.keys().map(String::as_str).collect();
        format!("any-trigger composite of [{}]", names.join(", "))
    }

    fn required_data_points(&self) -> usize {
        self.children
            .values()
            .map(|c| c.required_data_points())
            .max()
            .unwrap_or(0)
    }

    fn supported_timeframes(&self) -> Vec<Timeframe> {
        let mut supported = Timeframe::all();
        for child in self.children.values() {
            let child_tfs = child.supported_timeframes();
            supported.retain(|tf| child_tfs.contains(tf));
        }
        supported
    }

    fn evaluate(&self, data: &MarketData) -> WatchResult<StrategyResult> {
        let mut evaluated: Vec<(&str, StrategyResult)> = Vec::with_capacity(self.children.len());
        for (name, child) in &self.children {
            evaluated.push((name.as_str(), child.evaluate(data)?));
        }

        let triggered: Vec<&(&str, StrategyResult)> = evaluated
            .iter()
            .filter(|(_, r)| r.is_notifiable())
            .collect();

        let mut per_child = BTreeMap::new();
        for (name, r) in &evaluated {
            per_child.insert(
                format!("child_{}", name),
                format!("{}({})", r.signal, r.strength),
            );
        }

        if triggered.is_empty() {
            let mut result = StrategyResult::none();
            result.timestamp = data
                .candles
                .last()
                .map(|c| c.close_time)
                .unwrap_or(data.assembled_at);
            result.message = format!(
                "{} {}: no strategy triggered ({} evaluated)",
                data.symbol,
                data.timeframe,
                evaluated.len()
            );
            result.indicator_summary = "no triggers".to_string();
            result
                .metadata
                .insert("triggered_count".to_string(), "0".to_string());
            result.metadata.insert(
                "total_strategies".to_string(),
                evaluated.len().to_string(),
            );
            result.metadata.extend(per_child);
            return Ok(result);
        }

        let (rep_name, representative) = triggered
            .iter()
            .max_by(|(_, a), (_, b)| {
                a.strength
                    .cmp(&b.strength)
                    .then(a.timestamp.cmp(&b.timestamp))
            })
            .map(|(n, r)| (*n, r))
            .expect("triggered set is non-empty");

        let triggered_names: Vec<&str> = triggered.iter().map(|(n, _)| *n).collect();

        let mut result = representative.clone();
        result.message = format!(
            "{} {}: {} of {} strategies triggered [{}], strongest {} {}",
            data.symbol,
            data.timeframe,
            triggered.len(),
            evaluated.len(),
            triggered_names.join(", "),
            rep_name,
            representative.signal
        );
        result.indicator_summary = format!(
            "triggered: {} | {}",
            triggered_names.join(", "),
            representative.indicator_summary
        );
        result
            .metadata
            .insert("triggered_count".to_string(), triggered.len().to_string());
        result.metadata.insert(
            "total_strategies".to_string(),
            evaluated.len().to_string(),
        );
        result
            .metadata
            .insert("representative".to_string(), rep_name.to_string());
        result.metadata.extend(per_child);

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::WatchError;
    use crate::domain::market::Candle;
    use crate::domain::signal::Strength;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    /// Test double returning a canned result.
    struct FixedStrategy {
        name: String,
        signal: Signal,
        strength: Strength,
        required: usize,
        timeframes: Vec<Timeframe>,
        timestamp: DateTime<Utc>,
    }

    impl FixedStrategy {
        fn new(name: &str, signal: Signal, strength: Strength) -> Self {
            Self {
                name: name.to_string(),
                signal,
                strength,
                required: 10,
                timeframes: Timeframe::all(),
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            }
        }
    }

    impl Strategy for FixedStrategy {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> String {
            "canned".to_string()
        }

        fn required_data_points(&self) -> usize {
            self.required
        }

        fn supported_timeframes(&self) -> Vec<Timeframe> {
            self.timeframes.clone()
        }

        fn evaluate(&self, _data: &MarketData) -> WatchResult<StrategyResult> {
            let mut r = StrategyResult::new(self.signal, self.strength);
            r.timestamp = self.timestamp;
            Ok(r)
        }
    }

    fn dummy_data() -> MarketData {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let candle = Candle {
            symbol: "BTCETH".to_string(),
            open_time: t0,
            close_time: t0 + chrono::Duration::hours(1),
            open: dec!(15),
            high: dec!(16),
            low: dec!(14),
            close: dec!(15),
            volume: dec!(0),
        };
        MarketData::new("BTCETH", Timeframe::OneHour, vec![candle])
    }

    #[test]
    fn any_trigger_selects_strongest() {
        let composite = CompositeStrategy::new("bundle")
            .with_child(Box::new(FixedStrategy::new("a", Signal::Buy, Strength::Strong)))
            .with_child(Box::new(FixedStrategy::new("b", Signal::None, Strength::Weak)));

        let result = composite.evaluate(&dummy_data()).unwrap();
        assert_eq!(result.signal, Signal::Buy);
        assert_eq!(result.strength, Strength::Strong);
        assert_eq!(result.metadata["triggered_count"], "1");
        assert_eq!(result.metadata["total_strategies"], "2");
        assert_eq!(result.metadata["representative"], "a");
    }

    #[test]
    fn none_iff_no_child_triggers() {
        let composite = CompositeStrategy::new("bundle")
            .with_child(Box::new(FixedStrategy::new("a", Signal::None, Strength::Weak)))
            .with_child(Box::new(FixedStrategy::new("b", Signal::Hold, Strength::Strong)));

        let result = composite.evaluate(&dummy_data()).unwrap();
        assert_eq!(result.signal, Signal::None);
        assert!(!result.is_notifiable());
        assert_eq!(result.metadata["triggered_count"], "0");
        assert_eq!(result.metadata["child_b"], "HOLD(STRONG)");
    }

    #[test]
    fn strength_tie_breaks_on_latest_timestamp() {
        let mut early = FixedStrategy::new("early", Signal::Sell, Strength::Normal);
        early.timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let mut late = FixedStrategy::new("late", Signal::Buy, Strength::Normal);
        late.timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap();

        let composite = CompositeStrategy::new("bundle")
            .with_child(Box::new(early))
            .with_child(Box::new(late));

        let result = composite.evaluate(&dummy_data()).unwrap();
        assert_eq!(result.metadata["representative"], "late");
        assert_eq!(result.signal, Signal::Buy);
    }

    #[test]
    fn required_points_is_max_over_children() {
        let mut a = FixedStrategy::new("a", Signal::None, Strength::Weak);
        a.required = 30;
        let mut b = FixedStrategy::new("b", Signal::None, Strength::Weak);
        b.required = 75;

        let composite = CompositeStrategy::new("bundle")
            .with_child(Box::new(a))
            .with_child(Box::new(b));
        assert_eq!(composite.required_data_points(), 75);
    }

    #[test]
    fn supported_timeframes_is_intersection() {
        let mut a = FixedStrategy::new("a", Signal::None, Strength::Weak);
        a.timeframes = vec![Timeframe::OneHour, Timeframe::OneDay];
        let mut b = FixedStrategy::new("b", Signal::None, Strength::Weak);
        b.timeframes = vec![Timeframe::OneDay, Timeframe::OneWeek];

        let composite = CompositeStrategy::new("bundle")
            .with_child(Box::new(a))
            .with_child(Box::new(b));
        assert_eq!(composite.supported_timeframes(), vec![Timeframe::OneDay]);
    }

    #[test]
    fn child_errors_propagate() {
        struct FailingStrategy;
        impl Strategy for FailingStrategy {
            fn name(&self) -> &str {
                "failing"
            }
            fn description(&self) -> String {
                "always fails".to_string()
            }
            fn required_data_points(&self) -> usize {
                1
            }
            fn supported_timeframes(&self) -> Vec<Timeframe> {
                Timeframe::all()
            }
            fn evaluate(&self, _data: &MarketData) -> WatchResult<StrategyResult> {
                Err(WatchError::InsufficientData { need: 99, have: 1 })
            }
        }

        let composite = CompositeStrategy::new("bundle").with_child(Box::new(FailingStrategy));
        assert!(composite.evaluate(&dummy_data()).is_err());
    }
}
