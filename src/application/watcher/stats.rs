use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Per-symbol monitoring bookkeeping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolStats {
    pub last_check: Option<DateTime<Utc>>,
    pub last_signal: Option<DateTime<Utc>>,
}

/// Counters for one watcher instance. The watcher mutates these
/// behind its lock; callers get read-only snapshots.
#[derive(Debug, Clone, Default)]
pub struct WatcherStats {
    pub tasks_total: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub notifications_sent: u64,
    pub symbols: HashMap<String, SymbolStats>,
    pub last_update: Option<DateTime<Utc>>,
}

impl WatcherStats {
    fn touch(&mut self) {
        self.last_update = Some(Utc::now());
    }

    pub fn record_task_started(&mut self) {
        self.tasks_total += 1;
        self.touch();
    }

    pub fn record_task_completed(&mut self, symbol: &str) {
        self.tasks_completed += 1;
        self.symbols.entry(symbol.to_string()).or_default().last_check = Some(Utc::now());
        self.touch();
    }

    pub fn record_task_failed(&mut self, symbol: &str) {
        self.tasks_failed += 1;
        self.symbols.entry(symbol.to_string()).or_default().last_check = Some(Utc::now());
        self.touch();
    }

    pub fn record_signal(&mut self, symbol: &str) {
        self.symbols
            .entry(symbol.to_string())
            .or_default()
            .last_signal = Some(Utc::now());
        self.touch();
    }

    pub fn record_notification(&mut self) {
        self.notifications_sent += 1;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_and_timestamps_advance() {
        let mut stats = WatcherStats::default();
        assert!(stats.last_update.is_none());

        stats.record_task_started();
        stats.record_task_completed("BTCUSDT");
        stats.record_signal("BTCUSDT");
        stats.record_task_started();
        stats.record_task_failed("ETHBTC");
        stats.record_notification();

        assert_eq!(stats.tasks_total, 2);
        assert_eq!(stats.tasks_completed, 1);
        assert_eq!(stats.tasks_failed, 1);
        assert_eq!(stats.notifications_sent, 1);
        assert!(stats.symbols["BTCUSDT"].last_signal.is_some());
        assert!(stats.symbols["ETHBTC"].last_check.is_some());
        assert!(stats.symbols["ETHBTC"].last_signal.is_none());
        assert!(stats.last_update.is_some());
    }
}
