pub mod stats;

use crate::application::rate_calculator::RateCalculator;
use crate::application::strategies::Strategy;
use crate::application::validator::ValidationResult;
use crate::domain::errors::{WatchError, WatchResult};
use crate::domain::market::{MarketData, Timeframe};
use crate::domain::signal::{Signal, StrategyResult, Strength};
use crate::infrastructure::datasource::DataSource;
use crate::infrastructure::notifier::{
    Notification, NotificationKind, NotificationLevel, NotifierManager,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use stats::{SymbolStats, WatcherStats};

/// Symbols recognized when decomposing a concatenated cross-pair.
const CRYPTO_SYMBOLS: [&str; 24] = [
    "BTC", "ETH", "BNB", "SOL", "XRP", "ADA", "DOGE", "AVAX", "DOT", "LINK", "LTC", "UNI", "ATOM",
    "XLM", "NEAR", "TRX", "BCH", "ALGO", "FIL", "APT", "ARB", "INJ", "SUI", "MATIC",
];

/// Floor on the per-cell data requirement, independent of strategies.
const MIN_REQUIRED_POINTS: usize = 20;

/// Tuning knobs of the orchestrator.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Pause between matrix passes in continuous mode.
    pub interval: Duration,
    /// How often the report-dispatch timer examines the pending list.
    pub dispatch_interval: Duration,
    /// Concurrent cell ceiling.
    pub max_workers: usize,
    /// Bridge currency for synthesized cross-rates.
    pub bridge_currency: String,
    /// Pending count that forces a report out immediately.
    pub count_threshold: usize,
    /// Minimum quiet period before the timer flushes a partial batch.
    pub time_threshold: Duration,
    /// Cap on signals rendered in the report prose. The structured
    /// data map always carries the full list.
    pub max_rendered_signals: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            dispatch_interval: Duration::from_secs(600),
            max_workers: 8,
            bridge_currency: "USDT".to_string(),
            count_threshold: 3,
            time_threshold: Duration::from_secs(60),
            max_rendered_signals: 10,
        }
    }
}

/// One notifiable strategy outcome awaiting report dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalInfo {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub signal: Signal,
    /// Latest RSI reading when the strategy computed one, else zero.
    pub rsi: f64,
    pub price: Decimal,
    pub confidence: Strength,
    pub strategy: String,
    pub timestamp: DateTime<Utc>,
}

struct PendingSignals {
    signals: Vec<SignalInfo>,
    last_report: Instant,
}

/// Drives the {symbol x timeframe x strategy} matrix, funnels
/// notifiable results into a pending list, and batches them into
/// consolidated reports.
pub struct Watcher {
    source: Arc<dyn DataSource>,
    rate_calculator: RateCalculator,
    strategies: Vec<Arc<dyn Strategy>>,
    notifier: Arc<NotifierManager>,
    pairs: Vec<String>,
    timeframes: Vec<Timeframe>,
    config: WatcherConfig,
    pending: Mutex<PendingSignals>,
    stats: Mutex<WatcherStats>,
    cancel: CancellationToken,
}

impl Watcher {
    pub fn new(
        source: Arc<dyn DataSource>,
        strategies: Vec<Arc<dyn Strategy>>,
        notifier: Arc<NotifierManager>,
        validation: &ValidationResult,
        config: WatcherConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rate_calculator: RateCalculator::new(source.clone()),
            source,
            strategies,
            notifier,
            pairs: validation.all_monitoring_pairs(),
            timeframes: validation.timeframes.clone(),
            config,
            pending: Mutex::new(PendingSignals {
                signals: Vec::new(),
                last_report: Instant::now(),
            }),
            stats: Mutex::new(WatcherStats::default()),
            cancel,
        }
    }

    /// Read-only statistics snapshot.
    pub fn stats(&self) -> WatcherStats {
        self.stats.lock().expect("stats lock").clone()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending lock").signals.len()
    }

    /// Largest data requirement across registered strategies, floored
    /// so even trivial strategy sets get a meaningful window.
    fn max_required_points(&self) -> usize {
        self.strategies
            .iter()
            .map(|s| s.required_data_points())
            .max()
            .unwrap_or(0)
            .max(MIN_REQUIRED_POINTS)
    }

    /// One full pass over the matrix followed by an unconditional
    /// flush of whatever signals accumulated.
    pub async fn run_once(self: Arc<Self>) -> WatchResult<()> {
        info!(
            pairs = self.pairs.len(),
            timeframes = self.timeframes.len(),
            strategies = self.strategies.len(),
            "single-run matrix pass starting"
        );
        Self::matrix_pass(&self).await;
        self.dispatch_pending("single-run flush", true).await;
        Ok(())
    }

    /// Continuous mode: periodic matrix passes plus an independent
    /// report-dispatch timer, both until cancellation. Pending signals
    /// are drained before returning.
    pub async fn run(self: Arc<Self>) -> WatchResult<()> {
        info!(
            pairs = self.pairs.len(),
            timeframes = self.timeframes.len(),
            interval_secs = self.config.interval.as_secs(),
            "continuous watch starting"
        );

        let dispatcher = {
            let watcher = self.clone();
            tokio::spawn(async move { watcher.dispatch_loop().await })
        };

        loop {
            Self::matrix_pass(&self).await;
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        let _ = dispatcher.await;
        // Orderly shutdown still reports what was already collected.
        self.dispatch_pending("shutdown flush", true).await;
        info!("continuous watch stopped");
        Ok(())
    }

    async fn dispatch_loop(&self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.config.dispatch_interval) => {}
            }
            let due = {
                let pending = self.pending.lock().expect("pending lock");
                !pending.signals.is_empty()
                    && pending.last_report.elapsed() >= self.config.time_threshold
            };
            if due {
                self.dispatch_pending("time threshold", false).await;
            }
        }
    }

    /// Fans the matrix out across tasks, one per cell, bounded by the
    /// worker semaphore.
    async fn matrix_pass(this: &Arc<Self>) {
        let semaphore = Arc::new(Semaphore::new(this.config.max_workers.max(1)));
        let mut handles = Vec::with_capacity(this.pairs.len() * this.timeframes.len());

        for pair in &this.pairs {
            for &timeframe in &this.timeframes {
                let watcher = this.clone();
                let semaphore = semaphore.clone();
                let pair = pair.clone();
                handles.push(tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return;
                    };
                    watcher.process_cell(&pair, timeframe).await;
                }));
            }
        }
        join_all(handles).await;
    }

    /// Evaluates every registered strategy on one (symbol, timeframe)
    /// cell. All failures are contained here; they increment counters
    /// and never disturb the rest of the matrix.
    async fn process_cell(&self, symbol: &str, timeframe: Timeframe) {
        self.stats.lock().expect("stats lock").record_task_started();

        if self.cancel.is_cancelled() {
            self.stats
                .lock()
                .expect("stats lock")
                .record_task_failed(symbol);
            return;
        }

        let data = match self.fetch_cell_data(symbol, timeframe).await {
            Ok(data) => data,
            Err(err) => {
                warn!(symbol, timeframe = %timeframe, error = %err, "cell data fetch failed");
                self.stats
                    .lock()
                    .expect("stats lock")
                    .record_task_failed(symbol);
                return;
            }
        };

        let mut cell_failed = false;
        for strategy in &self.strategies {
            if !strategy.supported_timeframes().contains(&timeframe) {
                debug!(strategy = strategy.name(), timeframe = %timeframe, "timeframe unsupported, skipping");
                continue;
            }
            match strategy.evaluate(&data) {
                Ok(result) if result.is_notifiable() => {
                    info!(
                        symbol,
                        timeframe = %timeframe,
                        strategy = strategy.name(),
                        signal = %result.signal,
                        strength = %result.strength,
                        "signal"
                    );
                    self.enqueue_signal(&data, strategy.name(), &result).await;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(symbol, timeframe = %timeframe, strategy = strategy.name(), error = %err, "strategy evaluation failed");
                    cell_failed = true;
                }
            }
        }

        let mut stats = self.stats.lock().expect("stats lock");
        if cell_failed {
            stats.record_task_failed(symbol);
        } else {
            stats.record_task_completed(symbol);
        }
    }

    /// Obtains candles for a cell, falling back to bridge-currency
    /// synthesis when the direct pair is unavailable but the symbol
    /// decomposes into two known crypto assets.
    async fn fetch_cell_data(&self, symbol: &str, timeframe: Timeframe) -> WatchResult<MarketData> {
        let need = self.max_required_points();
        let limit = need * 2;
        let end = Utc::now();
        let start = end - timeframe.duration() * limit as i32;

        let direct = self
            .source
            .get_klines(symbol, timeframe, Some(start), Some(end), limit)
            .await;

        let candles = match direct {
            Ok(candles) => candles,
            Err(WatchError::Cancelled) => return Err(WatchError::Cancelled),
            Err(err) => match split_cross_pair(symbol) {
                Some((base, quote)) => {
                    debug!(symbol, error = %err, "direct fetch failed, synthesizing via bridge");
                    self.rate_calculator
                        .rate_candles(
                            base,
                            quote,
                            &self.config.bridge_currency,
                            timeframe,
                            Some(start),
                            Some(end),
                            limit,
                        )
                        .await?
                }
                None => return Err(err),
            },
        };

        if candles.len() < need {
            return Err(WatchError::InsufficientData {
                need,
                have: candles.len(),
            });
        }
        Ok(MarketData::new(symbol, timeframe, candles))
    }

    /// Appends one notifiable result to the pending list; a full
    /// batch is dispatched immediately.
    async fn enqueue_signal(&self, data: &MarketData, strategy: &str, result: &StrategyResult) {
        let info = SignalInfo {
            symbol: data.symbol.clone(),
            timeframe: data.timeframe,
            signal: result.signal,
            rsi: result.indicators.get("rsi").copied().unwrap_or(0.0),
            price: data.last_close().unwrap_or(Decimal::ZERO),
            confidence: result.strength,
            strategy: strategy.to_string(),
            timestamp: result.timestamp,
        };

        let count_reached = {
            let mut pending = self.pending.lock().expect("pending lock");
            pending.signals.push(info);
            pending.signals.len() >= self.config.count_threshold
        };
        self.stats
            .lock()
            .expect("stats lock")
            .record_signal(&data.symbol);

        if count_reached {
            self.dispatch_pending("count threshold", false).await;
        }
    }

    /// Takes the pending list and last-report-time atomically; when
    /// anything was taken (or `force` with at least one entry), builds
    /// and sends the consolidated report.
    async fn dispatch_pending(&self, reason: &str, force: bool) {
        let signals = {
            let mut pending = self.pending.lock().expect("pending lock");
            if pending.signals.is_empty() {
                return;
            }
            if !force && pending.signals.len() < self.config.count_threshold {
                // Raced with another dispatcher; the timer path
                // re-checks its own condition before calling here.
                if pending.last_report.elapsed() < self.config.time_threshold {
                    return;
                }
            }
            pending.last_report = Instant::now();
            std::mem::take(&mut pending.signals)
        };

        let report = self.build_report(&signals, reason);
        self.notifier.send(&report).await.ok();
        self.stats
            .lock()
            .expect("stats lock")
            .record_notification();
        info!(count = signals.len(), reason, "signal report dispatched");
    }

    /// One consolidated notification for a batch of signals. The
    /// prose enumerates at most `max_rendered_signals`; the data map
    /// carries them all.
    fn build_report(&self, signals: &[SignalInfo], reason: &str) -> Notification {
        let mut notification = Notification::new(
            NotificationKind::StrategySignal,
            NotificationLevel::Info,
            format!("{} trading signal(s)", signals.len()),
        );
        // Single-origin batches keep their asset/strategy attribution.
        if let [only] = signals {
            notification = notification
                .with_asset(only.symbol.clone())
                .with_strategy(only.strategy.clone());
        }

        let mut lines = Vec::with_capacity(signals.len().min(self.config.max_rendered_signals) + 1);
        for info in signals.iter().take(self.config.max_rendered_signals) {
            lines.push(format!(
                "{} {} {} @ {} [{}] ({})",
                info.signal, info.symbol, info.timeframe, info.price, info.confidence, info.strategy
            ));
        }
        if signals.len() > self.config.max_rendered_signals {
            lines.push(format!(
                "... and {} more",
                signals.len() - self.config.max_rendered_signals
            ));
        }
        notification.message = lines.join("\n");

        notification.data.insert(
            "signals".to_string(),
            serde_json::to_value(signals).unwrap_or_default(),
        );
        notification
            .data
            .insert("count".to_string(), serde_json::json!(signals.len()));
        notification
            .data
            .insert("reason".to_string(), serde_json::json!(reason));
        notification
    }
}

/// Splits a concatenated pair like "ETHBTC" or "AVAXBTC" into its two
/// legs against the known crypto enumeration, trying the 3+3, 3+4 and
/// 4+3 decompositions.
fn split_cross_pair(symbol: &str) -> Option<(&str, &str)> {
    let known = |s: &str| CRYPTO_SYMBOLS.contains(&s);
    for (base_len, quote_len) in [(3, 3), (3, 4), (4, 3)] {
        if symbol.len() != base_len + quote_len {
            continue;
        }
        let (base, quote) = symbol.split_at(base_len);
        if known(base) && known(quote) {
            return Some((base, quote));
        }
    }
    None
}
