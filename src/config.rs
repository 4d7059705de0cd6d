use crate::application::watcher::WatcherConfig;
use crate::domain::market::Timeframe;
use crate::infrastructure::datasource::RetryPolicy;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration, loaded from a TOML file. All timeframe
/// and strategy-name parsing happens here, once, at the boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub data_source: DataSourceConfig,
    pub assets: AssetsConfig,
    #[serde(default)]
    pub watcher: WatcherSection,
    #[serde(default)]
    pub notifiers: NotifiersConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataSourceConfig {
    /// "binance" or "coinbase".
    pub primary: String,
    /// Tried when the primary fails validation at startup.
    pub fallback: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Per-source pacing and retry records, keyed by source name.
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitConfig>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl RateLimitConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 600,
            retry_delay_ms: default_retry_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetsConfig {
    /// Base currencies to monitor ("BTC", "ETH", ...).
    pub symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    #[serde(default = "default_cap_refresh_secs")]
    pub market_cap_refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherSection {
    pub interval_secs: u64,
    pub dispatch_interval_secs: u64,
    pub max_workers: usize,
    pub buffer_size: usize,
    pub log_level: String,
    pub strategies: Vec<String>,
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            dispatch_interval_secs: 600,
            max_workers: 8,
            buffer_size: 100,
            log_level: "info".to_string(),
            strategies: vec!["composite_default".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct NotifiersConfig {
    pub log: LogNotifierConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogNotifierConfig {
    pub enabled: bool,
}

impl Default for LogNotifierConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.data_source.primary.as_str(), "binance" | "coinbase") {
            bail!(
                "unsupported data source '{}' (expected binance or coinbase)",
                self.data_source.primary
            );
        }
        if let Some(fallback) = &self.data_source.fallback
            && !matches!(fallback.as_str(), "binance" | "coinbase")
        {
            bail!("unsupported fallback data source '{}'", fallback);
        }
        if self.assets.symbols.is_empty() {
            bail!("assets.symbols must not be empty");
        }
        if self.assets.timeframes.is_empty() {
            bail!("assets.timeframes must not be empty");
        }
        if self.watcher.strategies.is_empty() {
            bail!("watcher.strategies must not be empty");
        }
        if self.watcher.max_workers == 0 {
            bail!("watcher.max_workers must be positive");
        }
        Ok(())
    }

    /// Pacing/retry record for a source, with sensible defaults when
    /// the config carries none.
    pub fn rate_limit_for(&self, source: &str) -> RateLimitConfig {
        self.data_source
            .rate_limits
            .get(source)
            .copied()
            .unwrap_or_else(|| match source {
                "binance" => RateLimitConfig {
                    requests_per_minute: 1100,
                    ..RateLimitConfig::default()
                },
                _ => RateLimitConfig::default(),
            })
    }

    pub fn market_cap_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.assets.market_cap_refresh_interval_secs)
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            interval: Duration::from_secs(self.watcher.interval_secs),
            dispatch_interval: Duration::from_secs(self.watcher.dispatch_interval_secs),
            max_workers: self.watcher.max_workers,
            ..WatcherConfig::default()
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_currency() -> String {
    "USDT".to_string()
}

fn default_cap_refresh_secs() -> u64 {
    3600
}
