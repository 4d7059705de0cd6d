use crate::domain::errors::{WatchError, WatchResult};
use crate::domain::market::Timeframe;
use crate::infrastructure::datasource::DataSource;
use crate::infrastructure::marketcap::MarketCapProvider;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Cross-pair generation ceiling.
const MAX_CROSS_PAIRS: usize = 10;

/// Cross-pairs assumed when no market-cap data is reachable at all.
/// Only pairs whose two legs validated are actually used.
const FALLBACK_CROSS_PAIRS: [(&str, &str); 5] = [
    ("ETH", "BTC"),
    ("BNB", "BTC"),
    ("BNB", "ETH"),
    ("SOL", "BTC"),
    ("SOL", "ETH"),
];

/// Outcome of validating the configured asset universe against the
/// active data source.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// Base currencies whose direct pair against the base currency exists.
    pub valid_symbols: Vec<String>,
    /// Directly monitorable pairs (symbol + base currency, and listed
    /// cross-pairs).
    pub valid_pairs: Vec<String>,
    /// Cross-pairs that must be synthesized via the bridge.
    pub calculated_pairs: Vec<String>,
    /// Symbols the source knows nothing about.
    pub missing_symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
}

impl ValidationResult {
    /// Union of direct and synthesized pairs, de-duplicated, sorted.
    pub fn all_monitoring_pairs(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self
            .valid_pairs
            .iter()
            .chain(self.calculated_pairs.iter())
            .collect();
        set.into_iter().cloned().collect()
    }
}

/// Verifies configured symbols against the data source, ranks them by
/// market cap, and derives the monitoring pair set.
pub struct AssetValidator {
    source: Arc<dyn DataSource>,
    caps: Arc<dyn MarketCapProvider>,
    base_currency: String,
    refresh_interval: Duration,
    cache: Mutex<Option<CapSnapshot>>,
}

struct CapSnapshot {
    caps: HashMap<String, f64>,
    taken_at: Instant,
}

impl AssetValidator {
    pub fn new(
        source: Arc<dyn DataSource>,
        caps: Arc<dyn MarketCapProvider>,
        base_currency: impl Into<String>,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            source,
            caps,
            base_currency: base_currency.into().to_uppercase(),
            refresh_interval,
            cache: Mutex::new(None),
        }
    }

    /// Probes every configured symbol, partitions the universe, and
    /// generates cross-pairs from the cap-sorted valid set. Fails only
    /// when not a single symbol validates.
    pub async fn validate(
        &self,
        symbols: &[String],
        timeframes: &[Timeframe],
    ) -> WatchResult<ValidationResult> {
        let mut valid_symbols = Vec::new();
        let mut valid_pairs = Vec::new();
        let mut missing_symbols = Vec::new();

        for symbol in symbols {
            let symbol = symbol.to_uppercase();
            let pair = format!("{}{}", symbol, self.base_currency);
            match self.source.is_symbol_valid(&pair).await {
                Ok(true) => {
                    valid_symbols.push(symbol);
                    valid_pairs.push(pair);
                }
                Ok(false) => missing_symbols.push(symbol),
                Err(WatchError::Cancelled) => return Err(WatchError::Cancelled),
                Err(err) => {
                    warn!(pair = %pair, error = %err, "symbol probe failed");
                    missing_symbols.push(symbol);
                }
            }
        }

        if valid_symbols.is_empty() {
            return Err(WatchError::invalid_argument(format!(
                "none of the configured symbols validate against {}",
                self.source.name()
            )));
        }
        info!(
            valid = valid_symbols.len(),
            missing = missing_symbols.len(),
            source = self.source.name(),
            "asset validation complete"
        );

        let candidate_pairs = self.cross_pair_candidates(&valid_symbols).await;

        let mut calculated_pairs = Vec::new();
        for pair in candidate_pairs {
            match self.source.is_symbol_valid(&pair).await {
                Ok(true) => valid_pairs.push(pair),
                Ok(false) => calculated_pairs.push(pair),
                Err(WatchError::Cancelled) => return Err(WatchError::Cancelled),
                Err(err) => {
                    debug!(pair = %pair, error = %err, "cross-pair probe failed, scheduling synthesis");
                    calculated_pairs.push(pair);
                }
            }
        }

        Ok(ValidationResult {
            valid_symbols,
            valid_pairs,
            calculated_pairs,
            missing_symbols,
            timeframes: timeframes.to_vec(),
        })
    }

    /// Cross-pairs in exchange-convention order: for two symbols the
    /// lower-cap one is the base, the higher-cap one the quote.
    async fn cross_pair_candidates(&self, valid_symbols: &[String]) -> Vec<String> {
        let caps = match self.market_caps(valid_symbols).await {
            Some(caps) => caps,
            None => {
                warn!("no market-cap data available, using the fixed cross-pair set");
                return FALLBACK_CROSS_PAIRS
                    .iter()
                    .filter(|(base, quote)| {
                        valid_symbols.iter().any(|s| s == base)
                            && valid_symbols.iter().any(|s| s == quote)
                    })
                    .map(|(base, quote)| format!("{}{}", base, quote))
                    .take(MAX_CROSS_PAIRS)
                    .collect();
            }
        };

        let mut ranked: Vec<&String> = valid_symbols
            .iter()
            .filter(|s| caps.contains_key(*s))
            .collect();
        ranked.sort_by(|a, b| {
            caps[*b]
                .partial_cmp(&caps[*a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut pairs = Vec::new();
        'outer: for (i, quote) in ranked.iter().enumerate() {
            for base in ranked.iter().skip(i + 1) {
                pairs.push(format!("{}{}", base, quote));
                if pairs.len() >= MAX_CROSS_PAIRS {
                    break 'outer;
                }
            }
        }
        pairs
    }

    /// Market-cap snapshot, served from the TTL cache. On provider
    /// failure the last snapshot is reused regardless of age; `None`
    /// only when no snapshot was ever taken.
    async fn market_caps(&self, symbols: &[String]) -> Option<HashMap<String, f64>> {
        let mut cache = self.cache.lock().await;

        if let Some(snapshot) = cache.as_ref()
            && snapshot.taken_at.elapsed() < self.refresh_interval
        {
            return Some(snapshot.caps.clone());
        }

        match self.caps.get_market_caps(symbols).await {
            Ok(caps) if !caps.is_empty() => {
                *cache = Some(CapSnapshot {
                    caps: caps.clone(),
                    taken_at: Instant::now(),
                });
                Some(caps)
            }
            Ok(_) => {
                debug!("market-cap provider resolved no symbols");
                cache.as_ref().map(|s| s.caps.clone())
            }
            Err(err) => {
                warn!(provider = self.caps.name(), error = %err, "market-cap refresh failed, reusing last snapshot");
                cache.as_ref().map(|s| s.caps.clone())
            }
        }
    }
}
