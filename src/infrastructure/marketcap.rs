use crate::domain::errors::{WatchError, WatchResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Supplies USD market capitalizations for ranking cross-pairs.
///
/// Invoked at most once per refresh interval by the asset validator,
/// which caches the snapshot; providers do not cache themselves.
#[async_trait]
pub trait MarketCapProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Maps each known symbol to its USD market cap. Unknown symbols
    /// are simply absent from the result.
    async fn get_market_caps(&self, symbols: &[String]) -> WatchResult<HashMap<String, f64>>;
}

/// CoinGecko-backed provider for the handful of majors the watcher
/// monitors. Symbols outside the id table are skipped.
pub struct CoinGeckoProvider {
    client: reqwest::Client,
    base_url: String,
}

/// Symbol -> CoinGecko id for the supported universe.
const COINGECKO_IDS: [(&str, &str); 16] = [
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("BNB", "binancecoin"),
    ("SOL", "solana"),
    ("XRP", "ripple"),
    ("ADA", "cardano"),
    ("DOGE", "dogecoin"),
    ("AVAX", "avalanche-2"),
    ("DOT", "polkadot"),
    ("LINK", "chainlink"),
    ("LTC", "litecoin"),
    ("MATIC", "matic-network"),
    ("ATOM", "cosmos"),
    ("UNI", "uniswap"),
    ("XLM", "stellar"),
    ("NEAR", "near"),
];

impl CoinGeckoProvider {
    pub fn new() -> Self {
        Self::with_base_url("https://api.coingecko.com")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.into(),
        }
    }

    fn id_for(symbol: &str) -> Option<&'static str> {
        let symbol = symbol.to_uppercase();
        COINGECKO_IDS
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, id)| *id)
    }
}

impl Default for CoinGeckoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct MarketRow {
    id: String,
    market_cap: Option<f64>,
}

#[async_trait]
impl MarketCapProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn get_market_caps(&self, symbols: &[String]) -> WatchResult<HashMap<String, f64>> {
        let mut id_to_symbol: HashMap<&'static str, String> = HashMap::new();
        for symbol in symbols {
            if let Some(id) = Self::id_for(symbol) {
                id_to_symbol.insert(id, symbol.to_uppercase());
            }
        }
        if id_to_symbol.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<&str> = id_to_symbol.keys().copied().collect();
        let ids_param = ids.join(",");
        let url = format!("{}/api/v3/coins/markets", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("vs_currency", "usd"), ("ids", ids_param.as_str())])
            .send()
            .await
            .map_err(|e| WatchError::transient(format!("coingecko markets: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                WatchError::transient(format!("coingecko markets: HTTP {}", status))
            } else {
                WatchError::invalid_argument(format!("coingecko markets: HTTP {}", status))
            });
        }

        let rows: Vec<MarketRow> = response
            .json()
            .await
            .map_err(|e| WatchError::parse(format!("coingecko markets body: {}", e)))?;

        let mut caps = HashMap::new();
        for row in rows {
            if let (Some(symbol), Some(cap)) = (id_to_symbol.get(row.id.as_str()), row.market_cap) {
                caps.insert(symbol.clone(), cap);
            }
        }
        debug!(requested = symbols.len(), resolved = caps.len(), "market caps fetched");
        Ok(caps)
    }
}

/// Fixed-value provider for tests and offline runs.
pub struct FixedMarketCapProvider {
    caps: HashMap<String, f64>,
}

impl FixedMarketCapProvider {
    pub fn new(caps: HashMap<String, f64>) -> Self {
        Self { caps }
    }

    /// Rough, static ordering of the major caps; good enough to rank
    /// cross-pairs when no live provider is configured.
    pub fn with_defaults() -> Self {
        let caps = [
            ("BTC", 1_200_000_000_000.0),
            ("ETH", 400_000_000_000.0),
            ("BNB", 90_000_000_000.0),
            ("SOL", 80_000_000_000.0),
            ("XRP", 35_000_000_000.0),
            ("ADA", 15_000_000_000.0),
            ("DOGE", 12_000_000_000.0),
            ("AVAX", 11_000_000_000.0),
            ("DOT", 9_000_000_000.0),
            ("LINK", 8_000_000_000.0),
        ]
        .into_iter()
        .map(|(s, c)| (s.to_string(), c))
        .collect();
        Self { caps }
    }
}

#[async_trait]
impl MarketCapProvider for FixedMarketCapProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn get_market_caps(&self, symbols: &[String]) -> WatchResult<HashMap<String, f64>> {
        Ok(symbols
            .iter()
            .filter_map(|s| {
                let key = s.to_uppercase();
                self.caps.get(&key).map(|cap| (key, *cap))
            })
            .collect())
    }
}
