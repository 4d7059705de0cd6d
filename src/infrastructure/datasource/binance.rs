use crate::domain::errors::{WatchError, WatchResult};
use crate::domain::market::{Candle, Timeframe, validate_series};
use crate::infrastructure::datasource::rate_gate::RateGate;
use crate::infrastructure::datasource::{
    DataSource, RetryPolicy, build_http_client, classify_status, classify_transport,
    request_with_retry,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
/// Hard ceiling of the klines endpoint.
const MAX_KLINES_LIMIT: usize = 1000;

/// Binance spot adapter. Symbols are already in Binance pair form
/// ("BTCUSDT"); every supported timeframe maps directly onto a native
/// kline interval, so no aggregation is needed.
pub struct BinanceSource {
    client: reqwest::Client,
    base_url: String,
    gate: RateGate,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl BinanceSource {
    pub fn builder() -> BinanceSourceBuilder {
        BinanceSourceBuilder::default()
    }

    fn klines_url(&self) -> String {
        format!("{}/api/v3/klines", self.base_url)
    }

    async fn fetch_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> WatchResult<Vec<Candle>> {
        let symbol = symbol.to_uppercase();
        let mut params: Vec<(&str, String)> = vec![
            ("symbol", symbol.clone()),
            ("interval", timeframe.as_str().to_string()),
            ("limit", limit.min(MAX_KLINES_LIMIT).to_string()),
        ];
        if let Some(start) = start {
            params.push(("startTime", start.timestamp_millis().to_string()));
        }
        if let Some(end) = end {
            params.push(("endTime", end.timestamp_millis().to_string()));
        }

        let url = self.klines_url();
        let rows: Vec<serde_json::Value> =
            request_with_retry(&self.gate, &self.retry, &self.cancel, || {
                let client = self.client.clone();
                let url = url.clone();
                let params = params.clone();
                async move {
                    let response = client
                        .get(&url)
                        .query(&params)
                        .send()
                        .await
                        .map_err(|e| classify_transport(e, "binance klines"))?;

                    let status = response.status();
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        if body.contains("-1121") || body.contains("Invalid symbol") {
                            return Err(WatchError::not_found("binance: unknown symbol"));
                        }
                        return Err(classify_status(status, "binance klines"));
                    }

                    response
                        .json()
                        .await
                        .map_err(|e| classify_transport(e, "binance klines body"))
                }
            })
            .await?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            candles.push(parse_kline_row(&symbol, &row)?);
        }
        candles.sort_by_key(|c| c.open_time);
        validate_series(&candles)?;

        debug!(symbol = %symbol, timeframe = %timeframe, count = candles.len(), "binance klines fetched");
        Ok(candles)
    }
}

/// One Binance kline row:
/// `[openTime, open, high, low, close, volume, closeTime, ...]`
/// with prices encoded as strings and times as epoch millis.
fn parse_kline_row(symbol: &str, row: &serde_json::Value) -> WatchResult<Candle> {
    let arr = row
        .as_array()
        .ok_or_else(|| WatchError::parse("binance kline row is not an array"))?;
    if arr.len() < 7 {
        return Err(WatchError::parse(format!(
            "binance kline row has {} fields, expected at least 7",
            arr.len()
        )));
    }

    let time_field = |i: usize| -> WatchResult<DateTime<Utc>> {
        let ms = arr[i]
            .as_i64()
            .ok_or_else(|| WatchError::parse(format!("binance kline field {} is not a timestamp", i)))?;
        Utc.timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| WatchError::parse(format!("binance kline timestamp {} out of range", ms)))
    };
    let price_field = |i: usize| -> WatchResult<Decimal> {
        let s = arr[i]
            .as_str()
            .ok_or_else(|| WatchError::parse(format!("binance kline field {} is not a string", i)))?;
        Decimal::from_str_exact(s)
            .map_err(|e| WatchError::parse(format!("binance kline field {}: {}", i, e)))
    };

    Ok(Candle {
        symbol: symbol.to_string(),
        open_time: time_field(0)?,
        close_time: time_field(6)?,
        open: price_field(1)?,
        high: price_field(2)?,
        low: price_field(3)?,
        close: price_field(4)?,
        volume: price_field(5)?,
    })
}

#[async_trait]
impl DataSource for BinanceSource {
    fn name(&self) -> &str {
        "binance"
    }

    async fn get_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> WatchResult<Vec<Candle>> {
        if limit == 0 {
            return Err(WatchError::invalid_argument("limit must be positive"));
        }
        self.fetch_klines(symbol, timeframe, start, end, limit).await
    }

    async fn is_symbol_valid(&self, symbol: &str) -> WatchResult<bool> {
        match self
            .fetch_klines(symbol, Timeframe::OneDay, None, None, 1)
            .await
        {
            Ok(candles) => Ok(!candles.is_empty()),
            Err(WatchError::NotFound(_)) | Err(WatchError::InvalidArgument(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[derive(Default)]
pub struct BinanceSourceBuilder {
    base_url: Option<String>,
    timeout: Option<std::time::Duration>,
    requests_per_minute: Option<u32>,
    retry: Option<RetryPolicy>,
    cancel: Option<CancellationToken>,
}

impl BinanceSourceBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = Some(rpm);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> BinanceSource {
        BinanceSource {
            client: build_http_client(self.timeout),
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            gate: RateGate::new(self.requests_per_minute.unwrap_or(1100)),
            retry: self.retry.unwrap_or_default(),
            cancel: self.cancel.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_kline_row() {
        let row = json!([
            1714521600000i64,
            "60000.00",
            "61000.00",
            "59500.00",
            "60500.00",
            "123.456",
            1714525199999i64
        ]);
        let candle = parse_kline_row("BTCUSDT", &row).unwrap();
        assert_eq!(candle.symbol, "BTCUSDT");
        assert_eq!(candle.open.to_string(), "60000.00");
        assert_eq!(candle.volume.to_string(), "123.456");
        assert!(candle.close_time > candle.open_time);
        candle.validate().unwrap();
    }

    #[test]
    fn rejects_short_rows() {
        let row = json!([1714521600000i64, "1", "2"]);
        assert!(matches!(
            parse_kline_row("BTCUSDT", &row),
            Err(WatchError::Parse(_))
        ));
    }

    #[test]
    fn rejects_numeric_prices() {
        // Binance encodes prices as strings; numbers mean a schema change.
        let row = json!([
            1714521600000i64,
            60000.0,
            61000.0,
            59500.0,
            60500.0,
            123.0,
            1714525199999i64
        ]);
        assert!(matches!(
            parse_kline_row("BTCUSDT", &row),
            Err(WatchError::Parse(_))
        ));
    }

    #[test]
    fn builder_defaults() {
        let source = BinanceSource::builder().build();
        assert_eq!(source.name(), "binance");
        assert_eq!(source.base_url, DEFAULT_BASE_URL);
        assert_eq!(source.gate.capacity(), 1100);
    }
}
