use crate::domain::errors::{WatchError, WatchResult};
use crate::domain::market::{Candle, Timeframe, validate_series};
use crate::infrastructure::datasource::rate_gate::RateGate;
use crate::infrastructure::datasource::{
    DataSource, RetryPolicy, build_http_client, classify_status, classify_transport,
    request_with_retry,
};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.exchange.coinbase.com";
/// Candles-per-request ceiling of the exchange API.
const MAX_CANDLES_PER_REQUEST: i64 = 300;
/// Quote assets Coinbase lists directly; tried longest-first when
/// decomposing a normalized symbol into a product id.
const KNOWN_QUOTES: [&str; 6] = ["USDC", "USD", "BTC", "ETH", "EUR", "GBP"];

/// Coinbase Exchange adapter.
///
/// The exchange offers granularities up to one day only; weekly and
/// monthly candles are synthesized from daily ones on ISO-week and
/// calendar-month boundaries. Symbols arrive in concatenated form
/// ("BTCUSDT", "ADABTC") and are mapped to dash-separated product ids
/// with the USDT quote substituted by USD.
pub struct CoinbaseSource {
    client: reqwest::Client,
    base_url: String,
    gate: RateGate,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl CoinbaseSource {
    pub fn builder() -> CoinbaseSourceBuilder {
        CoinbaseSourceBuilder::default()
    }

    /// "BTCUSDT" -> "BTC-USD", "ADABTC" -> "ADA-BTC".
    fn product_id(symbol: &str) -> WatchResult<String> {
        let symbol = symbol.to_uppercase();
        if let Some(base) = symbol.strip_suffix("USDT")
            && !base.is_empty()
        {
            return Ok(format!("{}-USD", base));
        }
        for quote in KNOWN_QUOTES {
            if let Some(base) = symbol.strip_suffix(quote)
                && !base.is_empty()
            {
                return Ok(format!("{}-{}", base, quote));
            }
        }
        Err(WatchError::invalid_argument(format!(
            "coinbase: cannot map symbol '{}' to a product id",
            symbol
        )))
    }

    fn granularity(timeframe: Timeframe) -> Option<i64> {
        match timeframe {
            Timeframe::OneMin => Some(60),
            Timeframe::FiveMin => Some(300),
            Timeframe::FifteenMin => Some(900),
            Timeframe::OneHour => Some(3600),
            Timeframe::SixHour => Some(21600),
            Timeframe::OneDay => Some(86400),
            _ => None,
        }
    }

    /// Fetches candles at a native granularity, paging over the
    /// 300-candle request ceiling.
    async fn fetch_native(
        &self,
        symbol: &str,
        granularity: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> WatchResult<Vec<Candle>> {
        let product = Self::product_id(symbol)?;
        let url = format!("{}/products/{}/candles", self.base_url, product);

        let chunk_span = Duration::seconds(MAX_CANDLES_PER_REQUEST * granularity);
        let mut candles: Vec<Candle> = Vec::new();
        let mut cursor = start;

        while cursor < end {
            let chunk_end = (cursor + chunk_span).min(end);
            let params = [
                ("granularity", granularity.to_string()),
                ("start", cursor.to_rfc3339()),
                ("end", chunk_end.to_rfc3339()),
            ];

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
                            .map_err(|e| classify_transport(e, "coinbase candles"))?;

                        let status = response.status();
                        if status == reqwest::StatusCode::NOT_FOUND {
                            return Err(WatchError::not_found("coinbase: unknown product"));
                        }
                        if !status.is_success() {
                            return Err(classify_status(status, "coinbase candles"));
                        }

                        response
                            .json()
                            .await
                            .map_err(|e| classify_transport(e, "coinbase candles body"))
                    }
                })
                .await?;

            for row in &rows {
                candles.push(parse_candle_row(symbol, row, granularity)?);
            }
            cursor = chunk_end;
        }

        // Rows arrive newest-first per chunk; normalize globally.
        candles.sort_by_key(|c| c.open_time);
        candles.dedup_by_key(|c| c.open_time);
        validate_series(&candles)?;

        debug!(symbol, granularity, count = candles.len(), "coinbase candles fetched");
        Ok(candles)
    }

    /// Builds weekly or monthly candles out of daily ones.
    async fn fetch_aggregated(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        end: DateTime<Utc>,
        limit: usize,
    ) -> WatchResult<Vec<Candle>> {
        // Enough daily candles to cover `limit` coarse buckets, plus a
        // partial bucket at each edge.
        let days_per_bucket: i64 = match timeframe {
            Timeframe::OneWeek => 7,
            Timeframe::OneMonth => 31,
            _ => {
                return Err(WatchError::invalid_argument(format!(
                    "coinbase: timeframe {} is not aggregated",
                    timeframe
                )));
            }
        };
        let span_days = days_per_bucket * (limit as i64 + 2);
        let start = end - Duration::days(span_days);

        let daily = self.fetch_native(symbol, 86400, start, end).await?;
        if daily.is_empty() {
            return Err(WatchError::InsufficientData { need: 1, have: 0 });
        }

        let mut buckets: Vec<(DateTime<Utc>, Vec<Candle>)> = Vec::new();
        for candle in daily {
            let bucket_start = bucket_start(timeframe, candle.open_time)?;
            match buckets.last_mut() {
                Some((start, members)) if *start == bucket_start => members.push(candle),
                _ => buckets.push((bucket_start, vec![candle])),
            }
        }

        let mut aggregated = Vec::with_capacity(buckets.len());
        for (start, members) in buckets {
            aggregated.push(aggregate_bucket(symbol, start, &members)?);
        }
        aggregated.sort_by_key(|c| c.open_time);
        validate_series(&aggregated)?;
        Ok(aggregated)
    }
}

/// One Coinbase candle row: `[time, low, high, open, close, volume]`,
/// numeric, bucket start in epoch seconds.
fn parse_candle_row(symbol: &str, row: &serde_json::Value, granularity: i64) -> WatchResult<Candle> {
    let arr = row
        .as_array()
        .ok_or_else(|| WatchError::parse("coinbase candle row is not an array"))?;
    if arr.len() < 6 {
        return Err(WatchError::parse(format!(
            "coinbase candle row has {} fields, expected 6",
            arr.len()
        )));
    }

    let secs = arr[0]
        .as_i64()
        .ok_or_else(|| WatchError::parse("coinbase candle time is not an integer"))?;
    let open_time = Utc
        .timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| WatchError::parse(format!("coinbase candle time {} out of range", secs)))?;

    let num_field = |i: usize, name: &str| -> WatchResult<Decimal> {
        let v = arr[i]
            .as_f64()
            .ok_or_else(|| WatchError::parse(format!("coinbase candle {} is not a number", name)))?;
        Decimal::from_f64(v)
            .ok_or_else(|| WatchError::parse(format!("coinbase candle {} {} not representable", name, v)))
    };

    Ok(Candle {
        symbol: symbol.to_string(),
        open_time,
        close_time: open_time + Duration::seconds(granularity),
        low: num_field(1, "low")?,
        high: num_field(2, "high")?,
        open: num_field(3, "open")?,
        close: num_field(4, "close")?,
        volume: num_field(5, "volume")?,
    })
}

/// UTC start instant of the ISO week or calendar month containing `t`.
fn bucket_start(timeframe: Timeframe, t: DateTime<Utc>) -> WatchResult<DateTime<Utc>> {
    let date = t.date_naive();
    let start_date = match timeframe {
        Timeframe::OneWeek => {
            let iso = date.iso_week();
            NaiveDate::from_isoywd_opt(iso.year(), iso.week(), Weekday::Mon).ok_or_else(|| {
                WatchError::invalid_argument(format!("no ISO week start for {}", date))
            })?
        }
        Timeframe::OneMonth => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
            .ok_or_else(|| WatchError::invalid_argument(format!("no month start for {}", date)))?,
        _ => {
            return Err(WatchError::invalid_argument(format!(
                "timeframe {} has no aggregation bucket",
                timeframe
            )));
        }
    };
    Ok(Utc.from_utc_datetime(
        &start_date
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always a valid time"),
    ))
}

/// Collapses contiguous daily candles into one coarse candle: first
/// open, last close, extreme high/low, summed volume.
fn aggregate_bucket(
    symbol: &str,
    bucket_start: DateTime<Utc>,
    members: &[Candle],
) -> WatchResult<Candle> {
    let first = members
        .first()
        .ok_or_else(|| WatchError::invalid_argument("empty aggregation bucket"))?;
    let last = members.last().expect("non-empty bucket has a last member");

    let mut high = first.high;
    let mut low = first.low;
    let mut volume = Decimal::ZERO;
    for member in members {
        high = high.max(member.high);
        low = low.min(member.low);
        volume += member.volume;
    }

    Ok(Candle {
        symbol: symbol.to_string(),
        open_time: bucket_start,
        close_time: last.close_time,
        open: first.open,
        high,
        low,
        close: last.close,
        volume,
    })
}

#[async_trait]
impl DataSource for CoinbaseSource {
    fn name(&self) -> &str {
        "coinbase"
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

        let mut candles = match Self::granularity(timeframe) {
            Some(granularity) => {
                let end = end.unwrap_or_else(Utc::now);
                let start = start
                    .unwrap_or_else(|| end - Duration::seconds(granularity * (limit as i64 + 1)));
                self.fetch_native(symbol, granularity, start, end).await?
            }
            None => match timeframe {
                Timeframe::OneWeek | Timeframe::OneMonth => {
                    let end = end.unwrap_or_else(Utc::now);
                    self.fetch_aggregated(symbol, timeframe, end, limit).await?
                }
                _ => {
                    return Err(WatchError::invalid_argument(format!(
                        "coinbase: timeframe {} is not supported",
                        timeframe
                    )));
                }
            },
        };

        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        Ok(candles)
    }

    async fn is_symbol_valid(&self, symbol: &str) -> WatchResult<bool> {
        match self
            .get_klines(symbol, Timeframe::OneDay, None, None, 1)
            .await
        {
            Ok(candles) => Ok(!candles.is_empty()),
            Err(WatchError::NotFound(_)) | Err(WatchError::InvalidArgument(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[derive(Default)]
pub struct CoinbaseSourceBuilder {
    base_url: Option<String>,
    timeout: Option<std::time::Duration>,
    requests_per_minute: Option<u32>,
    retry: Option<RetryPolicy>,
    cancel: Option<CancellationToken>,
}

impl CoinbaseSourceBuilder {
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

    pub fn build(self) -> CoinbaseSource {
        CoinbaseSource {
            client: build_http_client(self.timeout),
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            gate: RateGate::new(self.requests_per_minute.unwrap_or(600)),
            retry: self.retry.unwrap_or_default(),
            cancel: self.cancel.unwrap_or_default(),
        }
    }
}
