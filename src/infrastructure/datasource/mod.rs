pub mod binance;
pub mod coinbase;
pub mod rate_gate;

use crate::domain::errors::{WatchError, WatchResult};
use crate::domain::market::{Candle, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rate_gate::RateGate;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use binance::BinanceSource;
pub use coinbase::CoinbaseSource;

/// Exchange-agnostic candle feed.
///
/// Implementations normalize exchange payloads into [`Candle`]s that
/// satisfy the candle invariants, sorted ascending by open time, and
/// classify failures into the shared error taxonomy.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Stable adapter identifier ("binance", "coinbase").
    fn name(&self) -> &str;

    /// Fetches up to `limit` candles. `start` and `end` of `None`
    /// mean "the most recent `limit` candles".
    async fn get_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> WatchResult<Vec<Candle>>;

    /// True iff the adapter can retrieve at least one daily candle
    /// for the symbol.
    async fn is_symbol_valid(&self, symbol: &str) -> WatchResult<bool>;
}

/// Fixed-delay retry budget for one adapter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Runs `attempt` behind the pacing gate, retrying transient failures
/// up to the policy budget with fixed spacing. Every attempt charges
/// one pacing token. Cancellation aborts token waits, retry sleeps,
/// and is surfaced as `Cancelled` without being wrapped.
pub(crate) async fn request_with_retry<T, F, Fut>(
    gate: &RateGate,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut attempt: F,
) -> WatchResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = WatchResult<T>>,
{
    let mut tries = 0;
    loop {
        gate.acquire(cancel).await?;

        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && tries < policy.max_retries => {
                tries += 1;
                tracing::debug!(
                    attempt = tries,
                    max = policy.max_retries,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(WatchError::Cancelled),
                    _ = tokio::time::sleep(policy.retry_delay) => {}
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// Maps an HTTP response status to the error taxonomy. 429 and any
/// 5xx are transient; other client errors are permanent.
pub(crate) fn classify_status(status: reqwest::StatusCode, context: &str) -> WatchError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        WatchError::transient(format!("{}: HTTP {}", context, status))
    } else {
        WatchError::invalid_argument(format!("{}: HTTP {}", context, status))
    }
}

/// Maps a transport-level reqwest failure (timeout, connection reset,
/// DNS) to the taxonomy. Body decoding failures are parse errors.
pub(crate) fn classify_transport(err: reqwest::Error, context: &str) -> WatchError {
    if err.is_decode() || err.is_body() {
        WatchError::parse(format!("{}: {}", context, err))
    } else {
        WatchError::transient(format!("{}: {}", context, err))
    }
}

/// Shared reqwest client construction: JSON APIs, 30 s request
/// timeout unless overridden, 10 s connect timeout.
pub(crate) fn build_http_client(timeout: Option<Duration>) -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(5)
        .timeout(timeout.unwrap_or(Duration::from_secs(30)))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let gate = RateGate::new(60);
        let policy = RetryPolicy {
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
        };
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let calls_in = calls.clone();
        let result = request_with_retry(&gate, &policy, &cancel, move || {
            let calls = calls_in.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(WatchError::transient("connection reset"))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // One pacing token per attempt.
        assert_eq!(gate.available().await, 60 - 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let gate = RateGate::new(60);
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let calls_in = calls.clone();
        let result: WatchResult<u32> = request_with_retry(&gate, &policy, &cancel, move || {
            let calls = calls_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(WatchError::not_found("no such symbol"))
            }
        })
        .await;

        assert!(matches!(result, Err(WatchError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_exhaust_into_the_last_error() {
        let gate = RateGate::new(60);
        let policy = RetryPolicy {
            max_retries: 2,
            retry_delay: Duration::from_millis(1),
        };
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let calls_in = calls.clone();
        let result: WatchResult<u32> = request_with_retry(&gate, &policy, &cancel, move || {
            let calls = calls_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(WatchError::transient("HTTP 503"))
            }
        })
        .await;

        assert!(matches!(result, Err(WatchError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancellation_aborts_before_first_attempt() {
        let gate = RateGate::new(60);
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: WatchResult<u32> =
            request_with_retry(&gate, &policy, &cancel, || async { Ok(1u32) }).await;
        assert!(matches!(result, Err(WatchError::Cancelled)));
    }

    #[test]
    fn status_classification() {
        let transient = classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "klines");
        assert!(transient.is_retryable());
        let transient = classify_status(reqwest::StatusCode::BAD_GATEWAY, "klines");
        assert!(transient.is_retryable());
        let permanent = classify_status(reqwest::StatusCode::BAD_REQUEST, "klines");
        assert!(!permanent.is_retryable());
    }
}
