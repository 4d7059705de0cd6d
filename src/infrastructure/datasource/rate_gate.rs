use crate::domain::errors::{WatchError, WatchResult};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Per-adapter request pacing gate.
///
/// A bounded token reservoir sized in requests-per-minute. The
/// reservoir refills to capacity at each UTC minute boundary; callers
/// blocked on an empty reservoir sleep until that boundary or until
/// their cancellation scope fires.
pub struct RateGate {
    capacity: u32,
    state: Mutex<GateState>,
}

struct GateState {
    available: u32,
    /// Unix minute the current reservoir belongs to.
    window: i64,
}

impl RateGate {
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute.max(1);
        Self {
            capacity,
            state: Mutex::new(GateState {
                available: capacity,
                window: current_minute(),
            }),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Takes one token, waiting across minute boundaries if the
    /// reservoir is empty. Returns `Cancelled` as soon as the caller's
    /// scope is cancelled, including before the first attempt.
    pub async fn acquire(&self, cancel: &CancellationToken) -> WatchResult<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(WatchError::Cancelled);
            }

            {
                let mut state = self.state.lock().await;
                let minute = current_minute();
                if minute != state.window {
                    state.window = minute;
                    state.available = self.capacity;
                }
                if state.available > 0 {
                    state.available -= 1;
                    return Ok(());
                }
            }

            let wait = until_next_minute();
            tokio::select! {
                _ = cancel.cancelled() => return Err(WatchError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Tokens left in the current window, for tests and diagnostics.
    pub async fn available(&self) -> u32 {
        let state = self.state.lock().await;
        if current_minute() != state.window {
            self.capacity
        } else {
            state.available
        }
    }
}

fn current_minute() -> i64 {
    Utc::now().timestamp() / 60
}

fn until_next_minute() -> Duration {
    let now_ms = Utc::now().timestamp_millis();
    let next_ms = (now_ms / 60_000 + 1) * 60_000;
    // Small cushion so we wake on the far side of the boundary.
    Duration::from_millis((next_ms - now_ms) as u64 + 5)
}
