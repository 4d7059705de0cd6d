use thiserror::Error;

/// Failure taxonomy shared by every layer of the engine.
///
/// Adapters normalize transport-level failures into these variants;
/// the rate calculator and strategies propagate them unchanged; the
/// watcher catches them per cell and keeps going.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("insufficient data: need {need} candles, have {have}")]
    InsufficientData { need: usize, have: usize },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl WatchError {
    /// Only transient failures are ever retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WatchError::Transient(_))
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        WatchError::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        WatchError::NotFound(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        WatchError::Transient(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        WatchError::Parse(msg.into())
    }
}

pub type WatchResult<T> = Result<T, WatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(WatchError::transient("timeout").is_retryable());
        assert!(!WatchError::not_found("BTCUSDT").is_retryable());
        assert!(!WatchError::invalid_argument("period").is_retryable());
        assert!(!WatchError::InsufficientData { need: 30, have: 7 }.is_retryable());
        assert!(!WatchError::parse("bad json").is_retryable());
        assert!(!WatchError::Cancelled.is_retryable());
    }

    #[test]
    fn insufficient_data_formatting() {
        let err = WatchError::InsufficientData { need: 30, have: 12 };
        let msg = err.to_string();
        assert!(msg.contains("30"));
        assert!(msg.contains("12"));
    }
}
