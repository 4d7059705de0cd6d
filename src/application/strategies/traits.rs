use crate::domain::errors::{WatchError, WatchResult};
use crate::domain::market::{MarketData, Timeframe};
use crate::domain::signal::StrategyResult;

/// Contract every evaluation strategy implements.
///
/// Strategies are pure with respect to their input: evaluating the
/// same [`MarketData`] twice yields identical results. All failure
/// modes surface through the error taxonomy, never panics.
pub trait Strategy: Send + Sync {
    /// Stable identifier, unique within a composite.
    fn name(&self) -> &str;

    fn description(&self) -> String;

    /// Minimum candle count below which `evaluate` fails with
    /// `InsufficientData`.
    fn required_data_points(&self) -> usize;

    fn supported_timeframes(&self) -> Vec<Timeframe>;

    fn evaluate(&self, data: &MarketData) -> WatchResult<StrategyResult>;
}

/// Shared precondition check for strategy implementations.
pub(crate) fn ensure_data_points(data: &MarketData, need: usize) -> WatchResult<()> {
    if data.len() < need {
        return Err(WatchError::InsufficientData {
            need,
            have: data.len(),
        });
    }
    Ok(())
}
