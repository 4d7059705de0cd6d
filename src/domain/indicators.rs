//! Pure numerical kernels over ordered price sequences.
//!
//! All arithmetic is IEEE-754 double precision. Kernels are stateless
//! batch functions: given `n` prices they return the full output
//! series, trimmed so the last element corresponds to the most recent
//! price. Inputs that would produce NaN or infinity are rejected up
//! front; division hazards go through [`safe_div`].

use crate::domain::errors::{WatchError, WatchResult};

/// Quotient of `a / b`, or 0 when the divisor is zero, either operand
/// is not finite, or the quotient itself is not finite.
pub fn safe_div(a: f64, b: f64) -> f64 {
    if b == 0.0 || !a.is_finite() || !b.is_finite() {
        return 0.0;
    }
    let q = a / b;
    if q.is_finite() { q } else { 0.0 }
}

fn check_period(prices: &[f64], period: usize) -> WatchResult<()> {
    if period == 0 {
        return Err(WatchError::invalid_argument("period must be positive"));
    }
    if prices.len() < period {
        return Err(WatchError::invalid_argument(format!(
            "period {} exceeds series length {}",
            period,
            prices.len()
        )));
    }
    Ok(())
}

/// Simple moving average. Output length is `n - period + 1`.
pub fn sma(prices: &[f64], period: usize) -> WatchResult<Vec<f64>> {
    check_period(prices, period)?;

    let mut out = Vec::with_capacity(prices.len() - period + 1);
    let mut window_sum: f64 = prices[..period].iter().sum();
    out.push(window_sum / period as f64);
    for i in period..prices.len() {
        window_sum += prices[i] - prices[i - period];
        out.push(window_sum / period as f64);
    }
    Ok(out)
}

/// Exponential moving average seeded with the SMA of the first
/// `period` prices. Output length is `n - period + 1`.
pub fn ema(prices: &[f64], period: usize) -> WatchResult<Vec<f64>> {
    check_period(prices, period)?;

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(prices.len() - period + 1);
    let seed: f64 = prices[..period].iter().sum::<f64>() / period as f64;
    out.push(seed);
    let mut prev = seed;
    for &price in &prices[period..] {
        prev = alpha * price + (1.0 - alpha) * prev;
        out.push(prev);
    }
    Ok(out)
}

/// Linearly weighted moving average with weights `1..=period`.
/// Output length is `n - period + 1`.
pub fn wma(prices: &[f64], period: usize) -> WatchResult<Vec<f64>> {
    check_period(prices, period)?;

    let weight_sum = (period * (period + 1)) as f64 / 2.0;
    let mut out = Vec::with_capacity(prices.len() - period + 1);
    for window in prices.windows(period) {
        let weighted: f64 = window
            .iter()
            .enumerate()
            .map(|(i, &p)| p * (i + 1) as f64)
            .sum();
        out.push(weighted / weight_sum);
    }
    Ok(out)
}

/// Relative Strength Index with Wilder's smoothing.
///
/// The first value averages the first `period` gains and losses
/// simply; subsequent averages use
/// `avg = (prev_avg * (period - 1) + current) / period`. When the
/// average loss is zero the RSI is 100. Output length is `n - period`.
pub fn rsi(prices: &[f64], period: usize) -> WatchResult<Vec<f64>> {
    if period == 0 {
        return Err(WatchError::invalid_argument("period must be positive"));
    }
    if prices.len() <= period {
        return Err(WatchError::invalid_argument(format!(
            "RSI period {} needs more than {} prices",
            period,
            prices.len()
        )));
    }

    let diffs: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = diffs[..period]
        .iter()
        .map(|&d| if d > 0.0 { d } else { 0.0 })
        .sum::<f64>()
        / period as f64;
    let mut avg_loss = diffs[..period]
        .iter()
        .map(|&d| if d < 0.0 { -d } else { 0.0 })
        .sum::<f64>()
        / period as f64;

    let point = |gain: f64, loss: f64| -> f64 {
        if loss == 0.0 {
            return 100.0;
        }
        100.0 - 100.0 / (1.0 + gain / loss)
    };

    let mut out = Vec::with_capacity(prices.len() - period);
    out.push(point(avg_gain, avg_loss));

    for &diff in &diffs[period..] {
        let (gain, loss) = if diff > 0.0 { (diff, 0.0) } else { (0.0, -diff) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out.push(point(avg_gain, avg_loss));
    }
    Ok(out)
}

/// MACD line, signal line and histogram, trimmed to equal length
/// ending at the most recent price.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// Moving Average Convergence/Divergence.
///
/// The MACD line is `EMA(fast) - EMA(slow)` aligned on the slow-EMA
/// start, so every index refers to the same underlying price
/// position. The signal line is the EMA of the MACD line over
/// `signal_period`; the histogram their difference over the common
/// suffix.
pub fn macd(
    prices: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> WatchResult<MacdSeries> {
    if fast_period == 0 || slow_period == 0 || signal_period == 0 {
        return Err(WatchError::invalid_argument("MACD periods must be positive"));
    }
    if fast_period >= slow_period {
        return Err(WatchError::invalid_argument(format!(
            "MACD fast period {} must be below slow period {}",
            fast_period, slow_period
        )));
    }
    if prices.len() < slow_period {
        return Err(WatchError::invalid_argument(format!(
            "MACD slow period {} exceeds series length {}",
            slow_period,
            prices.len()
        )));
    }

    let fast = ema(prices, fast_period)?;
    let slow = ema(prices, slow_period)?;

    // fast is longer than slow; the last elements of both refer to the
    // most recent price, so align on the slow start.
    let offset = fast.len() - slow.len();
    let macd_line: Vec<f64> = slow
        .iter()
        .enumerate()
        .map(|(i, &s)| fast[i + offset] - s)
        .collect();

    let signal = ema(&macd_line, signal_period)?;
    let macd_tail = macd_line[macd_line.len() - signal.len()..].to_vec();
    let histogram: Vec<f64> = macd_tail
        .iter()
        .zip(signal.iter())
        .map(|(&m, &s)| m - s)
        .collect();

    Ok(MacdSeries {
        macd: macd_tail,
        signal,
        histogram,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < EPS, "{} != {}", a, e);
        }
    }

    #[test]
    fn sma_basic() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap();
        assert_close(&out, &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn sma_rejects_bad_period() {
        assert!(sma(&[1.0, 2.0], 0).is_err());
        assert!(sma(&[1.0, 2.0], 3).is_err());
    }

    #[test]
    fn ema_seeds_with_sma() {
        // alpha = 0.5 for period 3
        let out = ema(&[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap();
        assert_close(&out, &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn wma_linear_weights() {
        let out = wma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap();
        assert_close(&out, &[14.0 / 6.0, 20.0 / 6.0, 26.0 / 6.0]);
    }

    #[test]
    fn rsi_output_length_and_range() {
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let out = rsi(&prices, 14).unwrap();
        assert_eq!(out.len(), prices.len() - 14);
        for v in out {
            assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let out = rsi(&[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap();
        assert_close(&out, &[100.0, 100.0]);
    }

    #[test]
    fn rsi_wilder_smoothing() {
        // Alternating +1/-1 moves, period 2, hand-computed.
        let out = rsi(&[10.0, 11.0, 10.0, 11.0, 10.0, 11.0], 2).unwrap();
        assert_close(&out, &[50.0, 75.0, 37.5, 68.75]);
    }

    #[test]
    fn rsi_needs_more_than_period_prices() {
        assert!(rsi(&[1.0, 2.0, 3.0], 3).is_err());
    }

    #[test]
    fn macd_lengths_and_histogram_identity() {
        let prices: Vec<f64> = (0..80)
            .map(|i| 100.0 + (i as f64 * 0.2).sin() * 8.0 + i as f64 * 0.1)
            .collect();
        let series = macd(&prices, 12, 26, 9).unwrap();

        assert_eq!(series.macd.len(), series.signal.len());
        assert_eq!(series.macd.len(), series.histogram.len());
        for i in 0..series.macd.len() {
            assert!((series.histogram[i] - (series.macd[i] - series.signal[i])).abs() < EPS);
        }
    }

    #[test]
    fn macd_rejects_inverted_periods() {
        let prices: Vec<f64> = (0..80).map(|i| i as f64).collect();
        assert!(macd(&prices, 26, 12, 9).is_err());
        assert!(macd(&prices, 12, 12, 9).is_err());
        assert!(macd(&prices, 0, 12, 9).is_err());
    }

    #[test]
    fn macd_alignment_refers_to_same_price() {
        // With monotone prices the MACD line of the aligned series must
        // be fast-above-slow everywhere (fast EMA tracks a rise closer).
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let series = macd(&prices, 5, 10, 3).unwrap();
        assert!(series.macd.iter().all(|&m| m > 0.0));
    }

    #[test]
    fn safe_div_sentinels() {
        assert_eq!(safe_div(1.0, 0.0), 0.0);
        assert_eq!(safe_div(f64::INFINITY, 2.0), 0.0);
        assert_eq!(safe_div(1.0, f64::NAN), 0.0);
        assert_eq!(safe_div(6.0, 3.0), 2.0);
        assert_eq!(safe_div(f64::MAX, 0.5), 0.0);
    }
}
