//! Exponential backoff with optional jitter.

use std::time::Duration;
use rand::Rng;

/// Delay before the retry with the given index (1 = first retry).
///
/// `min(initial × multiplier^(retry - 1), max)`. Computed in nanoseconds so
/// integral multipliers give exact millisecond delays.
pub fn calculate_backoff(retry: u32, initial: Duration, max: Duration, multiplier: f64) -> Duration {
    if retry == 0 {
        return Duration::ZERO;
    }

    let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
    let scaled = initial.as_nanos() as f64 * multiplier.powi(exponent);
    let capped = scaled.min(max.as_nanos() as f64);

    Duration::from_nanos(capped as u64)
}

/// Add 0 to 10% of the delay on top of it.
pub fn apply_jitter(delay: Duration) -> Duration {
    let jitter_range = delay.as_millis() as u64 / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    delay + Duration::from_millis(jitter)
}
