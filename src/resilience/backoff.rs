//! Exponential backoff with jitter.

use std::time::Duration;
use rand::Rng;

/// Lower bound (inclusive) of the jitter factor.
pub const JITTER_MIN: f64 = 0.5;
/// Upper bound (exclusive) of the jitter factor.
pub const JITTER_MAX: f64 = 1.0;

/// Un-jittered delay for the given retry index, capped at `max`.
pub fn exponential_delay(attempt: u32, base: Duration, multiplier: f64, max: Duration) -> Duration {
    scaled_delay(attempt, base, multiplier, max, 1.0)
}

/// Delay for the given retry index with an explicit jitter factor.
///
/// `min(base × multiplier^attempt × jitter, max)`, saturating on overflow.
pub fn scaled_delay(
    attempt: u32,
    base: Duration,
    multiplier: f64,
    max: Duration,
    jitter: f64,
) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let secs = base.as_secs_f64() * multiplier.powi(exponent) * jitter;
    let max_secs = max.as_secs_f64();

    if !secs.is_finite() || secs >= max_secs {
        return max;
    }
    Duration::from_secs_f64(secs.max(0.0))
}

/// Draw a jitter factor uniformly from `[0.5, 1.0)`.
pub fn draw_jitter() -> f64 {
    rand::thread_rng().gen_range(JITTER_MIN..JITTER_MAX)
}

/// Calculate a jittered exponential backoff delay.
pub fn calculate_backoff(attempt: u32, base: Duration, multiplier: f64, max: Duration) -> Duration {
    scaled_delay(attempt, base, multiplier, max, draw_jitter())
}
