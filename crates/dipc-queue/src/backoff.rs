//! Exponential backoff with jitter for redelivery scheduling.
//!
//! Base 60s, factor 2, jitter ±25%, cap 600s.

use rand::Rng;
use std::time::Duration;

pub const BASE_SECS: f64 = 60.0;
pub const FACTOR: f64 = 2.0;
pub const CAP_SECS: f64 = 600.0;
pub const JITTER_FRACTION: f64 = 0.25;

/// `attempt` is 1 for the first retry, 2 for the second, etc.
pub fn compute_backoff(attempt: u32) -> Duration {
    compute_backoff_with_rng(attempt, &mut rand::rng())
}

fn compute_backoff_with_rng(attempt: u32, rng: &mut impl Rng) -> Duration {
    let attempt = attempt.max(1);
    let raw = BASE_SECS * FACTOR.powi(attempt as i32 - 1);
    let capped = raw.min(CAP_SECS);
    let jitter_span = capped * JITTER_FRACTION;
    let jitter = rng.random_range(-jitter_span..=jitter_span);
    let secs = (capped + jitter).max(0.0);
    Duration::from_secs_f64(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_is_about_base() {
        let d = compute_backoff(1);
        assert!(d.as_secs_f64() >= BASE_SECS * 0.75 && d.as_secs_f64() <= BASE_SECS * 1.25);
    }

    #[test]
    fn grows_exponentially_until_cap() {
        let d2 = compute_backoff(2);
        assert!(d2.as_secs_f64() >= 120.0 * 0.75 && d2.as_secs_f64() <= 120.0 * 1.25);
        let d3 = compute_backoff(3);
        assert!(d3.as_secs_f64() >= 240.0 * 0.75 && d3.as_secs_f64() <= 240.0 * 1.25);
    }

    #[test]
    fn capped_at_600_even_for_large_attempts() {
        for attempt in 5..20 {
            let d = compute_backoff(attempt);
            assert!(d.as_secs_f64() <= CAP_SECS * 1.25);
        }
    }

    #[test]
    fn never_negative() {
        for attempt in 1..10 {
            let d = compute_backoff(attempt);
            assert!(d.as_secs_f64() >= 0.0);
        }
    }
}
