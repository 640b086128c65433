//! Exponential backoff and interval jitter.

use std::time::Duration;
use rand::Rng;

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Spread a fixed polling interval by up to `ratio` in either direction.
///
/// Instances sharing one store poll at slightly different moments.
pub fn jittered_interval(interval: Duration, ratio: f64) -> Duration {
    let ratio = ratio.clamp(0.0, 1.0);
    let spread_ms = (interval.as_millis() as f64 * ratio) as i64;
    if spread_ms == 0 {
        return interval;
    }
    let offset = rand::thread_rng().gen_range(-spread_ms..=spread_ms);
    let millis = (interval.as_millis() as i64 + offset).max(1);
    Duration::from_millis(millis as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let b1 = calculate_backoff(1, 100, 2000);
        assert!(b1.as_millis() >= 100);

        let b2 = calculate_backoff(2, 100, 2000);
        assert!(b2.as_millis() >= 200);

        let max = calculate_backoff(10, 100, 1000);
        assert!(max.as_millis() >= 1000);
        assert!(max.as_millis() < 1100);
    }

    #[test]
    fn test_jitter_stays_within_ratio() {
        let base = Duration::from_secs(10);
        for _ in 0..100 {
            let d = jittered_interval(base, 0.1);
            assert!(d >= Duration::from_secs(9) && d <= Duration::from_secs(11), "{:?}", d);
        }
        assert_eq!(jittered_interval(base, 0.0), base);
    }
}
