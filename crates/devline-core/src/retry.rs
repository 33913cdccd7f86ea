//! Retry with exponential backoff and jitter for API calls

use std::ops::Range;
use std::time::Duration;

use rand::Rng;

use crate::error::FetchError;

/// Exponential backoff: 2^attempt seconds (1s, 2s, 4s, ...)
pub const fn backoff_duration(attempt: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt))
}

/// 2^attempt seconds plus a uniform random jitter drawn from `jitter` (seconds).
pub fn jittered_backoff(attempt: u32, jitter: Range<f64>) -> Duration {
    let extra = if jitter.start < jitter.end {
        rand::thread_rng().gen_range(jitter)
    } else {
        jitter.start.max(0.0)
    };
    backoff_duration(attempt) + Duration::from_secs_f64(extra)
}

/// Retry a fallible API call with jittered exponential backoff.
///
/// Makes at most `max_attempts` calls. Before each retry, `before_retry` gets
/// the error that caused it (the client uses this to refresh or drop its
/// token). Non-retryable errors return immediately.
pub fn retry_with_backoff<T>(
    label: &str,
    max_attempts: u32,
    mut before_retry: impl FnMut(&FetchError),
    mut attempt_fn: impl FnMut() -> Result<T, FetchError>,
) -> Result<T, FetchError> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if attempt + 1 < max_attempts && e.is_retryable() => {
                let delay = e.retry_delay(attempt);
                attempt += 1;
                log::warn!(
                    "{label}: {e}, retry {attempt}/{} in {:.1}s",
                    max_attempts - 1,
                    delay.as_secs_f64()
                );
                crate::pacing::sleep_interruptible(delay);
                if crate::shutdown::is_shutdown_requested() {
                    return Err(e);
                }
                before_retry(&e);
            }
            Err(e) => {
                if e.is_retryable() {
                    log::error!("{label}: giving up after {max_attempts} attempts: {e}");
                } else {
                    log::debug!("{label}: {e}");
                }
                return Err(e);
            }
        }
    }
}
