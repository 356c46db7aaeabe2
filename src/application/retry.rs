//! Bounded retry of remote operations.
//!
//! Only transient failures (rate limiting, upstream 5xx) are retried;
//! permanent errors surface immediately. The backoff wait happens inline in
//! the caller's execution path.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{info, warn};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(200);
const MAX_DELAY: Duration = Duration::from_secs(5);
const JITTER_FRACTION: f64 = 0.3;

/// Implemented by error types whose failures can be classified as
/// retry-worthy (HTTP 429 and 5xx) versus permanent.
pub trait TransientError {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: BASE_DELAY,
            max_delay: MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Minimal delays for unit tests.
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    /// Exponential backoff with ±30% jitter, capped at `max_delay`.
    /// `attempt` is zero-based: the wait after the first failure uses 2^0.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let capped = exp.min(self.max_delay);
        let jitter = rand::rng().random_range(1.0 - JITTER_FRACTION..=1.0 + JITTER_FRACTION);
        capped.mul_f64(jitter).min(self.max_delay)
    }
}

/// Run `operation` up to `policy.max_attempts` times, sleeping between
/// transient failures. Returns the first success, the first non-transient
/// error, or the last transient error once attempts are exhausted.
pub async fn retry_transient<F, Fut, T, E>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: TransientError + std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(
                        target = "vodsync::retry",
                        operation = operation_name,
                        retries = attempt,
                        "operation succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt + 1 < max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    target = "vodsync::retry",
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, backing off"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if !err.is_transient() {
                    warn!(
                        target = "vodsync::retry",
                        operation = operation_name,
                        error = %err,
                        "permanent failure, not retrying"
                    );
                }
                return Err(err);
            }
        }
    }
}
