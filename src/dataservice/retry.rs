//! Exponential-backoff retry, grounded in the same shape used elsewhere in
//! the ecosystem for connector resilience: a fixed attempt budget, a
//! doubling delay capped at a ceiling, and a classifier deciding which
//! failures are worth retrying at all.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

/// Retry policy: exponential backoff starting at `initial_backoff_ms`,
/// doubling each attempt, capped at `max_backoff_ms`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.initial_backoff_ms.saturating_mul(1u64 << attempt.min(16));
        let capped = exp.min(self.max_backoff_ms);
        let jitter = rand::thread_rng().gen_range(0..=capped / 4 + 1);
        Duration::from_millis(capped.saturating_sub(capped / 8) + jitter)
    }

    /// Run `f`, retrying while `is_retryable` returns true, up to
    /// `max_retries` additional attempts (`max_retries + 1` total calls).
    pub async fn execute<F, Fut, T, E>(&self, mut f: F, is_retryable: impl Fn(&E) -> bool) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0u32;
        loop {
            match f().await {
                Ok(v) => {
                    if attempt > 0 {
                        debug!(attempt, "data service call succeeded after retry");
                    }
                    return Ok(v);
                }
                Err(err) => {
                    if attempt >= self.max_retries || !is_retryable(&err) {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying data service call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// HTTP status retry classification: 5xx and 408/429 are transient.
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_up_to_budget_then_fails() {
        let policy = RetryPolicy { max_retries: 2, initial_backoff_ms: 1, max_backoff_ms: 2 };
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = policy
            .execute(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("boom")
                },
                |_| true,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_immediately_on_non_retryable_error() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = policy
            .execute(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("permanent")
                },
                |_| false,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retryable_status_matches_spec() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(502));
        assert!(is_retryable_status(408));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(400));
    }
}
