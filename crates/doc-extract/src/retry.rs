//! Bounded exponential backoff for calls to external services
//!
//! Only errors accepted by the policy's predicate are retried (rate limiting
//! by default). The delay before retry `n` is `base_delay * 2^(n-1)`.

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// Backoff policy shared by every service client of a run
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    retry_if: fn(&Error) -> bool,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            retry_if: Error::is_rate_limited,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, Duration::from_millis(config.base_delay_ms))
    }

    /// Replace the retryability predicate
    pub fn retry_if(mut self, predicate: fn(&Error) -> bool) -> Self {
        self.retry_if = predicate;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the given retry (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent
    ///
    /// A rate-limit signal still present after the last retry surfaces as
    /// [`Error::RateLimitExceeded`].
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if (self.retry_if)(&err) => {
                    if retry >= self.max_retries {
                        tracing::warn!(
                            "{} gave up after {} retries: {}",
                            operation,
                            self.max_retries,
                            err
                        );
                        return Err(match err {
                            Error::RateLimited { service } => Error::RateLimitExceeded {
                                service,
                                retries: self.max_retries,
                            },
                            other => other,
                        });
                    }
                    retry += 1;
                    let delay = self.delay_for(retry);
                    tracing::warn!(
                        "{}: {}; retry {}/{} in {:?}",
                        operation,
                        err,
                        retry,
                        self.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn rate_limited() -> Error {
        Error::RateLimited {
            service: "landing".to_string(),
        }
    }

    #[test]
    fn test_delays_double() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_rate_limit_exhausts_budget() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2));
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<()> = policy
            .run("extract", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(14));
        assert!(matches!(
            result,
            Err(Error::RateLimitExceeded { retries: 3, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_rate_limit() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2));
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = policy
            .run("extract", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(rate_limited())
                    } else {
                        Ok("record")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "record");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_last_retry() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2));
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = policy
            .run("extract", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(rate_limited())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2));
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run("extract", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(Error::ServiceStatus {
                        service: "landing".to_string(),
                        status: 500,
                        body: "boom".to_string(),
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(Error::ServiceStatus { status: 500, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_reports_exceeded() {
        let policy = RetryPolicy::new(0, Duration::from_secs(2));
        let result: Result<()> = policy.run("extract", || async { Err(rate_limited()) }).await;
        assert!(matches!(
            result,
            Err(Error::RateLimitExceeded { retries: 0, .. })
        ));
    }
}
