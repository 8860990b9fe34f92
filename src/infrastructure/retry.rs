//! Retry policy with exponential backoff for outbound provider calls.
//!
//! Attempts are numbered from 1. After a failed attempt the policy sleeps
//! for the current delay (or the server's retry-after hint, whichever is
//! larger), multiplies the delay by the backoff factor, and tries again,
//! up to `max_attempts`. A `ProviderError::NonRetryable` short-circuits
//! immediately regardless of the classifier in use.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::models::RetryConfig;
use crate::domain::ports::ProviderError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, numbered from 1
    max_attempts: u32,
    /// Delay before the second attempt
    initial_delay: Duration,
    /// Factor applied to the delay after each failed attempt
    backoff_multiplier: f64,
    /// Upper bound on any single inter-attempt delay
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), 2.0, Duration::from_secs(60))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_delay_ms),
            config.backoff_multiplier,
            Duration::from_millis(config.max_delay_ms),
        )
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        backoff_multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        assert!(max_attempts > 0, "max_attempts must be at least 1");
        assert!(backoff_multiplier >= 1.0, "backoff_multiplier must be >= 1.0");
        Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
            max_delay,
        }
    }

    /// Execute with the default classification: everything except the
    /// explicit `NonRetryable` kind is worth retrying.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.execute_with(operation, |_| true).await
    }

    /// Execute with a caller-supplied retryability predicate. The predicate
    /// is consulted for every error except `NonRetryable`, which always
    /// propagates immediately.
    pub async fn execute_with<F, Fut, T, C>(
        &self,
        mut operation: F,
        is_retryable: C,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
        C: Fn(&ProviderError) -> bool,
    {
        let mut delay = self.initial_delay;

        for attempt in 1..=self.max_attempts {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(err) => {
                    let non_retryable = matches!(err, ProviderError::NonRetryable(_));
                    if attempt == self.max_attempts || non_retryable || !is_retryable(&err) {
                        if attempt == self.max_attempts && !non_retryable {
                            warn!(attempt, error = %err, "retry budget exhausted");
                        } else {
                            debug!(error = %err, "not retrying terminal error");
                        }
                        return Err(err);
                    }

                    let wait = match err.retry_after() {
                        Some(hint) => delay.max(hint),
                        None => delay,
                    };
                    warn!(
                        attempt,
                        error = %err,
                        wait_ms = wait.as_millis() as u64,
                        "transient failure, backing off"
                    );
                    sleep(wait).await;
                    delay = delay.mul_f64(self.backoff_multiplier).min(self.max_delay);
                }
            }
        }

        unreachable!("loop returns on the final attempt")
    }
}
