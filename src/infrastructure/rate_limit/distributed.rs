//! Distributed sliding-window admission control.
//!
//! The authoritative window lives in the shared store (see
//! [`crate::adapters::sqlite::SqliteRateLimitStore`]); this wrapper adds
//! the wait-and-retry loop around it. Each attempt is one store
//! transaction, so concurrent acquirers in independent processes can never
//! start more than `limit` calls within a trailing window.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::RateLimitConfig;
use crate::domain::ports::{RateLimitStore, SlotDecision};

/// The rolling admission window.
pub const WINDOW: Duration = Duration::from_secs(60);

pub struct DistributedRateLimiter {
    store: Arc<dyn RateLimitStore>,
    scope: String,
    window: Duration,
    min_wait: Duration,
    max_attempts: u32,
}

impl DistributedRateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, scope: impl Into<String>) -> Self {
        Self {
            store,
            scope: scope.into(),
            window: WINDOW,
            min_wait: Duration::from_millis(500),
            max_attempts: 30,
        }
    }

    pub fn from_config(
        store: Arc<dyn RateLimitStore>,
        scope: impl Into<String>,
        config: &RateLimitConfig,
    ) -> Self {
        Self {
            store,
            scope: scope.into(),
            window: WINDOW,
            min_wait: Duration::from_millis(config.min_wait_ms),
            max_attempts: config.max_admission_attempts,
        }
    }

    /// Shrink the window; tests only.
    #[doc(hidden)]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_min_wait(mut self, min_wait: Duration) -> Self {
        self.min_wait = min_wait;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Block until a slot inside the rolling window is acquired, or fail
    /// once the attempt budget is spent.
    pub async fn acquire_slot(&self, limit_per_minute: u32) -> DomainResult<()> {
        for attempt in 1..=self.max_attempts {
            let decision = self
                .store
                .try_acquire(&self.scope, limit_per_minute, self.window, Utc::now())
                .await?;

            match decision {
                SlotDecision::Acquired => {
                    debug!(scope = %self.scope, attempt, "admission slot acquired");
                    return Ok(());
                }
                SlotDecision::Busy { retry_in } => {
                    let wait = retry_in.max(self.min_wait);
                    warn!(
                        scope = %self.scope,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "admission window at capacity, waiting"
                    );
                    sleep(wait).await;
                }
            }
        }

        Err(DomainError::RateLimiterExhausted {
            scope: self.scope.clone(),
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Store stub that reports busy a fixed number of times, then admits.
    struct FlakyStore {
        busy_times: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl RateLimitStore for FlakyStore {
        async fn try_acquire(
            &self,
            _scope: &str,
            _limit: u32,
            _window: Duration,
            _now: DateTime<Utc>,
        ) -> DomainResult<SlotDecision> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.busy_times {
                Ok(SlotDecision::Busy { retry_in: Duration::from_millis(5) })
            } else {
                Ok(SlotDecision::Acquired)
            }
        }

        async fn window_len(
            &self,
            _scope: &str,
            _window: Duration,
            _now: DateTime<Utc>,
        ) -> DomainResult<u32> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_waits_through_busy_then_acquires() {
        let store = Arc::new(FlakyStore { busy_times: 2, calls: AtomicU32::new(0) });
        let limiter = DistributedRateLimiter::new(store.clone(), "test")
            .with_min_wait(Duration::from_millis(1));

        limiter.acquire_slot(5).await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_fatal_not_infinite() {
        let store = Arc::new(FlakyStore { busy_times: u32::MAX, calls: AtomicU32::new(0) });
        let limiter = DistributedRateLimiter::new(store, "test")
            .with_min_wait(Duration::from_millis(1))
            .with_max_attempts(4);

        let err = limiter.acquire_slot(5).await.unwrap_err();
        assert!(matches!(err, DomainError::RateLimiterExhausted { attempts: 4, .. }));
    }
}
