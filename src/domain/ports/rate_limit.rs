//! Rate-limit store port.
//!
//! The distributed limiter consults a shared transactional store so that
//! admission is bounded across independent processes, not just within one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::domain::errors::DomainResult;

/// Outcome of one transactional admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotDecision {
    /// A slot was appended to the window and committed.
    Acquired,
    /// The window is at capacity; retry after roughly `retry_in`.
    Busy { retry_in: Duration },
}

/// Transactional sliding-window storage.
///
/// One attempt prunes entries older than the window, counts the remainder,
/// and either appends-and-commits or reports how long until the oldest
/// entry leaves the window. The whole attempt is a single transaction.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn try_acquire(
        &self,
        scope: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> DomainResult<SlotDecision>;

    /// Number of entries currently inside the window, for observability and
    /// tests.
    async fn window_len(
        &self,
        scope: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> DomainResult<u32>;
}
