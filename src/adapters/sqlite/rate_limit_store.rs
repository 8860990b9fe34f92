//! SQLite implementation of the shared rate-limit window.
//!
//! Slots are rows in `rate_limit_slots`. One admission attempt prunes rows
//! that have left the window, counts the remainder, and either appends a
//! slot or reports how long until the oldest row ages out, all inside a
//! single transaction. Concurrent acquirers across processes serialize on
//! the database write lock and never overshoot the limit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{RateLimitStore, SlotDecision};

#[derive(Clone)]
pub struct SqliteRateLimitStore {
    pool: SqlitePool,
}

impl SqliteRateLimitStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitStore for SqliteRateLimitStore {
    async fn try_acquire(
        &self,
        scope: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> DomainResult<SlotDecision> {
        let now_ms = now.timestamp_millis();
        let window_ms = i64::try_from(window.as_millis())
            .map_err(|_| DomainError::ValidationFailed("window too large".into()))?;
        let floor_ms = now_ms - window_ms;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM rate_limit_slots WHERE scope = ? AND started_at_ms <= ?")
            .bind(scope)
            .bind(floor_ms)
            .execute(&mut *tx)
            .await?;

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM rate_limit_slots WHERE scope = ?")
                .bind(scope)
                .fetch_one(&mut *tx)
                .await?;

        if count < i64::from(limit) {
            sqlx::query("INSERT INTO rate_limit_slots (scope, started_at_ms) VALUES (?, ?)")
                .bind(scope)
                .bind(now_ms)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(SlotDecision::Acquired);
        }

        // At capacity: the next slot opens when the oldest entry ages out.
        let (oldest_ms,): (i64,) = sqlx::query_as(
            "SELECT MIN(started_at_ms) FROM rate_limit_slots WHERE scope = ?",
        )
        .bind(scope)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        let reopens_in_ms = (oldest_ms + window_ms - now_ms).max(0);
        #[allow(clippy::cast_sign_loss)]
        let retry_in = Duration::from_millis(reopens_in_ms as u64);
        Ok(SlotDecision::Busy { retry_in })
    }

    async fn window_len(
        &self,
        scope: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> DomainResult<u32> {
        let window_ms = i64::try_from(window.as_millis())
            .map_err(|_| DomainError::ValidationFailed("window too large".into()))?;
        let floor_ms = now.timestamp_millis() - window_ms;

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM rate_limit_slots WHERE scope = ? AND started_at_ms > ?",
        )
        .bind(scope)
        .bind(floor_ms)
        .fetch_one(&self.pool)
        .await?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}
