//! SQLite implementation of the ResearchRepository.
//!
//! Every mutation is an optimistic read-modify-write: the current row is
//! read, the next state is computed in memory, and a single UPDATE guarded
//! by the previously read `updated_at` commits it. A guard miss means a
//! concurrent writer got there first; the operation re-reads and retries,
//! so a concurrent change to a different field is never dropped. This is
//! the same claim-with-`rows_affected`-check discipline the rest of the
//! storage layer uses, bounded to a handful of attempts.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    validate_title, ProviderKind, ProviderOutcome, ProviderRunStatus, ProviderState, Research,
    ResearchPatch, ResearchStatus,
};
use crate::domain::ports::{ResearchPage, ResearchRepository, RunAdmission, RunSettlement};

/// Upper bound on page size; larger requests are clamped.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Attempts before an optimistic write gives up under contention.
const MAX_WRITE_ATTEMPTS: u32 = 8;

#[derive(Clone)]
pub struct SqliteResearchRepository {
    pool: SqlitePool,
}

impl SqliteResearchRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: Uuid) -> DomainResult<Option<Research>> {
        let row: Option<ResearchRow> = sqlx::query_as("SELECT * FROM research WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Research::try_from).transpose()
    }

    async fn fetch_required(&self, id: Uuid, owner: Option<&str>) -> DomainResult<Research> {
        let research = self.fetch(id).await?.ok_or(DomainError::ResearchNotFound(id))?;
        check_owner(&research, owner)?;
        Ok(research)
    }

    /// Commit `next` if the stored row still carries `prev_updated_at`.
    /// Returns false on a guard miss (concurrent writer won).
    async fn commit_guarded(
        &self,
        next: &Research,
        prev_updated_at: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let primary_json = serde_json::to_string(&next.primary)?;
        let secondary_json = serde_json::to_string(&next.secondary)?;
        let report_json = serde_json::to_string(&next.report)?;

        let result = sqlx::query(
            r#"UPDATE research SET title = ?, status = ?, primary_state = ?,
               secondary_state = ?, report = ?, updated_at = ?
               WHERE id = ? AND updated_at = ?"#,
        )
        .bind(&next.title)
        .bind(next.status.as_str())
        .bind(&primary_json)
        .bind(&secondary_json)
        .bind(&report_json)
        .bind(fmt_ts(next.updated_at))
        .bind(next.id.to_string())
        .bind(fmt_ts(prev_updated_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Read-modify-write loop shared by every mutation. `mutate` receives
    /// the current record and either returns the next state to commit or
    /// a short-circuit value when no write is needed.
    async fn read_modify_write<T, F>(&self, id: Uuid, owner: Option<&str>, mutate: F) -> DomainResult<T>
    where
        F: Fn(Research) -> DomainResult<Mutation<T>> + Send + Sync,
        T: Send,
    {
        for attempt in 0..MAX_WRITE_ATTEMPTS {
            let research = self.fetch_required(id, owner).await?;
            let prev_updated_at = research.updated_at;

            match mutate(research)? {
                Mutation::Done(value) => return Ok(value),
                Mutation::Write { mut next, finish } => {
                    next.updated_at = next_updated_at(prev_updated_at);
                    if self.commit_guarded(&next, prev_updated_at).await? {
                        return Ok(finish(next));
                    }
                }
            }

            // Lost the race; back off briefly and re-read.
            tokio::time::sleep(std::time::Duration::from_millis(u64::from(attempt) * 5 + 2)).await;
        }

        Err(DomainError::DatabaseError(format!(
            "persistent write contention for research {id}"
        )))
    }
}

/// Outcome of one read-modify-write closure invocation.
enum Mutation<T> {
    /// Nothing to write; return this value.
    Done(T),
    /// Commit `next` and map it through `finish` on success.
    Write {
        next: Research,
        finish: Box<dyn Fn(Research) -> T + Send>,
    },
}

#[async_trait]
impl ResearchRepository for SqliteResearchRepository {
    async fn create(
        &self,
        owner_uid: &str,
        title: &str,
        initial_primary: Option<ProviderState>,
    ) -> DomainResult<Research> {
        let title = title.trim();
        validate_title(title).map_err(DomainError::ValidationFailed)?;
        if owner_uid.trim().is_empty() {
            return Err(DomainError::ValidationFailed("Owner uid cannot be empty".into()));
        }

        let mut research = Research::new(owner_uid, title);
        if let Some(primary) = initial_primary {
            research = research.with_primary(primary);
        }

        let primary_json = serde_json::to_string(&research.primary)?;
        let secondary_json = serde_json::to_string(&research.secondary)?;
        let report_json = serde_json::to_string(&research.report)?;

        sqlx::query(
            r#"INSERT INTO research (id, owner_uid, title, status, primary_state,
               secondary_state, report, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(research.id.to_string())
        .bind(&research.owner_uid)
        .bind(&research.title)
        .bind(research.status.as_str())
        .bind(&primary_json)
        .bind(&secondary_json)
        .bind(&report_json)
        .bind(fmt_ts(research.created_at))
        .bind(fmt_ts(research.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(research)
    }

    async fn update(
        &self,
        id: Uuid,
        patch: ResearchPatch,
        owner: Option<&str>,
    ) -> DomainResult<Research> {
        if let Some(title) = &patch.title {
            validate_title(title).map_err(DomainError::ValidationFailed)?;
        }

        self.read_modify_write(id, owner, move |mut research| {
            if let Some(new_status) = patch.status {
                // Same-state writes are no-ops and always permitted.
                if new_status != research.status
                    && !research.status.can_transition_to(new_status)
                {
                    return Err(DomainError::InvalidStatusTransition {
                        from: research.status.as_str().to_string(),
                        to: new_status.as_str().to_string(),
                    });
                }
            }

            patch.clone().apply_to(&mut research);
            Ok(Mutation::Write { next: research, finish: Box::new(|r| r) })
        })
        .await
    }

    async fn get_by_id(&self, id: Uuid, owner: Option<&str>) -> DomainResult<Option<Research>> {
        match self.fetch(id).await? {
            Some(research) => {
                check_owner(&research, owner)?;
                Ok(Some(research))
            }
            None => Ok(None),
        }
    }

    async fn list_by_owner(
        &self,
        owner_uid: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> DomainResult<ResearchPage> {
        if limit == 0 {
            return Err(DomainError::ValidationFailed("Page size must be positive".into()));
        }
        let limit = limit.min(MAX_PAGE_SIZE);

        let rows: Vec<ResearchRow> = match cursor.map(decode_cursor).transpose()? {
            Some((created_at, id)) => {
                sqlx::query_as(
                    r#"SELECT * FROM research
                       WHERE owner_uid = ?
                         AND (created_at < ? OR (created_at = ? AND id < ?))
                       ORDER BY created_at DESC, id DESC
                       LIMIT ?"#,
                )
                .bind(owner_uid)
                .bind(fmt_ts(created_at))
                .bind(fmt_ts(created_at))
                .bind(id.to_string())
                .bind(i64::from(limit) + 1)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"SELECT * FROM research
                       WHERE owner_uid = ?
                       ORDER BY created_at DESC, id DESC
                       LIMIT ?"#,
                )
                .bind(owner_uid)
                .bind(i64::from(limit) + 1)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let has_more = rows.len() > limit as usize;
        let mut items = Vec::with_capacity(rows.len().min(limit as usize));
        for row in rows.into_iter().take(limit as usize) {
            items.push(row.try_into()?);
        }

        let next_cursor = if has_more {
            items.last().map(|last: &Research| encode_cursor(last.created_at, last.id))
        } else {
            None
        };

        Ok(ResearchPage { items, next_cursor })
    }

    async fn begin_run(&self, id: Uuid, owner: &str) -> DomainResult<RunAdmission> {
        self.read_modify_write(id, Some(owner), |mut research| {
            match research.status {
                ResearchStatus::Running => {
                    return Ok(Mutation::Done(RunAdmission { research, already_running: true }));
                }
                ResearchStatus::ReadyToRun => {}
                other => {
                    return Err(DomainError::StateConflict(format!(
                        "cannot start a run while status is {}",
                        other.as_str()
                    )));
                }
            }
            check_run_preconditions(&research)?;

            let now = Utc::now();
            research.primary.reset_for_run(now);
            research.secondary.reset_for_run(now);
            research.status = ResearchStatus::Running;

            Ok(Mutation::Write {
                next: research,
                finish: Box::new(|r| RunAdmission { research: r, already_running: false }),
            })
        })
        .await
    }

    async fn begin_provider_retry(
        &self,
        kind: ProviderKind,
        id: Uuid,
        owner: &str,
    ) -> DomainResult<RunAdmission> {
        self.read_modify_write(id, Some(owner), move |mut research| {
            if research.status == ResearchStatus::Running
                || research.provider(kind).status == ProviderRunStatus::Running
            {
                return Ok(Mutation::Done(RunAdmission { research, already_running: true }));
            }
            if !research.provider(kind).is_settled() {
                return Err(DomainError::StateConflict(format!(
                    "{} provider has no previous outcome to retry",
                    kind.as_str()
                )));
            }
            check_run_preconditions(&research)?;

            let now = Utc::now();
            research.provider_mut(kind).reset_for_run(now);
            // Re-opening a finished record for a partial re-run is a
            // run-lifecycle edge owned by the repository; requested
            // transitions through `update` still follow the strict table.
            research.status = ResearchStatus::Running;

            Ok(Mutation::Write {
                next: research,
                finish: Box::new(|r| RunAdmission { research: r, already_running: false }),
            })
        })
        .await
    }

    async fn settle_provider(
        &self,
        id: Uuid,
        kind: ProviderKind,
        started_at: DateTime<Utc>,
        outcome: ProviderOutcome,
    ) -> DomainResult<RunSettlement> {
        self.read_modify_write(id, None, move |mut research| {
            {
                let sub = research.provider(kind);
                // A settlement is only valid for the execution that was
                // admitted with this started_at token; a newer run resets
                // the substate and supersedes us.
                if sub.status != ProviderRunStatus::Running
                    || sub.started_at != Some(started_at)
                {
                    return Ok(Mutation::Done(RunSettlement {
                        research,
                        run_finished: false,
                        stale: true,
                    }));
                }
            }

            let now = Utc::now();
            let sub = research.provider_mut(kind);
            match outcome.clone() {
                ProviderOutcome::Success(result) => {
                    sub.status = ProviderRunStatus::Success;
                    sub.result = Some(result);
                    sub.error = None;
                }
                ProviderOutcome::Failure(error) => {
                    sub.status = ProviderRunStatus::Failure;
                    sub.result = None;
                    sub.error = Some(error);
                }
            }
            sub.completed_at = Some(now);
            sub.duration_ms = Some((now - started_at).num_milliseconds());

            // The terminal recomputation rides in the same guarded write as
            // the final settlement, so it happens exactly once per run.
            let mut run_finished = false;
            if research.status == ResearchStatus::Running && research.no_provider_running() {
                research.status = research.derived_terminal_status();
                run_finished = true;
            }

            Ok(Mutation::Write {
                next: research,
                finish: Box::new(move |r| RunSettlement { research: r, run_finished, stale: false }),
            })
        })
        .await
    }

    async fn mark_run_failed(&self, id: Uuid, reason: &str) -> DomainResult<()> {
        let reason = reason.to_string();
        self.read_modify_write(id, None, move |mut research| {
            if research.status != ResearchStatus::Running {
                return Ok(Mutation::Done(()));
            }

            let now = Utc::now();
            for kind in [ProviderKind::Primary, ProviderKind::Secondary] {
                let sub = research.provider_mut(kind);
                if sub.status == ProviderRunStatus::Running {
                    sub.status = ProviderRunStatus::Failure;
                    sub.error = Some(reason.clone());
                    sub.completed_at = Some(now);
                }
            }
            research.status = ResearchStatus::Failed;

            Ok(Mutation::Write { next: research, finish: Box::new(|_| ()) })
        })
        .await
    }
}

fn check_owner(research: &Research, owner: Option<&str>) -> DomainResult<()> {
    match owner {
        Some(uid) if uid != research.owner_uid => Err(DomainError::Forbidden(research.id)),
        _ => Ok(()),
    }
}

/// Preconditions shared by run admission and provider retry: a non-empty
/// final prompt and a primary-provider session handle.
fn check_run_preconditions(research: &Research) -> DomainResult<()> {
    let has_prompt = research
        .primary
        .final_prompt
        .as_deref()
        .is_some_and(|p| !p.trim().is_empty());
    if !has_prompt {
        return Err(DomainError::StateConflict(
            "cannot run without a final prompt".into(),
        ));
    }
    if research.primary.session_id.is_none() {
        return Err(DomainError::StateConflict(
            "cannot run without a primary provider session".into(),
        ));
    }
    Ok(())
}

/// Timestamps are stored as RFC3339 with a fixed-width fraction and a `Z`
/// suffix: lexicographic order matches chronological order, and the stored
/// value round-trips to the in-memory `DateTime` exactly.
fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// `updated_at` must strictly increase on every write, even when the clock
/// has not advanced past the stored value.
fn next_updated_at(prev: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > prev {
        now
    } else {
        prev + ChronoDuration::milliseconds(1)
    }
}

fn encode_cursor(created_at: DateTime<Utc>, id: Uuid) -> String {
    let tuple = serde_json::json!([fmt_ts(created_at), id.to_string()]);
    URL_SAFE_NO_PAD.encode(tuple.to_string())
}

fn decode_cursor(cursor: &str) -> DomainResult<(DateTime<Utc>, Uuid)> {
    let bytes = URL_SAFE_NO_PAD.decode(cursor).map_err(|_| DomainError::InvalidCursor)?;
    let (created_at, id): (String, String) =
        serde_json::from_slice(&bytes).map_err(|_| DomainError::InvalidCursor)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|_| DomainError::InvalidCursor)?
        .with_timezone(&Utc);
    let id = Uuid::parse_str(&id).map_err(|_| DomainError::InvalidCursor)?;
    Ok((created_at, id))
}

#[derive(sqlx::FromRow)]
struct ResearchRow {
    id: String,
    owner_uid: String,
    title: String,
    status: String,
    primary_state: String,
    secondary_state: String,
    report: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ResearchRow> for Research {
    type Error = DomainError;

    fn try_from(row: ResearchRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;

        let status = ResearchStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid status: {}", row.status))
        })?;

        let primary: ProviderState = serde_json::from_str(&row.primary_state)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let secondary: ProviderState = serde_json::from_str(&row.secondary_state)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let report: serde_json::Value = serde_json::from_str(&row.report)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;

        let created_at = parse_ts(&row.created_at)?;
        let updated_at = parse_ts(&row.updated_at)?;

        Ok(Research {
            id,
            owner_uid: row.owner_uid,
            title: row.title,
            status,
            primary,
            secondary,
            report,
            created_at,
            updated_at,
        })
    }
}

fn parse_ts(s: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{all_embedded_migrations, create_test_pool, Migrator};
    use crate::domain::models::{FieldPatch, ProviderStatePatch, Question};

    async fn setup_repo() -> SqliteResearchRepository {
        let pool = create_test_pool().await.unwrap();
        let migrator = Migrator::new(pool.clone());
        migrator
            .run_embedded_migrations(all_embedded_migrations())
            .await
            .unwrap();
        SqliteResearchRepository::new(pool)
    }

    fn session_state() -> ProviderState {
        ProviderState::with_session(
            "sess-1",
            vec![Question { index: 1, text: "Scope?".into() }],
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = setup_repo().await;
        let research = repo
            .create("uid-1", "  Battery recycling  ", Some(session_state()))
            .await
            .unwrap();

        assert_eq!(research.title, "Battery recycling");
        assert_eq!(research.status, ResearchStatus::AwaitingRefinements);

        let fetched = repo.get_by_id(research.id, Some("uid-1")).await.unwrap().unwrap();
        assert_eq!(fetched, research);
        assert_eq!(fetched.primary.session_id.as_deref(), Some("sess-1"));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_title() {
        let repo = setup_repo().await;
        let err = repo.create("uid-1", "   ", None).await.unwrap_err();
        assert_eq!(err.code(), "validation");
    }

    #[tokio::test]
    async fn test_ownership_is_forbidden_not_missing() {
        let repo = setup_repo().await;
        let research = repo.create("uid-1", "Topic", None).await.unwrap();

        let err = repo.get_by_id(research.id, Some("intruder")).await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        let err = repo
            .update(research.id, ResearchPatch::default(), Some("intruder"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        // A genuinely missing record is NotFound, not Forbidden.
        let missing = repo.get_by_id(Uuid::new_v4(), Some("uid-1")).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_update_enforces_transition_table() {
        let repo = setup_repo().await;
        let research = repo.create("uid-1", "Topic", None).await.unwrap();

        // awaiting_refinements -> running is not a listed edge.
        let err = repo
            .update(
                research.id,
                ResearchPatch::status(ResearchStatus::Running),
                Some("uid-1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStatusTransition { .. }));
        assert_eq!(err.code(), "state_conflict");

        // awaiting_refinements -> refining is listed.
        let updated = repo
            .update(
                research.id,
                ResearchPatch::status(ResearchStatus::Refining),
                Some("uid-1"),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, ResearchStatus::Refining);

        // Same-state write is a permitted no-op.
        let again = repo
            .update(
                research.id,
                ResearchPatch::status(ResearchStatus::Refining),
                Some("uid-1"),
            )
            .await
            .unwrap();
        assert_eq!(again.status, ResearchStatus::Refining);
    }

    #[tokio::test]
    async fn test_update_merges_provider_substate() {
        let repo = setup_repo().await;
        let research = repo.create("uid-1", "Topic", Some(session_state())).await.unwrap();

        let patch = ResearchPatch {
            primary: Some(ProviderStatePatch {
                job_id: FieldPatch::Set("job-1".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let updated = repo.update(research.id, patch, Some("uid-1")).await.unwrap();

        // Merged field set, untouched fields preserved.
        assert_eq!(updated.primary.job_id.as_deref(), Some("job-1"));
        assert_eq!(updated.primary.session_id.as_deref(), Some("sess-1"));
        assert_eq!(updated.primary.questions.len(), 1);

        // Explicit clear unsets.
        let patch = ResearchPatch {
            primary: Some(ProviderStatePatch {
                job_id: FieldPatch::Clear,
                ..Default::default()
            }),
            ..Default::default()
        };
        let cleared = repo.update(research.id, patch, Some("uid-1")).await.unwrap();
        assert_eq!(cleared.primary.job_id, None);
        assert_eq!(cleared.primary.session_id.as_deref(), Some("sess-1"));
    }

    #[tokio::test]
    async fn test_updated_at_strictly_increases() {
        let repo = setup_repo().await;
        let research = repo.create("uid-1", "Topic", None).await.unwrap();

        let mut prev = research.updated_at;
        for _ in 0..5 {
            let updated = repo
                .update(research.id, ResearchPatch::default(), Some("uid-1"))
                .await
                .unwrap();
            assert!(updated.updated_at > prev, "updated_at must strictly increase");
            prev = updated.updated_at;
        }
    }

    #[tokio::test]
    async fn test_malformed_cursor_is_validation_error() {
        let repo = setup_repo().await;
        repo.create("uid-1", "Topic", None).await.unwrap();

        let err = repo
            .list_by_owner("uid-1", 10, Some("not-a-cursor!"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidCursor));
        assert_eq!(err.code(), "validation");
    }

    #[tokio::test]
    async fn test_list_scopes_to_owner() {
        let repo = setup_repo().await;
        repo.create("uid-1", "Mine", None).await.unwrap();
        repo.create("uid-2", "Theirs", None).await.unwrap();

        let page = repo.list_by_owner("uid-1", 10, None).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].title, "Mine");
        assert!(page.next_cursor.is_none());
    }

    fn runnable_state() -> ProviderState {
        let mut state = session_state();
        state.final_prompt = Some("Investigate battery recycling economics".into());
        state
    }

    #[tokio::test]
    async fn test_begin_run_requires_ready_to_run() {
        let repo = setup_repo().await;
        let research = repo.create("uid-1", "Topic", Some(runnable_state())).await.unwrap();

        // Still awaiting refinements: not runnable.
        let err = repo.begin_run(research.id, "uid-1").await.unwrap_err();
        assert_eq!(err.code(), "state_conflict");

        repo.update(
            research.id,
            ResearchPatch::status(ResearchStatus::ReadyToRun),
            Some("uid-1"),
        )
        .await
        .unwrap();

        let admission = repo.begin_run(research.id, "uid-1").await.unwrap();
        assert!(!admission.already_running);
        assert_eq!(admission.research.status, ResearchStatus::Running);
        assert_eq!(admission.research.primary.status, ProviderRunStatus::Running);
        assert_eq!(admission.research.secondary.status, ProviderRunStatus::Running);

        // Second admission is a benign no-op.
        let second = repo.begin_run(research.id, "uid-1").await.unwrap();
        assert!(second.already_running);
    }

    #[tokio::test]
    async fn test_begin_run_names_missing_precondition() {
        let repo = setup_repo().await;
        // Session but no final prompt.
        let research = repo.create("uid-1", "Topic", Some(session_state())).await.unwrap();
        repo.update(
            research.id,
            ResearchPatch::status(ResearchStatus::ReadyToRun),
            Some("uid-1"),
        )
        .await
        .unwrap();

        let err = repo.begin_run(research.id, "uid-1").await.unwrap_err();
        assert!(err.to_string().contains("final prompt"));
    }

    #[tokio::test]
    async fn test_settlement_and_terminal_recompute() {
        let repo = setup_repo().await;
        let research = repo.create("uid-1", "Topic", Some(runnable_state())).await.unwrap();
        repo.update(
            research.id,
            ResearchPatch::status(ResearchStatus::ReadyToRun),
            Some("uid-1"),
        )
        .await
        .unwrap();
        let admission = repo.begin_run(research.id, "uid-1").await.unwrap();
        let started_at = admission.research.primary.started_at.unwrap();

        // First settlement: record stays running.
        let first = repo
            .settle_provider(
                research.id,
                ProviderKind::Primary,
                started_at,
                ProviderOutcome::Success(Default::default()),
            )
            .await
            .unwrap();
        assert!(!first.stale);
        assert!(!first.run_finished);
        assert_eq!(first.research.status, ResearchStatus::Running);

        // Second settlement finishes the run; one success => completed.
        let second = repo
            .settle_provider(
                research.id,
                ProviderKind::Secondary,
                started_at,
                ProviderOutcome::Failure("provider exploded".into()),
            )
            .await
            .unwrap();
        assert!(second.run_finished);
        assert_eq!(second.research.status, ResearchStatus::Completed);
        assert_eq!(second.research.secondary.error.as_deref(), Some("provider exploded"));
        assert!(second.research.secondary.duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_stale_settlement_is_ignored() {
        let repo = setup_repo().await;
        let research = repo.create("uid-1", "Topic", Some(runnable_state())).await.unwrap();
        repo.update(
            research.id,
            ResearchPatch::status(ResearchStatus::ReadyToRun),
            Some("uid-1"),
        )
        .await
        .unwrap();
        repo.begin_run(research.id, "uid-1").await.unwrap();

        let bogus_token = Utc::now() - ChronoDuration::hours(1);
        let settlement = repo
            .settle_provider(
                research.id,
                ProviderKind::Primary,
                bogus_token,
                ProviderOutcome::Failure("late".into()),
            )
            .await
            .unwrap();
        assert!(settlement.stale);
        assert_eq!(settlement.research.primary.status, ProviderRunStatus::Running);
    }

    #[tokio::test]
    async fn test_provider_retry_reopens_finished_record() {
        let repo = setup_repo().await;
        let research = repo.create("uid-1", "Topic", Some(runnable_state())).await.unwrap();
        repo.update(
            research.id,
            ResearchPatch::status(ResearchStatus::ReadyToRun),
            Some("uid-1"),
        )
        .await
        .unwrap();
        let admission = repo.begin_run(research.id, "uid-1").await.unwrap();
        let started_at = admission.research.primary.started_at.unwrap();

        repo.settle_provider(
            research.id,
            ProviderKind::Primary,
            started_at,
            ProviderOutcome::Success(Default::default()),
        )
        .await
        .unwrap();
        repo.settle_provider(
            research.id,
            ProviderKind::Secondary,
            started_at,
            ProviderOutcome::Failure("boom".into()),
        )
        .await
        .unwrap();

        // Retry the failed secondary; primary's success is untouched.
        let retry = repo
            .begin_provider_retry(ProviderKind::Secondary, research.id, "uid-1")
            .await
            .unwrap();
        assert!(!retry.already_running);
        assert_eq!(retry.research.status, ResearchStatus::Running);
        assert_eq!(retry.research.secondary.status, ProviderRunStatus::Running);
        assert_eq!(retry.research.primary.status, ProviderRunStatus::Success);

        // While running, another retry is a benign no-op.
        let again = repo
            .begin_provider_retry(ProviderKind::Secondary, research.id, "uid-1")
            .await
            .unwrap();
        assert!(again.already_running);
    }

    #[tokio::test]
    async fn test_provider_retry_requires_prior_outcome() {
        let repo = setup_repo().await;
        let research = repo.create("uid-1", "Topic", Some(runnable_state())).await.unwrap();
        repo.update(
            research.id,
            ResearchPatch::status(ResearchStatus::ReadyToRun),
            Some("uid-1"),
        )
        .await
        .unwrap();

        let err = repo
            .begin_provider_retry(ProviderKind::Secondary, research.id, "uid-1")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "state_conflict");
    }

    #[tokio::test]
    async fn test_mark_run_failed_fallback() {
        let repo = setup_repo().await;
        let research = repo.create("uid-1", "Topic", Some(runnable_state())).await.unwrap();
        repo.update(
            research.id,
            ResearchPatch::status(ResearchStatus::ReadyToRun),
            Some("uid-1"),
        )
        .await
        .unwrap();
        repo.begin_run(research.id, "uid-1").await.unwrap();

        repo.mark_run_failed(research.id, "store unavailable during settling")
            .await
            .unwrap();

        let fetched = repo.get_by_id(research.id, None).await.unwrap().unwrap();
        assert_eq!(fetched.status, ResearchStatus::Failed);
        assert_eq!(fetched.primary.status, ProviderRunStatus::Failure);
        assert!(fetched.primary.error.as_deref().unwrap().contains("store unavailable"));

        // Idempotent on a non-running record.
        repo.mark_run_failed(research.id, "again").await.unwrap();
    }
}
