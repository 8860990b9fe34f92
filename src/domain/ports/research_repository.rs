//! Repository port for research persistence.
//!
//! The repository owns the status transition guard and the run-lifecycle
//! operations, so every status edge in the system is validated in exactly
//! one place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ProviderKind, ProviderOutcome, ProviderState, Research, ResearchPatch};

/// One page of an owner's research records.
#[derive(Debug, Clone)]
pub struct ResearchPage {
    pub items: Vec<Research>,
    /// Opaque continuation token; feed back verbatim to resume after the
    /// last returned row. `None` means the listing is exhausted.
    pub next_cursor: Option<String>,
}

/// Result of a guarded admission (run start or single-provider retry).
#[derive(Debug, Clone)]
pub struct RunAdmission {
    pub research: Research,
    /// True when the record (or the named provider) was already running and
    /// the call was a benign no-op.
    pub already_running: bool,
}

/// Result of persisting one provider settlement.
#[derive(Debug, Clone)]
pub struct RunSettlement {
    pub research: Research,
    /// True when this settlement was the last one outstanding and the
    /// terminal status was recomputed in the same transaction.
    pub run_finished: bool,
    /// True when the settlement no longer matched the stored substate
    /// (a newer run superseded it) and was discarded.
    pub stale: bool,
}

/// Repository port for research records.
#[async_trait]
pub trait ResearchRepository: Send + Sync {
    /// Insert a new record owned by `owner_uid`. The optional initial
    /// primary substate carries the bootstrapped clarification session.
    async fn create(
        &self,
        owner_uid: &str,
        title: &str,
        initial_primary: Option<ProviderState>,
    ) -> DomainResult<Research>;

    /// Atomically read-modify-write a record. Status changes must pass the
    /// transition table; same-state writes are no-ops. When `owner` is
    /// given, a mismatch fails with a forbidden error.
    async fn update(
        &self,
        id: Uuid,
        patch: ResearchPatch,
        owner: Option<&str>,
    ) -> DomainResult<Research>;

    /// Fetch a record by id. When `owner` is given, a mismatch fails with a
    /// forbidden error rather than reporting absence.
    async fn get_by_id(&self, id: Uuid, owner: Option<&str>) -> DomainResult<Option<Research>>;

    /// Page through an owner's records in `(created_at DESC, id DESC)`
    /// order. A malformed cursor is a validation error.
    async fn list_by_owner(
        &self,
        owner_uid: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> DomainResult<ResearchPage>;

    /// Admit a full run: `ready_to_run` flips to `running` with both
    /// substates reset; `running` reports `already_running`; anything else
    /// is a state conflict. Run preconditions (final prompt, primary
    /// session handle) are checked inside the same transaction.
    async fn begin_run(&self, id: Uuid, owner: &str) -> DomainResult<RunAdmission>;

    /// Admit a single-provider retry: requires a previously settled outcome
    /// for that provider; refuses with `already_running` while the record or
    /// the provider is running; does not disturb the other provider.
    async fn begin_provider_retry(
        &self,
        kind: ProviderKind,
        id: Uuid,
        owner: &str,
    ) -> DomainResult<RunAdmission>;

    /// Persist one provider's outcome. `started_at` is the admission token:
    /// a mismatch marks the settlement stale and leaves the record alone.
    /// When this settlement is the last outstanding one, the terminal status
    /// is recomputed inside the same transaction.
    async fn settle_provider(
        &self,
        id: Uuid,
        kind: ProviderKind,
        started_at: DateTime<Utc>,
        outcome: ProviderOutcome,
    ) -> DomainResult<RunSettlement>;

    /// Best-effort fallback: force a running record to `failed`, recording
    /// `reason` on any substate still marked running.
    async fn mark_run_failed(&self, id: Uuid, reason: &str) -> DomainResult<()>;
}
