//! Research service: the creation and read surface.
//!
//! Creation bootstraps a clarification session with the primary provider
//! before the record is persisted, so a freshly created record always
//! carries its session handle and opening questions.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{validate_title, ProviderState, Research};
use crate::domain::ports::{ProviderError, ResearchPage, ResearchProvider, ResearchRepository};
use crate::infrastructure::retry::RetryPolicy;

pub struct ResearchService {
    repo: Arc<dyn ResearchRepository>,
    primary: Arc<dyn ResearchProvider>,
    retry_policy: RetryPolicy,
}

impl ResearchService {
    pub fn new(
        repo: Arc<dyn ResearchRepository>,
        primary: Arc<dyn ResearchProvider>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self { repo, primary, retry_policy }
    }

    /// Create a research record for a topic: validates the title, opens the
    /// clarification session upstream, and persists the record carrying the
    /// session handle and opening questions.
    pub async fn create_research(&self, owner_uid: &str, topic: &str) -> DomainResult<Research> {
        let topic = topic.trim();
        validate_title(topic).map_err(DomainError::ValidationFailed)?;

        let session = self
            .retry_policy
            .execute_with(|| self.primary.start_session(topic), ProviderError::is_transient)
            .await?;

        let initial = ProviderState::with_session(session.session_id, session.questions);
        self.repo.create(owner_uid, topic, Some(initial)).await
    }

    pub async fn get_research(&self, id: Uuid, owner_uid: &str) -> DomainResult<Research> {
        self.repo
            .get_by_id(id, Some(owner_uid))
            .await?
            .ok_or(DomainError::ResearchNotFound(id))
    }

    pub async fn list_research(
        &self,
        owner_uid: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> DomainResult<ResearchPage> {
        self.repo.list_by_owner(owner_uid, limit, cursor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::providers::MockProvider;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteResearchRepository};
    use crate::domain::models::ResearchStatus;

    async fn setup_service() -> ResearchService {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = Arc::new(SqliteResearchRepository::new(pool));
        let primary = Arc::new(MockProvider::new("primary"));
        ResearchService::new(repo, primary, RetryPolicy::default())
    }

    #[tokio::test]
    async fn test_create_bootstraps_session() {
        let service = setup_service().await;
        let research = service.create_research("uid-1", "Grid storage").await.unwrap();

        assert_eq!(research.status, ResearchStatus::AwaitingRefinements);
        assert!(research.primary.session_id.is_some());
        assert_eq!(research.primary.questions.len(), 1);
        assert_eq!(research.primary.questions[0].index, 1);
    }

    #[tokio::test]
    async fn test_create_rejects_empty_topic() {
        let service = setup_service().await;
        let err = service.create_research("uid-1", "   ").await.unwrap_err();
        assert_eq!(err.code(), "validation");
    }

    #[tokio::test]
    async fn test_get_scopes_ownership() {
        let service = setup_service().await;
        let research = service.create_research("uid-1", "Topic").await.unwrap();

        let err = service.get_research(research.id, "intruder").await.unwrap_err();
        assert_eq!(err.code(), "forbidden");

        let missing = service.get_research(Uuid::new_v4(), "uid-1").await.unwrap_err();
        assert_eq!(missing.code(), "not_found");
    }
}
