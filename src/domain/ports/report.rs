//! Report finalizer port.
//!
//! Invoked fire-and-forget by the scheduler once a run completes. The core
//! records nothing about the finalizer's internals beyond whether the call
//! was made.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::ProviderResult;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Report delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Everything the report collaborator needs to render and deliver.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub research_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub owner_email: String,
    pub primary_result: Option<ProviderResult>,
    pub secondary_result: Option<ProviderResult>,
}

/// Receipt for a finalized report.
#[derive(Debug, Clone, Default)]
pub struct ReportReceipt {
    pub storage_path: Option<String>,
    pub email_status: Option<String>,
}

#[async_trait]
pub trait ReportFinalizer: Send + Sync {
    async fn finalize(&self, request: ReportRequest) -> Result<ReportReceipt, ReportError>;
}
