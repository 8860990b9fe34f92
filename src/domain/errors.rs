//! Domain errors for the parallax research orchestrator.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::ports::provider::ProviderError;

/// Domain-level errors. Each variant carries a stable machine-readable code
/// (see [`DomainError::code`]) used at the user-facing boundary.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid pagination cursor")]
    InvalidCursor,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("Research {0} belongs to another owner")]
    Forbidden(Uuid),

    #[error("Research not found: {0}")]
    ResearchNotFound(Uuid),

    #[error("Rate limiter exhausted after {attempts} attempts for scope {scope}")]
    RateLimiterExhausted { scope: String, attempts: u32 },

    #[error("Upstream provider error: {0}")]
    Upstream(#[from] ProviderError),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DomainError {
    /// Stable error code surfaced to callers alongside the human message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationFailed(_) | Self::InvalidCursor => "validation",
            Self::InvalidStatusTransition { .. } | Self::StateConflict(_) => "state_conflict",
            Self::Forbidden(_) => "forbidden",
            Self::ResearchNotFound(_) => "not_found",
            Self::Upstream(err) => {
                if err.is_transient() {
                    "upstream_retryable"
                } else {
                    "upstream_terminal"
                }
            }
            Self::RateLimiterExhausted { .. }
            | Self::DatabaseError(_)
            | Self::SerializationError(_) => "infrastructure",
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_codes() {
        let id = Uuid::new_v4();
        assert_eq!(DomainError::ValidationFailed("x".into()).code(), "validation");
        assert_eq!(DomainError::InvalidCursor.code(), "validation");
        assert_eq!(
            DomainError::InvalidStatusTransition { from: "failed".into(), to: "running".into() }
                .code(),
            "state_conflict"
        );
        assert_eq!(DomainError::Forbidden(id).code(), "forbidden");
        assert_eq!(DomainError::ResearchNotFound(id).code(), "not_found");
        assert_eq!(DomainError::DatabaseError("down".into()).code(), "infrastructure");
    }

    #[test]
    fn test_upstream_code_follows_classification() {
        let retryable = DomainError::Upstream(ProviderError::Timeout);
        assert_eq!(retryable.code(), "upstream_retryable");

        let terminal = DomainError::Upstream(ProviderError::InvalidRequest("bad".into()));
        assert_eq!(terminal.code(), "upstream_terminal");
    }
}
