//! Provider port - interface for the external research execution services.
//!
//! Two providers back every research record. The primary one also drives the
//! clarification loop; both execute long-running research jobs. The core
//! depends only on this contract, never on a concrete wire format.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::{ProviderResult, Question};

/// Errors surfaced by provider adapters.
///
/// Variants are split so the retry layer can tell transient failures
/// (rate limits, server errors, network, timeouts) from terminal ones
/// (client errors, failed jobs, malformed payloads).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Request rejected by the provider as malformed (4xx other than 429)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication or authorization failure
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Provider-side rate limit, optionally carrying a retry-after hint
    #[error("Rate limited by upstream")]
    RateLimited { retry_after: Option<Duration> },

    /// Provider-side server error (5xx)
    #[error("Upstream server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Transport-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// The provider did not respond in time
    #[error("Timeout waiting for upstream")]
    Timeout,

    /// The research job itself failed upstream
    #[error("Job failed upstream: {0}")]
    JobFailed(String),

    /// Response arrived but could not be interpreted
    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    /// Explicitly non-retryable; short-circuits the retry layer regardless
    /// of any classifier override
    #[error("Non-retryable: {0}")]
    NonRetryable(String),
}

impl ProviderError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ServerError { .. } | Self::Network(_) | Self::Timeout
        )
    }

    /// Server-supplied wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Result of bootstrapping a clarification session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStart {
    pub session_id: String,
    pub questions: Vec<Question>,
}

/// Provider reply to a submitted answer: either the next question to ask,
/// or the final prompt terminating the loop. Exactly one is expected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReply {
    pub next_question: Option<Question>,
    pub final_prompt: Option<String>,
}

/// Handle for a started research job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub job_id: String,
}

/// One poll of a research job.
#[derive(Debug, Clone, PartialEq)]
pub enum RunPoll {
    Pending,
    Completed(ProviderResult),
    Failed(String),
}

/// Contract every research provider adapter satisfies.
#[async_trait]
pub trait ResearchProvider: Send + Sync {
    /// Provider display name, used in logs.
    fn name(&self) -> &'static str;

    /// Open a clarification session for a topic (primary provider only).
    async fn start_session(&self, topic: &str) -> Result<SessionStart, ProviderError>;

    /// Submit one answer; the provider returns the next question or the
    /// final prompt.
    async fn submit_answer(
        &self,
        session_id: &str,
        answer: &str,
        question_index: u32,
    ) -> Result<SessionReply, ProviderError>;

    /// Start a research run for a prompt. The session handle is provided
    /// when the provider ties runs to clarification sessions.
    async fn execute_run(
        &self,
        session_id: Option<&str>,
        prompt: &str,
    ) -> Result<RunHandle, ProviderError>;

    /// Poll a previously started run.
    async fn poll_result(&self, job_id: &str) -> Result<RunPoll, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::RateLimited { retry_after: None }.is_transient());
        assert!(ProviderError::ServerError { status: 503, message: String::new() }.is_transient());
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(ProviderError::Timeout.is_transient());

        assert!(!ProviderError::InvalidRequest("bad".into()).is_transient());
        assert!(!ProviderError::AuthenticationFailed("no key".into()).is_transient());
        assert!(!ProviderError::JobFailed("upstream".into()).is_transient());
        assert!(!ProviderError::MalformedResponse("junk".into()).is_transient());
        assert!(!ProviderError::NonRetryable("stop".into()).is_transient());
    }

    #[test]
    fn test_retry_after_hint() {
        let hinted = ProviderError::RateLimited { retry_after: Some(Duration::from_secs(7)) };
        assert_eq!(hinted.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(ProviderError::Timeout.retry_after(), None);
    }
}
