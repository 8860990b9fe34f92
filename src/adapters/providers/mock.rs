//! Mock research provider for tests and offline development.
//!
//! Scriptable: configure how many clarifying questions the session asks,
//! what final prompt it produces, and how each run settles.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::models::{ProviderResult, Question};
use crate::domain::ports::{
    ProviderError, ResearchProvider, RunHandle, RunPoll, SessionReply, SessionStart,
};

/// Scripted behavior for mock runs.
#[derive(Debug, Clone)]
pub struct MockRunScript {
    /// Polls that report pending before the run settles
    pub pending_polls: u32,
    /// Whether the run fails
    pub fail: bool,
    /// Error message when failing
    pub error_message: Option<String>,
    /// Result when succeeding
    pub result: ProviderResult,
    /// Errors returned by `execute_run` before it succeeds (retry fodder)
    pub start_failures: u32,
}

impl Default for MockRunScript {
    fn default() -> Self {
        Self {
            pending_polls: 1,
            fail: false,
            error_message: None,
            result: ProviderResult {
                summary: "Mock research completed.".to_string(),
                findings: vec!["finding one".to_string()],
                metadata: serde_json::Value::Null,
            },
            start_failures: 0,
        }
    }
}

impl MockRunScript {
    pub fn success(summary: impl Into<String>) -> Self {
        Self {
            result: ProviderResult { summary: summary.into(), ..Default::default() },
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            fail: true,
            error_message: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_start_failures(mut self, failures: u32) -> Self {
        self.start_failures = failures;
        self
    }

    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }
}

struct JobState {
    script: MockRunScript,
    polls_seen: u32,
}

/// Mock research provider.
pub struct MockProvider {
    name: &'static str,
    /// Questions the clarification session asks, in order
    session_questions: Vec<Question>,
    /// Final prompt produced once every question is answered
    final_prompt: String,
    run_script: Arc<RwLock<MockRunScript>>,
    start_failures_left: Arc<RwLock<u32>>,
    jobs: Arc<RwLock<HashMap<String, JobState>>>,
}

impl MockProvider {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            session_questions: vec![
                Question { index: 1, text: "What aspect matters most to you?".into() },
                Question { index: 2, text: "Any sources to prioritize?".into() },
            ],
            final_prompt: "Mock final research prompt".to_string(),
            run_script: Arc::new(RwLock::new(MockRunScript::default())),
            start_failures_left: Arc::new(RwLock::new(0)),
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_questions(mut self, questions: Vec<Question>) -> Self {
        self.session_questions = questions;
        self
    }

    pub fn with_final_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.final_prompt = prompt.into();
        self
    }

    /// Replace the script applied to subsequent runs.
    pub async fn set_run_script(&self, script: MockRunScript) {
        *self.start_failures_left.write().await = script.start_failures;
        *self.run_script.write().await = script;
    }

    /// Number of runs successfully started so far.
    pub async fn runs_started(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait]
impl ResearchProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn start_session(&self, _topic: &str) -> Result<SessionStart, ProviderError> {
        Ok(SessionStart {
            session_id: format!("mock-session-{}", Uuid::new_v4()),
            questions: self.session_questions.first().cloned().into_iter().collect(),
        })
    }

    async fn submit_answer(
        &self,
        _session_id: &str,
        _answer: &str,
        question_index: u32,
    ) -> Result<SessionReply, ProviderError> {
        let next = self
            .session_questions
            .iter()
            .find(|q| q.index == question_index + 1)
            .cloned();

        match next {
            Some(question) => Ok(SessionReply { next_question: Some(question), final_prompt: None }),
            None => Ok(SessionReply {
                next_question: None,
                final_prompt: Some(self.final_prompt.clone()),
            }),
        }
    }

    async fn execute_run(
        &self,
        _session_id: Option<&str>,
        _prompt: &str,
    ) -> Result<RunHandle, ProviderError> {
        {
            let mut left = self.start_failures_left.write().await;
            if *left > 0 {
                *left -= 1;
                return Err(ProviderError::ServerError {
                    status: 503,
                    message: "mock start failure".into(),
                });
            }
        }

        let job_id = format!("mock-job-{}", Uuid::new_v4());
        let script = self.run_script.read().await.clone();
        self.jobs
            .write()
            .await
            .insert(job_id.clone(), JobState { script, polls_seen: 0 });

        Ok(RunHandle { job_id })
    }

    async fn poll_result(&self, job_id: &str) -> Result<RunPoll, ProviderError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| ProviderError::InvalidRequest(format!("unknown job {job_id}")))?;

        if job.polls_seen < job.script.pending_polls {
            job.polls_seen += 1;
            return Ok(RunPoll::Pending);
        }

        if job.script.fail {
            let message = job
                .script
                .error_message
                .clone()
                .unwrap_or_else(|| "mock failure".to_string());
            Ok(RunPoll::Failed(message))
        } else {
            Ok(RunPoll::Completed(job.script.result.clone()))
        }
    }
}
