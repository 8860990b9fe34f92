//! Research domain model.
//!
//! A research record tracks one user's end-to-end research session: the
//! clarifying question loop, the parallel provider executions, and the
//! final report metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum accepted title length, in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// Status of a research record in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    /// Created; waiting for the user to answer the first clarifying question
    AwaitingRefinements,
    /// Mid clarifying loop; at least one answer submitted
    Refining,
    /// Final prompt produced; runnable
    ReadyToRun,
    /// Provider executions in flight
    Running,
    /// At least one provider succeeded
    Completed,
    /// No provider succeeded
    Failed,
}

impl Default for ResearchStatus {
    fn default() -> Self {
        Self::AwaitingRefinements
    }
}

impl ResearchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingRefinements => "awaiting_refinements",
            Self::Refining => "refining",
            Self::ReadyToRun => "ready_to_run",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "awaiting_refinements" => Some(Self::AwaitingRefinements),
            "refining" => Some(Self::Refining),
            "ready_to_run" => Some(Self::ReadyToRun),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Valid transitions from this status. Same-state writes are treated as
    /// no-ops by the repository and never consult this table.
    pub fn valid_transitions(&self) -> Vec<ResearchStatus> {
        match self {
            Self::AwaitingRefinements => vec![Self::Refining, Self::ReadyToRun, Self::Failed],
            Self::Refining => vec![Self::ReadyToRun, Self::Failed],
            Self::ReadyToRun => vec![Self::Running, Self::Failed],
            Self::Running => vec![Self::Completed, Self::Failed],
            Self::Completed => vec![],
            Self::Failed => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// The two providers a research record fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Primary,
    Secondary,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "primary" => Some(Self::Primary),
            "secondary" => Some(Self::Secondary),
            _ => None,
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }
}

/// Execution status of a single provider within a research record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRunStatus {
    Idle,
    Running,
    Success,
    Failure,
}

impl Default for ProviderRunStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl ProviderRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    /// A settled provider has produced its outcome for the current run.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

/// A clarifying question posed by the primary provider. Indices are 1-based
/// and unique within a record; insertion order is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub index: u32,
    pub text: String,
}

/// A user answer to a clarifying question, keyed by the question index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub index: u32,
    pub answer: String,
}

/// Normalized output of a successful provider execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    /// Short summary of the findings
    pub summary: String,
    /// Individual findings, in provider order
    #[serde(default)]
    pub findings: Vec<String>,
    /// Provider-specific structured metadata
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Per-provider execution state embedded in a research record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderState {
    #[serde(default)]
    pub status: ProviderRunStatus,
    /// Upstream session handle (clarification phase)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Upstream job handle (execution phase)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub answers: Vec<Answer>,
    /// Set at most once, by the refinement loop's terminal reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ProviderResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl ProviderState {
    /// Initial state carrying a bootstrapped clarification session.
    pub fn with_session(session_id: impl Into<String>, questions: Vec<Question>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            questions,
            ..Default::default()
        }
    }

    /// Reset execution fields at the start of a run. Session, questions,
    /// answers and the final prompt are preserved; the previous outcome and
    /// job handle are cleared.
    pub fn reset_for_run(&mut self, now: DateTime<Utc>) {
        self.status = ProviderRunStatus::Running;
        self.job_id = None;
        self.result = None;
        self.error = None;
        self.started_at = Some(now);
        self.completed_at = None;
        self.duration_ms = None;
    }

    pub fn is_settled(&self) -> bool {
        self.status.is_settled()
    }

    /// Upsert an answer by index: a resubmission for the same index replaces
    /// it in place; a new index is appended.
    pub fn upsert_answer(&mut self, index: u32, answer: impl Into<String>) {
        let answer = answer.into();
        match self.answers.iter_mut().find(|a| a.index == index) {
            Some(existing) => existing.answer = answer,
            None => self.answers.push(Answer { index, answer }),
        }
    }

    /// Merge a question by index: an existing index has its text replaced,
    /// a new index is appended. Questions are never silently dropped.
    pub fn merge_question(&mut self, question: Question) {
        match self.questions.iter_mut().find(|q| q.index == question.index) {
            Some(existing) => existing.text = question.text,
            None => self.questions.push(question),
        }
    }

    pub fn question_at(&self, index: u32) -> Option<&Question> {
        self.questions.iter().find(|q| q.index == index)
    }
}

/// Outcome of one provider execution, as handed to the repository by the
/// scheduler when the execution settles.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome {
    Success(ProviderResult),
    Failure(String),
}

/// The aggregate root tracking one end-to-end research session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Research {
    /// Unique identifier, assigned at creation
    pub id: Uuid,
    /// Identity of the creating user; all access is scoped to it
    pub owner_uid: String,
    pub title: String,
    pub status: ResearchStatus,
    pub primary: ProviderState,
    pub secondary: ProviderState,
    /// Opaque delivery metadata bag, shallow-merged by the repository
    #[serde(default)]
    pub report: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Research {
    pub fn new(owner_uid: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_uid: owner_uid.into(),
            title: title.into(),
            status: ResearchStatus::default(),
            primary: ProviderState::default(),
            secondary: ProviderState::default(),
            report: serde_json::Value::Object(serde_json::Map::new()),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_primary(mut self, state: ProviderState) -> Self {
        self.primary = state;
        self
    }

    pub fn provider(&self, kind: ProviderKind) -> &ProviderState {
        match kind {
            ProviderKind::Primary => &self.primary,
            ProviderKind::Secondary => &self.secondary,
        }
    }

    pub fn provider_mut(&mut self, kind: ProviderKind) -> &mut ProviderState {
        match kind {
            ProviderKind::Primary => &mut self.primary,
            ProviderKind::Secondary => &mut self.secondary,
        }
    }

    /// True when no provider substate is mid-execution.
    pub fn no_provider_running(&self) -> bool {
        self.primary.status != ProviderRunStatus::Running
            && self.secondary.status != ProviderRunStatus::Running
    }

    /// Terminal status derived from settled provider outcomes: completed if
    /// at least one provider succeeded, failed otherwise.
    pub fn derived_terminal_status(&self) -> ResearchStatus {
        if self.primary.status == ProviderRunStatus::Success
            || self.secondary.status == ProviderRunStatus::Success
        {
            ResearchStatus::Completed
        } else {
            ResearchStatus::Failed
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_title(&self.title)?;
        if self.owner_uid.trim().is_empty() {
            return Err("Owner uid cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Validate a research title: non-empty after trimming and bounded length.
pub fn validate_title(title: &str) -> Result<(), String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err("Title cannot be empty".to_string());
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(format!("Title cannot exceed {MAX_TITLE_LEN} characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ResearchStatus::AwaitingRefinements,
            ResearchStatus::Refining,
            ResearchStatus::ReadyToRun,
            ResearchStatus::Running,
            ResearchStatus::Completed,
            ResearchStatus::Failed,
        ] {
            assert_eq!(ResearchStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(ResearchStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_transition_table() {
        use ResearchStatus::{
            AwaitingRefinements, Completed, Failed, ReadyToRun, Refining, Running,
        };

        let legal = [
            (AwaitingRefinements, Refining),
            (AwaitingRefinements, ReadyToRun),
            (AwaitingRefinements, Failed),
            (Refining, ReadyToRun),
            (Refining, Failed),
            (ReadyToRun, Running),
            (ReadyToRun, Failed),
            (Running, Completed),
            (Running, Failed),
        ];

        let all = [AwaitingRefinements, Refining, ReadyToRun, Running, Completed, Failed];
        for from in all {
            for to in all {
                if from == to {
                    continue;
                }
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{} -> {}",
                    from.as_str(),
                    to.as_str()
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_edges() {
        assert!(ResearchStatus::Completed.valid_transitions().is_empty());
        assert!(ResearchStatus::Failed.valid_transitions().is_empty());
        assert!(ResearchStatus::Completed.is_terminal());
        assert!(ResearchStatus::Failed.is_terminal());
        assert!(!ResearchStatus::Running.is_terminal());
    }

    #[test]
    fn test_answer_upsert_replaces_in_place() {
        let mut state = ProviderState::default();
        state.upsert_answer(1, "first");
        state.upsert_answer(2, "second");
        state.upsert_answer(1, "revised");

        assert_eq!(state.answers.len(), 2);
        assert_eq!(state.answers[0].index, 1);
        assert_eq!(state.answers[0].answer, "revised");
        assert_eq!(state.answers[1].answer, "second");
    }

    #[test]
    fn test_question_merge_preserves_order() {
        let mut state = ProviderState::default();
        state.merge_question(Question { index: 1, text: "What scope?".into() });
        state.merge_question(Question { index: 2, text: "What depth?".into() });
        state.merge_question(Question { index: 1, text: "What scope exactly?".into() });

        assert_eq!(state.questions.len(), 2);
        assert_eq!(state.questions[0].text, "What scope exactly?");
        assert_eq!(state.questions[1].index, 2);
    }

    #[test]
    fn test_reset_for_run_preserves_refinement_state() {
        let mut state = ProviderState::with_session(
            "sess-1",
            vec![Question { index: 1, text: "Q".into() }],
        );
        state.upsert_answer(1, "A");
        state.final_prompt = Some("prompt".into());
        state.result = Some(ProviderResult::default());
        state.error = Some("old error".into());
        state.job_id = Some("job-old".into());

        let now = Utc::now();
        state.reset_for_run(now);

        assert_eq!(state.status, ProviderRunStatus::Running);
        assert_eq!(state.started_at, Some(now));
        assert!(state.result.is_none());
        assert!(state.error.is_none());
        assert!(state.job_id.is_none());
        assert!(state.completed_at.is_none());
        assert_eq!(state.session_id.as_deref(), Some("sess-1"));
        assert_eq!(state.final_prompt.as_deref(), Some("prompt"));
        assert_eq!(state.questions.len(), 1);
        assert_eq!(state.answers.len(), 1);
    }

    #[test]
    fn test_derived_terminal_status() {
        let mut research = Research::new("uid", "Title");
        research.primary.status = ProviderRunStatus::Success;
        research.secondary.status = ProviderRunStatus::Failure;
        assert_eq!(research.derived_terminal_status(), ResearchStatus::Completed);

        research.primary.status = ProviderRunStatus::Failure;
        assert_eq!(research.derived_terminal_status(), ResearchStatus::Failed);
    }

    #[test]
    fn test_title_validation() {
        assert!(validate_title("A valid topic").is_ok());
        assert!(validate_title("   ").is_err());
        assert!(validate_title("").is_err());
        assert!(validate_title(&"x".repeat(MAX_TITLE_LEN + 1)).is_err());
        assert!(validate_title(&"x".repeat(MAX_TITLE_LEN)).is_ok());
    }
}
