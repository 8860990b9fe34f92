//! Patch types for partial research updates.
//!
//! The source of a patch may want to leave a field untouched, overwrite it,
//! or explicitly unset it. `FieldPatch` makes that three-way choice a closed
//! type instead of overloading `Option`.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::research::{
    Answer, ProviderResult, ProviderRunStatus, ProviderState, Question, Research, ResearchStatus,
};

/// Three-valued field update: leave as-is, unset, or overwrite.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPatch<T> {
    /// Leave the current value untouched
    Keep,
    /// Explicitly unset the value
    Clear,
    /// Overwrite with a new value
    Set(T),
}

// Hand-written so `FieldPatch<T>: Default` holds without requiring
// `T: Default` (the derive would add that bound).
impl<T> Default for FieldPatch<T> {
    fn default() -> Self {
        Self::Keep
    }
}

impl<T> FieldPatch<T> {
    pub fn apply(self, slot: &mut Option<T>) {
        match self {
            Self::Keep => {}
            Self::Clear => *slot = None,
            Self::Set(value) => *slot = Some(value),
        }
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }
}

impl<T> From<Option<T>> for FieldPatch<T> {
    /// `Some` overwrites, `None` clears. Use `FieldPatch::Keep` (the
    /// default) to leave a field untouched.
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Set(v),
            None => Self::Clear,
        }
    }
}

/// Field-by-field patch of one provider substate.
///
/// `questions` and `answers` are replaced wholesale when present and
/// preserved otherwise; they are never merged element-wise here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderStatePatch {
    pub status: Option<ProviderRunStatus>,
    pub session_id: FieldPatch<String>,
    pub job_id: FieldPatch<String>,
    pub questions: Option<Vec<Question>>,
    pub answers: Option<Vec<Answer>>,
    pub final_prompt: FieldPatch<String>,
    pub result: FieldPatch<ProviderResult>,
    pub error: FieldPatch<String>,
    pub started_at: FieldPatch<DateTime<Utc>>,
    pub completed_at: FieldPatch<DateTime<Utc>>,
    pub duration_ms: FieldPatch<i64>,
}

impl ProviderStatePatch {
    pub fn apply_to(self, state: &mut ProviderState) {
        if let Some(status) = self.status {
            state.status = status;
        }
        self.session_id.apply(&mut state.session_id);
        self.job_id.apply(&mut state.job_id);
        if let Some(questions) = self.questions {
            state.questions = questions;
        }
        if let Some(answers) = self.answers {
            state.answers = answers;
        }
        self.final_prompt.apply(&mut state.final_prompt);
        self.result.apply(&mut state.result);
        self.error.apply(&mut state.error);
        self.started_at.apply(&mut state.started_at);
        self.completed_at.apply(&mut state.completed_at);
        self.duration_ms.apply(&mut state.duration_ms);
    }
}

/// Partial update of a research record. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResearchPatch {
    pub title: Option<String>,
    pub status: Option<ResearchStatus>,
    pub primary: Option<ProviderStatePatch>,
    pub secondary: Option<ProviderStatePatch>,
    /// Shallow key merge into the report bag; a `null` value deletes the key
    pub report: Option<Value>,
}

impl ResearchPatch {
    pub fn status(status: ResearchStatus) -> Self {
        Self { status: Some(status), ..Default::default() }
    }

    /// Apply this patch to a record. The caller is responsible for having
    /// validated the status transition; this only mutates fields.
    pub fn apply_to(self, research: &mut Research) {
        if let Some(title) = self.title {
            research.title = title;
        }
        if let Some(status) = self.status {
            research.status = status;
        }
        if let Some(patch) = self.primary {
            patch.apply_to(&mut research.primary);
        }
        if let Some(patch) = self.secondary {
            patch.apply_to(&mut research.secondary);
        }
        if let Some(report) = self.report {
            merge_report_bag(&mut research.report, report);
        }
    }
}

/// Shallow merge of the report metadata bag: top-level keys from `patch`
/// overwrite, `null` deletes, unrelated keys are preserved. A non-object
/// patch replaces the bag entirely.
pub fn merge_report_bag(existing: &mut Value, patch: Value) {
    let Value::Object(patch_map) = patch else {
        *existing = patch;
        return;
    };

    if !existing.is_object() {
        *existing = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(map) = existing {
        for (key, value) in patch_map {
            if value.is_null() {
                map.remove(&key);
            } else {
                map.insert(key, value);
            }
        }
    }
}
