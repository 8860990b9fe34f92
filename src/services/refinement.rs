//! Refinement coordinator: drives the clarifying question loop.
//!
//! Each submitted answer goes to the primary provider, which replies with
//! either the next question or the final prompt. The coordinator upserts
//! the answer by index, merges the next question, and moves the record
//! toward `ready_to_run` when the loop terminates.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Answer, FieldPatch, ProviderStatePatch, Question, Research, ResearchPatch, ResearchStatus,
};
use crate::domain::ports::{ProviderError, ResearchProvider, ResearchRepository};
use crate::infrastructure::retry::RetryPolicy;

/// Result of submitting one answer.
#[derive(Debug, Clone)]
pub struct SubmitAnswerOutcome {
    pub research: Research,
    pub next_question: Option<Question>,
    pub final_prompt: Option<String>,
}

/// Full Q/A view for resuming a clarification session.
#[derive(Debug, Clone)]
pub struct RefinementView {
    pub research_id: Uuid,
    pub status: ResearchStatus,
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
    pub current_question: Option<Question>,
    pub final_prompt: Option<String>,
}

pub struct RefinementCoordinator {
    repo: Arc<dyn ResearchRepository>,
    primary: Arc<dyn ResearchProvider>,
    retry_policy: RetryPolicy,
}

impl RefinementCoordinator {
    pub fn new(
        repo: Arc<dyn ResearchRepository>,
        primary: Arc<dyn ResearchProvider>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self { repo, primary, retry_policy }
    }

    /// Submit the answer for `question_index` and advance the loop.
    pub async fn submit_answer(
        &self,
        research_id: Uuid,
        owner_uid: &str,
        answer: &str,
        question_index: u32,
    ) -> DomainResult<SubmitAnswerOutcome> {
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(DomainError::ValidationFailed("Answer cannot be empty".into()));
        }

        let research = self
            .repo
            .get_by_id(research_id, Some(owner_uid))
            .await?
            .ok_or(DomainError::ResearchNotFound(research_id))?;

        if !matches!(
            research.status,
            ResearchStatus::AwaitingRefinements | ResearchStatus::Refining
        ) {
            return Err(DomainError::StateConflict(format!(
                "answers can only be submitted while refining, status is {}",
                research.status.as_str()
            )));
        }
        if research.primary.final_prompt.is_some() {
            return Err(DomainError::StateConflict(
                "final prompt already recorded for this research".into(),
            ));
        }
        let Some(session_id) = research.primary.session_id.clone() else {
            return Err(DomainError::StateConflict(
                "clarification session was never established".into(),
            ));
        };

        let reply = self
            .retry_policy
            .execute_with(
                || self.primary.submit_answer(&session_id, answer, question_index),
                ProviderError::is_transient,
            )
            .await?;

        // Work on a copy of the substate so upsert/merge semantics live in
        // one place; the repository replaces the collections wholesale.
        let mut next_state = research.primary.clone();
        next_state.upsert_answer(question_index, answer);
        if let Some(question) = reply.next_question.clone() {
            next_state.merge_question(question);
        }

        let status = if reply.final_prompt.is_some() {
            Some(ResearchStatus::ReadyToRun)
        } else if research.status == ResearchStatus::AwaitingRefinements {
            Some(ResearchStatus::Refining)
        } else {
            None
        };

        let patch = ResearchPatch {
            status,
            primary: Some(ProviderStatePatch {
                questions: Some(next_state.questions),
                answers: Some(next_state.answers),
                final_prompt: reply
                    .final_prompt
                    .clone()
                    .map_or(FieldPatch::Keep, FieldPatch::Set),
                ..Default::default()
            }),
            ..Default::default()
        };

        let research = self.repo.update(research_id, patch, Some(owner_uid)).await?;

        Ok(SubmitAnswerOutcome {
            research,
            next_question: reply.next_question,
            final_prompt: reply.final_prompt,
        })
    }

    /// Assemble the Q/A view for resuming a session at `current_index`.
    pub async fn hydrate(
        &self,
        research_id: Uuid,
        owner_uid: &str,
        current_index: u32,
    ) -> DomainResult<RefinementView> {
        let research = self
            .repo
            .get_by_id(research_id, Some(owner_uid))
            .await?
            .ok_or(DomainError::ResearchNotFound(research_id))?;

        Ok(RefinementView {
            research_id: research.id,
            status: research.status,
            current_question: research.primary.question_at(current_index).cloned(),
            questions: research.primary.questions,
            answers: research.primary.answers,
            final_prompt: research.primary.final_prompt,
        })
    }
}
