//! Run scheduler: admits runs, fans out to both providers, and supervises
//! their settlement.
//!
//! `schedule_run` returns to its caller as soon as the record has flipped
//! to running; the provider executions continue as detached tasks with
//! their own logging error boundaries. Each execution persists its own
//! settlement the moment it settles, so a slow provider never blocks
//! visibility of the fast one's result. The terminal status is recomputed
//! by the repository inside the transaction that writes the last
//! outstanding settlement.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Config, ProviderKind, ProviderOutcome, ProviderResult, Research, ResearchPatch, ResearchStatus,
};
use crate::domain::ports::{
    ProviderError, ReportFinalizer, ReportRequest, ResearchProvider, ResearchRepository, RunPoll,
};
use crate::infrastructure::rate_limit::{DistributedRateLimiter, LocalRateLimiter};
use crate::infrastructure::retry::RetryPolicy;

/// Result of a scheduling call.
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    pub research: Research,
    pub already_running: bool,
}

/// Polling cadence for one provider's run.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self { interval: Duration::from_secs(5), max_polls: 360 }
    }
}

/// Scheduler knobs derived from configuration.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Admission bound for the quota-constrained (primary) provider
    pub limit_per_minute: u32,
    pub primary_poll: PollSettings,
    pub secondary_poll: PollSettings,
    /// Recipient recorded on finalized reports
    pub owner_email: String,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            limit_per_minute: config.rate_limit.limit_per_minute,
            primary_poll: PollSettings {
                interval: Duration::from_millis(config.providers.primary.poll_interval_ms),
                max_polls: config.providers.primary.max_polls,
            },
            secondary_poll: PollSettings {
                interval: Duration::from_millis(config.providers.secondary.poll_interval_ms),
                max_polls: config.providers.secondary.max_polls,
            },
            owner_email: config.report.owner_email.clone(),
        }
    }
}

/// Everything a detached execution task needs, cheaply cloneable.
#[derive(Clone)]
struct RunContext {
    repo: Arc<dyn ResearchRepository>,
    primary: Arc<dyn ResearchProvider>,
    secondary: Arc<dyn ResearchProvider>,
    finalizer: Arc<dyn ReportFinalizer>,
    retry_policy: RetryPolicy,
    local_limiter: Arc<LocalRateLimiter>,
    distributed_limiter: Arc<DistributedRateLimiter>,
    settings: SchedulerSettings,
}

impl RunContext {
    fn provider(&self, kind: ProviderKind) -> Arc<dyn ResearchProvider> {
        match kind {
            ProviderKind::Primary => self.primary.clone(),
            ProviderKind::Secondary => self.secondary.clone(),
        }
    }

    fn poll_settings(&self, kind: ProviderKind) -> PollSettings {
        match kind {
            ProviderKind::Primary => self.settings.primary_poll.clone(),
            ProviderKind::Secondary => self.settings.secondary_poll.clone(),
        }
    }
}

pub struct RunScheduler {
    ctx: RunContext,
}

impl RunScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn ResearchRepository>,
        primary: Arc<dyn ResearchProvider>,
        secondary: Arc<dyn ResearchProvider>,
        finalizer: Arc<dyn ReportFinalizer>,
        retry_policy: RetryPolicy,
        local_limiter: Arc<LocalRateLimiter>,
        distributed_limiter: Arc<DistributedRateLimiter>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            ctx: RunContext {
                repo,
                primary,
                secondary,
                finalizer,
                retry_policy,
                local_limiter,
                distributed_limiter,
                settings,
            },
        }
    }

    /// Admit a full run and launch both provider executions. Idempotent
    /// under client retries: a record already running reports
    /// `already_running` instead of erroring.
    pub async fn schedule_run(
        &self,
        research_id: Uuid,
        owner_uid: &str,
    ) -> DomainResult<ScheduleOutcome> {
        let admission = self.ctx.repo.begin_run(research_id, owner_uid).await?;
        if admission.already_running {
            debug!(%research_id, "run already in flight");
            return Ok(ScheduleOutcome { research: admission.research, already_running: true });
        }

        info!(%research_id, "run admitted, launching provider executions");
        let handles = vec![
            spawn_provider_execution(self.ctx.clone(), &admission.research, ProviderKind::Primary),
            spawn_provider_execution(
                self.ctx.clone(),
                &admission.research,
                ProviderKind::Secondary,
            ),
        ];
        supervise(research_id, handles);

        Ok(ScheduleOutcome { research: admission.research, already_running: false })
    }

    /// Re-run a single provider, leaving the other provider's last outcome
    /// untouched. A record (or provider) already running reports
    /// `already_running`.
    pub async fn retry_provider(
        &self,
        kind: ProviderKind,
        research_id: Uuid,
        owner_uid: &str,
    ) -> DomainResult<ScheduleOutcome> {
        let admission = self
            .ctx
            .repo
            .begin_provider_retry(kind, research_id, owner_uid)
            .await?;
        if admission.already_running {
            debug!(%research_id, provider = kind.as_str(), "retry refused, execution in flight");
            return Ok(ScheduleOutcome { research: admission.research, already_running: true });
        }

        info!(%research_id, provider = kind.as_str(), "provider retry admitted");
        let handle = spawn_provider_execution(self.ctx.clone(), &admission.research, kind);
        supervise(research_id, vec![handle]);

        Ok(ScheduleOutcome { research: admission.research, already_running: false })
    }
}

/// Detach a supervisor over the execution tasks. Its only job is the outer
/// error boundary: a panicking execution task must be logged, never allowed
/// to surface into the request path that already returned.
fn supervise(research_id: Uuid, handles: Vec<tokio::task::JoinHandle<()>>) {
    tokio::spawn(async move {
        for result in futures::future::join_all(handles).await {
            if let Err(err) = result {
                error!(%research_id, error = %err, "provider execution task aborted");
            }
        }
    });
}

/// Detach one provider execution. The task owns its whole lifecycle:
/// execute, settle, and trigger report finalization when it closes the run.
/// Nothing escapes it except log lines.
fn spawn_provider_execution(
    ctx: RunContext,
    research: &Research,
    kind: ProviderKind,
) -> tokio::task::JoinHandle<()> {
    let research_id = research.id;
    let prompt = research.primary.final_prompt.clone().unwrap_or_default();
    let session_id = match kind {
        ProviderKind::Primary => research.primary.session_id.clone(),
        ProviderKind::Secondary => None,
    };
    let started_at = research.provider(kind).started_at.unwrap_or_else(Utc::now);

    tokio::spawn(async move {
        let outcome =
            match execute_provider(&ctx, kind, session_id.as_deref(), &prompt).await {
                Ok(result) => ProviderOutcome::Success(result),
                Err(err) => {
                    warn!(
                        %research_id,
                        provider = kind.as_str(),
                        error = %err,
                        "provider execution failed"
                    );
                    ProviderOutcome::Failure(err.to_string())
                }
            };

        settle(&ctx, research_id, kind, started_at, outcome).await;
    })
}

/// Run one provider to completion: admission control (primary only), the
/// retried start call, then the poll loop.
async fn execute_provider(
    ctx: &RunContext,
    kind: ProviderKind,
    session_id: Option<&str>,
    prompt: &str,
) -> Result<ProviderResult, ProviderError> {
    let provider = ctx.provider(kind);
    let poll = ctx.poll_settings(kind);
    let rate_limited = kind == ProviderKind::Primary;
    let limit = ctx.settings.limit_per_minute;

    let handle = ctx
        .retry_policy
        .execute_with(
            || {
                let provider = provider.clone();
                async move {
                    if rate_limited {
                        // Every attempt is a fresh call against the scarce
                        // upstream, so every attempt takes a slot.
                        ctx.local_limiter.acquire().await;
                        ctx.distributed_limiter
                            .acquire_slot(limit)
                            .await
                            .map_err(admission_failure)?;
                    }
                    provider.execute_run(session_id, prompt).await
                }
            },
            ProviderError::is_transient,
        )
        .await?;

    debug!(provider = provider.name(), job_id = %handle.job_id, "run started, polling");

    let mut polls = 0;
    loop {
        if polls >= poll.max_polls {
            return Err(ProviderError::Timeout);
        }
        polls += 1;
        sleep(poll.interval).await;

        let status = ctx
            .retry_policy
            .execute_with(
                || provider.poll_result(&handle.job_id),
                ProviderError::is_transient,
            )
            .await?;

        match status {
            RunPoll::Pending => {}
            RunPoll::Completed(result) => return Ok(result),
            RunPoll::Failed(message) => return Err(ProviderError::JobFailed(message)),
        }
    }
}

/// Admission exhaustion will not clear within a retry budget; make it
/// short-circuit the retry layer.
fn admission_failure(err: DomainError) -> ProviderError {
    ProviderError::NonRetryable(format!("admission control: {err}"))
}

/// Persist one settlement. Persistence failure is the only error allowed
/// out of the execution path, and it is absorbed here: best-effort fallback
/// write, then log.
async fn settle(
    ctx: &RunContext,
    research_id: Uuid,
    kind: ProviderKind,
    started_at: DateTime<Utc>,
    outcome: ProviderOutcome,
) {
    match ctx.repo.settle_provider(research_id, kind, started_at, outcome).await {
        Ok(settlement) if settlement.stale => {
            warn!(
                %research_id,
                provider = kind.as_str(),
                "settlement superseded by a newer run, discarded"
            );
        }
        Ok(settlement) => {
            info!(
                %research_id,
                provider = kind.as_str(),
                status = settlement.research.provider(kind).status.as_str(),
                "provider settled"
            );
            if settlement.run_finished {
                info!(
                    %research_id,
                    status = settlement.research.status.as_str(),
                    "run finished"
                );
                if settlement.research.status == ResearchStatus::Completed {
                    spawn_report_finalization(ctx.clone(), settlement.research);
                }
            }
        }
        Err(err) => {
            error!(
                %research_id,
                provider = kind.as_str(),
                error = %err,
                "failed to persist provider outcome"
            );
            let reason = format!("failed to persist provider outcome: {err}");
            if let Err(fallback_err) = ctx.repo.mark_run_failed(research_id, &reason).await {
                error!(
                    %research_id,
                    error = %fallback_err,
                    "best-effort failure write also failed"
                );
            }
        }
    }
}

/// Fire-and-forget report finalization. Failure is logged, never reverts
/// the research status.
fn spawn_report_finalization(ctx: RunContext, research: Research) {
    tokio::spawn(async move {
        let request = ReportRequest {
            research_id: research.id,
            title: research.title.clone(),
            created_at: research.created_at,
            owner_email: ctx.settings.owner_email.clone(),
            primary_result: research.primary.result.clone(),
            secondary_result: research.secondary.result.clone(),
        };

        match ctx.finalizer.finalize(request).await {
            Ok(receipt) => {
                info!(research_id = %research.id, "report finalized");
                let patch = ResearchPatch {
                    report: Some(serde_json::json!({
                        "finalized_at": Utc::now().to_rfc3339(),
                        "storage_path": receipt.storage_path,
                        "email_status": receipt.email_status,
                    })),
                    ..Default::default()
                };
                if let Err(err) = ctx.repo.update(research.id, patch, None).await {
                    warn!(
                        research_id = %research.id,
                        error = %err,
                        "failed to record report receipt"
                    );
                }
            }
            Err(err) => {
                warn!(research_id = %research.id, error = %err, "report finalization failed");
            }
        }
    });
}
