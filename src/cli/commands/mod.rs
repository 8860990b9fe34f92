//! CLI command implementations.

pub mod init;
pub mod research;

use std::sync::Arc;

use crate::adapters::providers::ProviderRegistry;
use crate::adapters::report;
use crate::adapters::sqlite::{initialize_database, SqliteRateLimitStore, SqliteResearchRepository};
use crate::domain::models::{Config, ProviderKind};
use crate::domain::ports::ResearchRepository;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::rate_limit::{DistributedRateLimiter, LocalRateLimiter};
use crate::infrastructure::retry::RetryPolicy;
use crate::services::{RefinementCoordinator, ResearchService, RunScheduler, SchedulerSettings};

/// Wired application services, built once per command invocation.
pub struct App {
    pub config: Config,
    pub research: ResearchService,
    pub refinement: RefinementCoordinator,
    pub scheduler: RunScheduler,
    pub repo: Arc<dyn ResearchRepository>,
}

impl App {
    pub async fn init() -> anyhow::Result<Self> {
        let config = ConfigLoader::load()?;
        let pool = initialize_database(&format!("sqlite:{}", config.database.path)).await?;

        let repo: Arc<dyn ResearchRepository> =
            Arc::new(SqliteResearchRepository::new(pool.clone()));
        let registry = ProviderRegistry::new(config.providers.clone());
        let (primary, secondary) = registry.pair();
        let finalizer = report::from_config(&config.report);

        let retry_policy = RetryPolicy::from(&config.retry);
        let local_limiter = Arc::new(LocalRateLimiter::new(
            config.rate_limit.local_requests_per_second,
        ));
        let store = Arc::new(SqliteRateLimitStore::new(pool));
        let distributed_limiter = Arc::new(DistributedRateLimiter::from_config(
            store,
            ProviderKind::Primary.as_str(),
            &config.rate_limit,
        ));

        let research = ResearchService::new(repo.clone(), primary.clone(), retry_policy.clone());
        let refinement =
            RefinementCoordinator::new(repo.clone(), primary.clone(), retry_policy.clone());
        let scheduler = RunScheduler::new(
            repo.clone(),
            primary,
            secondary,
            finalizer,
            retry_policy,
            local_limiter,
            distributed_limiter,
            SchedulerSettings::from_config(&config),
        );

        Ok(Self { config, research, refinement, scheduler, repo })
    }
}
