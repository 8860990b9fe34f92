//! Parallax - research lifecycle orchestrator.
//!
//! Parallax coordinates a multi-stage research workflow: a topic is
//! clarified through an iterative question/answer exchange with the primary
//! provider, then executed by two independent research providers in
//! parallel, and finally assembled into a report.
//!
//! # Architecture
//!
//! The crate follows a hexagonal layout:
//!
//! - **Domain** (`domain`): models, the status state machine, and the port
//!   traits collaborators implement
//! - **Adapters** (`adapters`): SQLite persistence, provider HTTP/mock
//!   adapters, report finalizers
//! - **Services** (`services`): the refinement coordinator and the run
//!   scheduler
//! - **Infrastructure** (`infrastructure`): configuration, retry policy,
//!   and the two-layer rate limiter
//! - **CLI** (`cli`): command-line surface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, ProviderKind, ProviderOutcome, ProviderResult, ProviderRunStatus, ProviderState,
    Research, ResearchPatch, ResearchStatus,
};
pub use domain::ports::{
    ProviderError, RateLimitStore, ReportFinalizer, ResearchProvider, ResearchRepository,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::rate_limit::{DistributedRateLimiter, LocalRateLimiter};
pub use infrastructure::retry::RetryPolicy;
pub use services::{RefinementCoordinator, ResearchService, RunScheduler};
