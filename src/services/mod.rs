//! Service layer: lifecycle orchestration.

pub mod refinement;
pub mod research;
pub mod run_scheduler;

pub use refinement::{RefinementCoordinator, RefinementView, SubmitAnswerOutcome};
pub use research::ResearchService;
pub use run_scheduler::{PollSettings, RunScheduler, ScheduleOutcome, SchedulerSettings};
