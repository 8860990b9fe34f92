//! Two-layer admission control for the quota-constrained provider: a cheap
//! in-process token bucket in front of the authoritative cross-process
//! sliding window.

pub mod distributed;
pub mod local;

pub use distributed::{DistributedRateLimiter, WINDOW};
pub use local::LocalRateLimiter;
