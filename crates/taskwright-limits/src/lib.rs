//! Resource governance for a run: start-rate limiting, total-call
//! budgeting, and degraded-LLM recovery backoff scheduling.

pub mod budget;
pub mod rate_limiter;
pub mod recovery;

pub use budget::{Budget, TaskLimits};
pub use rate_limiter::RateLimiter;
pub use recovery::{RecoveryConfig, RecoveryController};
