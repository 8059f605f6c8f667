//! Rate limiting logic and state management.

mod clock;
mod limiter;
mod policy;
mod record;
mod subject;
mod sweeper;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use limiter::{Decision, RateLimiter, DEFAULT_MAX_TRACKED_SUBJECTS};
pub use policy::{
    PolicyRule, PolicyRules, RatePolicy, TimeUnit, DEFAULT_MAX_CALLS, DEFAULT_WINDOW_MS,
};
pub use record::RateLimitRecord;
pub use subject::SubjectKey;
pub use sweeper::{CleanupTask, DEFAULT_CLEANUP_INTERVAL};
