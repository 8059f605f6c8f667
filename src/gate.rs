//! Request-side wrapper around the rate limiter.
//!
//! Handlers that front an expensive subsystem (content moderation, for
//! instance) run each call through a [`CallGate`]. A denied call is turned
//! into [`WindowgateError::TooManyRequests`] and the action is never started.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::{Result, WindowgateError};
use crate::ratelimit::{Decision, RateLimiter, RatePolicy};

/// Throttles one kind of action per subject.
#[derive(Debug, Clone)]
pub struct CallGate {
    limiter: Arc<RateLimiter>,
    policy: RatePolicy,
}

impl CallGate {
    pub fn new(limiter: Arc<RateLimiter>, policy: RatePolicy) -> Self {
        Self { limiter, policy }
    }

    pub fn policy(&self) -> RatePolicy {
        self.policy
    }

    /// Count a call for `subject`, failing if it is over quota.
    pub fn admit(&self, subject: &str) -> Result<Decision> {
        let decision = self.limiter.check_detailed(subject, self.policy)?;
        if !decision.allowed {
            debug!(
                subject = %subject,
                retry_after_ms = decision.reset_after.as_millis() as u64,
                "Throttled call rejected"
            );
            return Err(WindowgateError::TooManyRequests {
                subject: subject.to_string(),
                retry_after: decision.reset_after,
            });
        }
        Ok(decision)
    }

    /// Run `action` if `subject` still has quota.
    ///
    /// The future is only awaited after the call has been counted; on denial
    /// it is dropped without being polled.
    #[instrument(skip(self, action), fields(max_calls = self.policy.max_calls()))]
    pub async fn run<F, T>(&self, subject: &str, action: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        self.admit(subject)?;
        Ok(action.await)
    }

    /// Calls `subject` has left under this gate's policy.
    pub fn peek(&self, subject: &str) -> Result<u32> {
        self.limiter.remaining_calls(subject, self.policy.max_calls())
    }
}
