//! Per-subject window record.

use std::time::Duration;

use super::policy::RatePolicy;

/// Tracks calls for one subject within its current fixed window.
///
/// The policy the window was opened with is pinned in the record, so a
/// caller changing `max_calls` mid-window cannot widen or shrink the quota
/// until the next window starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    /// Calls allowed so far in this window
    count: u32,
    /// Absolute time (ms) at which the window ends
    reset_time: u64,
    /// Policy in force for this window
    policy: RatePolicy,
    /// Last time (ms) the subject touched the limiter, allowed or not
    last_seen: u64,
}

impl RateLimitRecord {
    /// Open a new window at `now`, counting the call that opened it.
    pub fn start(policy: RatePolicy, now: u64) -> Self {
        Self {
            count: 1,
            reset_time: now.saturating_add(policy.window_ms()),
            policy,
            last_seen: now,
        }
    }

    /// Whether the window has ended as of `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        self.reset_time <= now
    }

    /// Count a call against the window.
    ///
    /// Returns `true` if the call fits in the quota, `false` if it does not.
    /// A denied call leaves the count untouched.
    pub fn try_acquire(&mut self, now: u64) -> bool {
        self.last_seen = self.last_seen.max(now);
        if self.count >= self.policy.max_calls() {
            return false;
        }
        self.count += 1;
        true
    }

    /// Calls left in this window under the pinned policy.
    pub fn remaining(&self) -> u32 {
        self.policy.max_calls().saturating_sub(self.count)
    }

    /// Time left until the window ends.
    pub fn duration_until_reset(&self, now: u64) -> Duration {
        Duration::from_millis(self.reset_time.saturating_sub(now))
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset_time(&self) -> u64 {
        self.reset_time
    }

    pub fn policy(&self) -> RatePolicy {
        self.policy
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_calls: u32, window_ms: u64) -> RatePolicy {
        RatePolicy::new(max_calls, window_ms).unwrap()
    }

    #[test]
    fn test_record_start() {
        let record = RateLimitRecord::start(policy(3, 1000), 0);
        assert_eq!(record.count(), 1);
        assert_eq!(record.reset_time(), 1000);
        assert_eq!(record.remaining(), 2);
    }

    #[test]
    fn test_record_acquire_until_exhausted() {
        let mut record = RateLimitRecord::start(policy(3, 1000), 0);

        assert!(record.try_acquire(100));
        assert!(record.try_acquire(200));
        assert_eq!(record.count(), 3);

        // The 4th call is rejected and does not move the count
        assert!(!record.try_acquire(300));
        assert_eq!(record.count(), 3);
        assert_eq!(record.remaining(), 0);
        assert_eq!(record.last_seen(), 300);
    }

    #[test]
    fn test_record_expiry_boundary() {
        let record = RateLimitRecord::start(policy(1, 1000), 500);
        assert!(!record.is_expired(1499));
        assert!(record.is_expired(1500));
        assert!(record.is_expired(2000));
    }

    #[test]
    fn test_record_duration_until_reset() {
        let record = RateLimitRecord::start(policy(1, 1000), 0);
        assert_eq!(record.duration_until_reset(250), Duration::from_millis(750));
        assert_eq!(record.duration_until_reset(5000), Duration::ZERO);
    }

    #[test]
    fn test_record_reset_time_saturates() {
        let record = RateLimitRecord::start(policy(1, 1000), u64::MAX - 10);
        assert_eq!(record.reset_time(), u64::MAX);
    }
}
