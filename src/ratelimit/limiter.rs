//! Core rate limiter implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::clock::{Clock, MonotonicClock};
use super::policy::RatePolicy;
use super::record::RateLimitRecord;
use super::subject::SubjectKey;
use crate::config::LimiterConfig;
use crate::error::{Result, WindowgateError};

/// Default cap on the number of subjects tracked at once.
///
/// When the cap is hit and no record has expired, the least recently seen
/// subject is evicted even if its window is still active. That subject
/// starts over with a full quota on its next call.
pub const DEFAULT_MAX_TRACKED_SUBJECTS: usize = 10_000;

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the call may proceed
    pub allowed: bool,
    /// Quota of the window the call was judged against
    pub limit: u32,
    /// Calls left in that window after this one
    pub remaining: u32,
    /// Time until the window ends and the quota refills
    pub reset_after: Duration,
}

impl Decision {
    fn from_record(allowed: bool, record: &RateLimitRecord, now: u64) -> Self {
        Self {
            allowed,
            limit: record.policy().max_calls(),
            remaining: record.remaining(),
            reset_after: record.duration_until_reset(now),
        }
    }
}

/// Per-subject fixed-window rate limiter.
///
/// All state lives behind a single mutex, so `check`, `remaining_calls` and
/// `cleanup` are mutually exclusive and each runs its read-check-mutate
/// sequence atomically. None of them block or await while holding the lock.
///
/// Share it across request handlers with an `Arc`.
pub struct RateLimiter {
    /// Window records indexed by subject
    records: Mutex<HashMap<SubjectKey, RateLimitRecord>>,
    clock: Arc<dyn Clock>,
    /// Policy used by `check_default`
    default_policy: RatePolicy,
    /// Upper bound on tracked subjects, 0 for unbounded
    max_tracked_subjects: usize,
}

impl RateLimiter {
    /// Create a new rate limiter with default settings.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    /// Create a rate limiter reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
            default_policy: RatePolicy::default(),
            max_tracked_subjects: DEFAULT_MAX_TRACKED_SUBJECTS,
        }
    }

    /// Build a limiter from configuration.
    pub fn from_config(config: &LimiterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let policy = RatePolicy::new(config.default_max_calls, config.default_window_ms)
            .map_err(|e| WindowgateError::Config(e.to_string()))?;
        Ok(Self::with_clock(clock)
            .with_default_policy(policy)
            .with_max_tracked_subjects(config.max_tracked_subjects))
    }

    pub fn with_default_policy(mut self, policy: RatePolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Set the tracked subject cap. `0` disables it.
    ///
    /// Eviction forgets a subject's count, so an evicted subject with an
    /// active window gets a fresh quota. Size the cap above the number of
    /// subjects expected to be active within one window.
    pub fn with_max_tracked_subjects(mut self, max: usize) -> Self {
        self.max_tracked_subjects = max;
        self
    }

    pub fn default_policy(&self) -> RatePolicy {
        self.default_policy
    }

    /// Check whether `subject` may make another call under `policy`, counting
    /// the call if it may.
    pub fn check(&self, subject: &str, policy: RatePolicy) -> Result<bool> {
        self.check_detailed(subject, policy).map(|d| d.allowed)
    }

    /// Same as [`check`](Self::check) using the default policy.
    pub fn check_default(&self, subject: &str) -> Result<bool> {
        self.check(subject, self.default_policy)
    }

    /// Check and count a call, returning the full decision.
    ///
    /// The first call of a window always opens it and is allowed. Within an
    /// active window the policy pinned at its start applies; `policy` only
    /// takes effect when the next window opens.
    pub fn check_detailed(&self, subject: &str, policy: RatePolicy) -> Result<Decision> {
        let key = SubjectKey::new(subject)?;

        let mut records = self.records.lock();
        let now = self.clock.now_millis();

        trace!(
            subject = %key,
            max_calls = policy.max_calls(),
            window_ms = policy.window_ms(),
            "Checking rate limit"
        );

        if let Some(record) = records.get_mut(key.as_str()) {
            if !record.is_expired(now) {
                let allowed = record.try_acquire(now);
                if !allowed {
                    debug!(
                        subject = %key,
                        count = record.count(),
                        reset_after_ms = record.duration_until_reset(now).as_millis() as u64,
                        "Rate limit exceeded"
                    );
                }
                return Ok(Decision::from_record(allowed, record, now));
            }
        }

        if !records.contains_key(key.as_str()) {
            self.make_room(&mut records, now);
        }

        let record = RateLimitRecord::start(policy, now);
        debug!(
            subject = %key,
            max_calls = policy.max_calls(),
            reset_time = record.reset_time(),
            "Starting new rate limit window"
        );
        let decision = Decision::from_record(true, &record, now);
        records.insert(key, record);

        Ok(decision)
    }

    /// Calls `subject` could still make right now.
    ///
    /// With no active window this is `max_calls`, since the next check opens
    /// a fresh one. With an active window it is what is left of the pinned
    /// quota. Read-only.
    pub fn remaining_calls(&self, subject: &str, max_calls: u32) -> Result<u32> {
        let key = SubjectKey::new(subject)?;
        if max_calls == 0 {
            return Err(WindowgateError::InvalidArgument(
                "max_calls must be greater than zero".to_string(),
            ));
        }

        let records = self.records.lock();
        let now = self.clock.now_millis();

        let remaining = match records.get(key.as_str()) {
            Some(record) if !record.is_expired(now) => record.remaining(),
            _ => max_calls,
        };
        Ok(remaining)
    }

    /// Drop every record whose window has ended.
    ///
    /// Returns how many records were removed. Safe to call at any time;
    /// active windows are left exactly as they were.
    pub fn cleanup(&self) -> usize {
        let mut records = self.records.lock();
        let now = self.clock.now_millis();

        let before = records.len();
        records.retain(|_, record| !record.is_expired(now));
        let removed = before - records.len();

        if removed > 0 {
            debug!(
                removed_entries = removed,
                remaining_entries = records.len(),
                "Rate limiter cleanup completed"
            );
        }
        removed
    }

    /// Ensure there is space for one more subject under the cap.
    ///
    /// Expired records go first. If the map is still full, the record seen
    /// least recently is evicted.
    fn make_room(&self, records: &mut HashMap<SubjectKey, RateLimitRecord>, now: u64) {
        if self.max_tracked_subjects == 0 || records.len() < self.max_tracked_subjects {
            return;
        }

        records.retain(|_, record| !record.is_expired(now));
        if records.len() < self.max_tracked_subjects {
            return;
        }

        let victim = records
            .iter()
            .min_by_key(|(_, record)| record.last_seen())
            .map(|(key, _)| key.clone());

        if let Some(victim) = victim {
            records.remove(&victim);
            warn!(
                evicted = %victim,
                max_tracked_subjects = self.max_tracked_subjects,
                "Tracked subject cap reached, evicted least recently seen subject"
            );
        }
    }

    /// Count of calls in the subject's active window.
    ///
    /// Returns `None` if the subject has no active window.
    pub fn current_count(&self, subject: &str) -> Option<u32> {
        self.snapshot(subject).map(|r| r.count())
    }

    /// Time until the subject's active window ends.
    pub fn time_until_reset(&self, subject: &str) -> Option<Duration> {
        let records = self.records.lock();
        let now = self.clock.now_millis();
        records
            .get(subject)
            .filter(|r| !r.is_expired(now))
            .map(|r| r.duration_until_reset(now))
    }

    /// Copy of the subject's record if its window is still active.
    pub fn snapshot(&self, subject: &str) -> Option<RateLimitRecord> {
        let records = self.records.lock();
        let now = self.clock.now_millis();
        records.get(subject).filter(|r| !r.is_expired(now)).copied()
    }

    /// Clear all records.
    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Get the number of tracked subjects, including expired ones not yet
    /// cleaned up.
    pub fn tracked_subjects(&self) -> usize {
        self.records.lock().len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("tracked_subjects", &self.tracked_subjects())
            .field("default_policy", &self.default_policy)
            .field("max_tracked_subjects", &self.max_tracked_subjects)
            .finish()
    }
}
