//! Periodic cleanup of expired rate limit records.
//!
//! The limiter never sweeps on its own schedule. The host starts a
//! [`CleanupTask`] when it brings the limiter up and stops it at shutdown;
//! dropping the handle aborts the task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::limiter::RateLimiter;
use crate::error::{Result, WindowgateError};

/// Reference cleanup interval (5 minutes).
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Handle to a running cleanup task.
#[derive(Debug)]
pub struct CleanupTask {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl CleanupTask {
    /// Spawn a task calling [`RateLimiter::cleanup`] every `interval`.
    ///
    /// The first sweep happens one interval after start. Must be called from
    /// within a Tokio runtime.
    pub fn start(limiter: Arc<RateLimiter>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(WindowgateError::InvalidArgument(
                "cleanup interval must be greater than zero".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            WindowgateError::Runtime(format!("cleanup task needs a Tokio runtime: {}", e))
        })?;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        info!(
            interval_ms = interval.as_millis() as u64,
            "Starting rate limiter cleanup task"
        );

        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.cleanup();
                        trace!(removed, "Cleanup sweep finished");
                    }
                    _ = &mut shutdown_rx => {
                        debug!("Cleanup task received shutdown");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the task is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the task and wait for it to exit.
    ///
    /// A sweep already in progress completes first. Records left unswept are
    /// simply dropped with the limiter.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Cleanup task ended abnormally");
            }
        }
        info!("Rate limiter cleanup task stopped");
    }
}

impl Drop for CleanupTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl RateLimiter {
    /// Start a background cleanup task for this limiter.
    ///
    /// The task holds a reference to the limiter until it is stopped.
    pub fn start_cleanup(self: &Arc<Self>, interval: Duration) -> Result<CleanupTask> {
        CleanupTask::start(Arc::clone(self), interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::policy::RatePolicy;

    fn limiter_with_clock() -> (Arc<RateLimiter>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        (Arc::new(RateLimiter::with_clock(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_cleanup_task_sweeps_expired_records() {
        let (limiter, clock) = limiter_with_clock();
        let policy = RatePolicy::new(5, 1000).unwrap();

        limiter.check("u1", policy).unwrap();
        limiter.check("u2", policy).unwrap();
        assert_eq!(limiter.tracked_subjects(), 2);

        let task = limiter.start_cleanup(Duration::from_millis(10)).unwrap();
        assert!(task.is_running());
        assert_eq!(task.interval(), Duration::from_millis(10));

        clock.advance(Duration::from_millis(2000));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(limiter.tracked_subjects(), 0);
        task.stop().await;
    }

    #[tokio::test]
    async fn test_cleanup_task_leaves_active_records() {
        let (limiter, _clock) = limiter_with_clock();
        let policy = RatePolicy::new(5, 60_000).unwrap();
        limiter.check("u1", policy).unwrap();

        let task = limiter.start_cleanup(Duration::from_millis(10)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(limiter.current_count("u1"), Some(1));
        task.stop().await;
    }

    #[tokio::test]
    async fn test_stopped_task_no_longer_sweeps() {
        let (limiter, clock) = limiter_with_clock();
        let task = limiter.start_cleanup(Duration::from_millis(10)).unwrap();
        task.stop().await;

        limiter.check("u1", RatePolicy::new(1, 100).unwrap()).unwrap();
        clock.advance(Duration::from_millis(500));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(limiter.tracked_subjects(), 1);
    }

    #[tokio::test]
    async fn test_dropping_task_releases_limiter() {
        let (limiter, _clock) = limiter_with_clock();
        let task = limiter.start_cleanup(Duration::from_millis(10)).unwrap();
        assert_eq!(Arc::strong_count(&limiter), 2);

        drop(task);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(Arc::strong_count(&limiter), 1);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let (limiter, _clock) = limiter_with_clock();
        let result = limiter.start_cleanup(Duration::ZERO);
        assert!(matches!(result, Err(WindowgateError::InvalidArgument(_))));
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let (limiter, _clock) = limiter_with_clock();
        let result = limiter.start_cleanup(Duration::from_millis(10));
        assert!(matches!(result, Err(WindowgateError::Runtime(_))));
    }
}
