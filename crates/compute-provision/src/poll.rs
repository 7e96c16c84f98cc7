//! Poll scheduling for asynchronous provider operations.

use std::time::{Duration, Instant};

use crate::config::ProvisionConfig;

/// Poll intervals and deadline for one wait.
///
/// The interval starts at `initial`, doubles after every poll and never
/// exceeds `max`. With `initial == max` the cadence is fixed.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    initial: Duration,
    max: Duration,
    timeout: Duration,
    next: Duration,
    started: Instant,
}

impl PollSchedule {
    /// Create a schedule starting now.
    #[must_use]
    pub fn new(initial: Duration, max: Duration, timeout: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            timeout,
            next: initial,
            started: Instant::now(),
        }
    }

    /// Schedule from the configured poll intervals and node timeout.
    #[must_use]
    pub fn from_config(config: &ProvisionConfig) -> Self {
        Self::new(
            config.poll_interval(),
            config.poll_max_interval(),
            Duration::from_secs(config.node_running_timeout_secs),
        )
    }

    /// Time since the schedule started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.elapsed() > self.timeout
    }

    /// Interval to wait before the next poll; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    /// Sleep for the next interval, clipped to the remaining time.
    ///
    /// Returns `false` without sleeping once the deadline has passed.
    pub async fn wait(&mut self) -> bool {
        if self.expired() {
            return false;
        }
        let remaining = self.timeout.saturating_sub(self.elapsed());
        let delay = self.next_delay().min(remaining);
        tokio::time::sleep(delay).await;
        true
    }

    /// Restart the interval sequence (keeps the deadline).
    pub fn reset_interval(&mut self) {
        self.next = self.initial;
    }
}
