//! Retention policy for terminal task records.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Terminal (FINISHED / FAILED) records whose `created_at` is older than
/// `window` are eligible for purging. Non-terminal records are never purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub window: Duration,
    /// How often a `RetentionLoop` sweeps.
    pub sweep_interval: Duration,
}

impl RetentionPolicy {
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
    pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

    pub fn new(window: Duration) -> Self {
        Self {
            window,
            sweep_interval: Self::DEFAULT_SWEEP_INTERVAL.min(window.max(Duration::from_secs(1))),
        }
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    /// Records created strictly before the cutoff are purged.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        TimeDelta::from_std(self.window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}
