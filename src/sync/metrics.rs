//! # Sync Metrics
//!
//! Counters describing drain passes and optimistic overlay health.
//!
//! ## Features
//!
//! - **Pass Metrics**: Passes run, items delivered, retried and given up on
//! - **Timing**: Duration of the last pass and a rolling average
//! - **Overlay Health**: Optimistic updates dropped because they no longer applied

use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncMetrics {
    pub passes: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub failed_permanently: u64,
    pub dropped_optimistic: u64,
    pub average_pass_duration: Duration,
    pub last_pass_duration: Option<Duration>,
    pub last_pass_at: Option<DateTime<Utc>>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pass(
        &mut self,
        succeeded: usize,
        retried: usize,
        failed: usize,
        duration: Duration,
        at: DateTime<Utc>,
    ) {
        self.passes += 1;
        self.succeeded += succeeded as u64;
        self.retried += retried as u64;
        self.failed_permanently += failed as u64;
        self.last_pass_duration = Some(duration);
        self.last_pass_at = Some(at);

        // Update rolling average
        let passes = u32::try_from(self.passes).unwrap_or(u32::MAX);
        let total = self.average_pass_duration * (passes - 1) + duration;
        self.average_pass_duration = total / passes;
    }

    pub fn record_dropped_optimistic(&mut self, count: u64) {
        self.dropped_optimistic += count;
    }

    /// Share of attempted items that were delivered
    pub fn success_rate(&self) -> f64 {
        let attempted = self.succeeded + self.retried + self.failed_permanently;
        if attempted == 0 {
            0.0
        } else {
            self.succeeded as f64 / attempted as f64
        }
    }
}
