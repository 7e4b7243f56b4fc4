//! # Retry Scheduling
//!
//! Decides *when* the next drain pass runs; the pass itself lives in
//! `sync::processor`.
//!
//! ## Features
//!
//! - **Single Timer**: Scheduling a drain cancels the outstanding one, so
//!   passes never overlap because of the scheduler
//! - **Reconnect Stabilisation**: Coming back online waits a short delay
//!   before draining, in case the connection flaps
//! - **Offline Cancellation**: Going offline cancels the pending drain
//! - **Progressive Backoff**: Callers pass the delay chosen from the backoff
//!   table (`SyncConfig::backoff_for`)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cms_sync::offline::retry::RetryScheduler;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let scheduler = RetryScheduler::new(|| println!("drain now"));
//! scheduler.schedule(Duration::from_secs(3));
//! scheduler.schedule(Duration::from_secs(1)); // replaces the 3s timer
//! # }
//! ```

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Callback fired when a scheduled drain is due
pub type DrainCallback = Arc<dyn Fn() + Send + Sync>;

struct PendingDrain {
    handle: JoinHandle<()>,
    due: Instant,
}

/// Owner of the single pending drain timer
pub struct RetryScheduler {
    pending: Mutex<Option<PendingDrain>>,
    on_due: DrainCallback,
}

impl std::fmt::Debug for RetryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryScheduler")
            .field("next_due", &self.next_due())
            .finish()
    }
}

impl RetryScheduler {
    /// Create a scheduler that calls `on_due` whenever a timer fires
    pub fn new(on_due: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            pending: Mutex::new(None),
            on_due: Arc::new(on_due),
        }
    }

    /// Fire the callback after `delay`, replacing any outstanding timer
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, delay: Duration) {
        let on_due = Arc::clone(&self.on_due);
        let due = Instant::now() + delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(due).await;
            on_due();
        });

        let previous = self.pending.lock().replace(PendingDrain { handle, due });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
        tracing::debug!(delay_ms = delay.as_millis() as u64, "drain scheduled");
    }

    /// Like [`RetryScheduler::schedule`], but keeps an outstanding timer
    /// that fires sooner; returns whether a new timer was set
    pub fn schedule_earliest(&self, delay: Duration) -> bool {
        let now = Instant::now();
        if let Some(due) = self.next_due() {
            if due > now && due <= now + delay {
                return false;
            }
        }
        self.schedule(delay);
        true
    }

    /// Cancel the outstanding timer; returns whether one was still pending
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(pending) => {
                let was_pending = !pending.handle.is_finished();
                pending.handle.abort();
                if was_pending {
                    tracing::debug!("scheduled drain cancelled");
                }
                was_pending
            }
            None => false,
        }
    }

    /// Whether a timer is waiting to fire
    pub fn is_scheduled(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|pending| !pending.handle.is_finished())
    }

    /// When the outstanding timer fires
    pub fn next_due(&self) -> Option<Instant> {
        self.pending
            .lock()
            .as_ref()
            .filter(|pending| !pending.handle.is_finished())
            .map(|pending| pending.due)
    }

    /// Connection came back: drain after `stabilise` if anything is queued
    pub fn on_online(&self, queued: usize, stabilise: Duration) -> bool {
        if queued == 0 {
            return false;
        }
        self.schedule(stabilise);
        true
    }

    /// Connection dropped: nothing should run until it returns
    pub fn on_offline(&self) {
        self.cancel();
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.get_mut().take() {
            pending.handle.abort();
        }
    }
}
