//! # Drain Pass
//!
//! Delivers queued operations to the remote side, one at a time, in queue
//! order.
//!
//! ## Features
//!
//! - **Single Pass**: A pass requested while another runs is a no-op
//! - **Snapshot Iteration**: The pass works on a snapshot; items queued
//!   mid-pass wait for the next one
//! - **Due-Only Passes**: [`SyncProcessor::drain_due`] leaves retry items
//!   alone until their backoff has elapsed
//! - **Lock-Free Dispatch**: No queue lock is held while a remote call is in
//!   flight
//! - **Per-Item Accounting**: Each attempt is persisted before moving on

use crate::offline::queue::{OfflineQueue, QueueItem, QueueStatus};
use crate::shared::clock::Clock;
use crate::shared::config::SyncConfig;
use crate::shared::error::SyncError;
use crate::sync::dispatcher::MutationDispatcher;
use crate::sync::network_monitor::NetworkMonitor;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Outcome of one drain pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// Items attempted in this pass
    pub attempted: usize,
    /// Ids delivered successfully
    pub succeeded: Vec<String>,
    /// Ids that failed but have retries left
    pub retrying: Vec<String>,
    /// Items that exhausted their retries and moved to the failed ledger
    pub failed: Vec<QueueItem>,
}

impl DrainReport {
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn retrying_count(&self) -> usize {
        self.retrying.len()
    }
}

/// Which queued items a pass attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    /// Every non-terminal item
    All,
    /// Pending items, and retry items whose backoff has elapsed
    Due,
}

/// Runs drain passes; at most one at a time
#[derive(Debug, Default)]
pub struct SyncProcessor {
    processing: AtomicBool,
}

/// Clears the processing flag when the pass ends, even if it is cancelled
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a pass is in flight
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Run one pass over every queued item
    ///
    /// Returns `None` without doing anything when a pass is already running,
    /// the queue is empty, or the connection is down. Storage failures while
    /// recording an attempt are logged; the in-memory queue stays
    /// authoritative and the next successful write persists it.
    pub async fn drain(
        &self,
        queue: &Mutex<OfflineQueue>,
        dispatcher: &dyn MutationDispatcher,
        network: &NetworkMonitor,
        clock: &dyn Clock,
        config: &SyncConfig,
    ) -> Option<DrainReport> {
        self.run(queue, dispatcher, network, clock, config, Selection::All)
            .await
    }

    /// Like [`SyncProcessor::drain`], skipping retry items still inside
    /// their backoff window
    ///
    /// `None` as well when nothing is due yet.
    pub async fn drain_due(
        &self,
        queue: &Mutex<OfflineQueue>,
        dispatcher: &dyn MutationDispatcher,
        network: &NetworkMonitor,
        clock: &dyn Clock,
        config: &SyncConfig,
    ) -> Option<DrainReport> {
        self.run(queue, dispatcher, network, clock, config, Selection::Due)
            .await
    }

    async fn run(
        &self,
        queue: &Mutex<OfflineQueue>,
        dispatcher: &dyn MutationDispatcher,
        network: &NetworkMonitor,
        clock: &dyn Clock,
        config: &SyncConfig,
        selection: Selection,
    ) -> Option<DrainReport> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("drain already in progress");
            return None;
        }
        let _guard = PassGuard(&self.processing);

        if !network.is_online() {
            tracing::debug!("offline, skipping drain");
            return None;
        }

        let snapshot = match selection {
            Selection::All => queue.lock().snapshot(),
            Selection::Due => queue.lock().due_snapshot(clock.now(), config),
        };
        if snapshot.is_empty() {
            return None;
        }

        tracing::info!(items = snapshot.len(), ?selection, "draining offline queue");
        let mut report = DrainReport {
            attempted: snapshot.len(),
            ..Default::default()
        };

        for item in snapshot {
            let outcome = match item.operation.decode() {
                Ok(operation) => dispatcher
                    .invoke(&operation)
                    .await
                    .map_err(|e| SyncError::transient(e.message)),
                Err(e) => Err(e),
            };

            let now = clock.now();
            let mut locked = queue.lock();
            match outcome {
                Ok(_) => {
                    if record(&mut locked, &item.id, |entry| entry.mark_completed(now)).is_none() {
                        tracing::debug!(id = %item.id, "item removed during the pass");
                        continue;
                    }
                    tracing::debug!(id = %item.id, kind = %item.operation.kind, "operation synced");
                    report.succeeded.push(item.id);
                }
                Err(error) => {
                    let message = error.to_string();
                    let status = record(&mut locked, &item.id, |entry| {
                        entry.mark_failed(message.clone(), now, config.max_retries);
                    });
                    tracing::warn!(
                        id = %item.id,
                        kind = %item.operation.kind,
                        error = %message,
                        "sync attempt failed"
                    );
                    match status {
                        Some(QueueStatus::Failed) => {}
                        Some(_) => report.retrying.push(item.id),
                        None => tracing::debug!(id = %item.id, "item removed during the pass"),
                    }
                }
            }
        }

        match queue.lock().cleanup() {
            Ok(cleanup) => report.failed = cleanup.failed,
            Err(e) => tracing::error!(error = %e, "failed to persist queue cleanup"),
        }

        tracing::info!(
            succeeded = report.succeeded_count(),
            retrying = report.retrying_count(),
            failed = report.failed_count(),
            "drain pass finished"
        );
        Some(report)
    }
}

/// Apply `f` to the item and persist, falling back to the in-memory status
/// when the write fails
fn record<F>(queue: &mut OfflineQueue, id: &str, f: F) -> Option<QueueStatus>
where
    F: FnOnce(&mut QueueItem),
{
    match queue.update(id, f) {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(id, error = %e, "failed to persist queue item");
            queue.get(id).map(|item| item.status)
        }
    }
}
