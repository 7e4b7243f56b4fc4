//! # Sync Service
//!
//! Orchestrates offline writes: queue, optimistic overlays, connectivity and
//! drain passes.
//!
//! ## Architecture
//!
//! - **Offline Queue**: Durable list of deferred operations
//! - **Processor**: Runs drain passes against a [`MutationDispatcher`]
//! - **Scheduler**: Single timer deciding when the next pass runs
//! - **Network Monitor**: Connectivity source the worker listens to
//! - **Overlays**: One [`OptimisticManager`] per collection
//! - **Metrics**: Pass counters and timing
//!
//! ## Key Features
//!
//! - **Write While Offline**: Operations are persisted and shown optimistically
//! - **Reconnect Drain**: Coming back online drains after a short stabilisation
//! - **Progressive Backoff**: Failed attempts retry on a 1s / 3s / 10s schedule
//! - **Failed Ledger**: Items out of retries are kept for inspection or retry
//! - **Notices**: Broadcast of user-facing sync events
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cms_sync::shared::operation::{Collection, Operation, ProjectDraft};
//! use cms_sync::storage::MemoryStorage;
//! use cms_sync::sync::{NetworkMonitor, SyncService};
//! use cms_sync::SyncConfig;
//! # use cms_sync::sync::dispatcher::MutationDispatcher;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example(dispatcher: Arc<dyn MutationDispatcher>) -> cms_sync::Result<()> {
//! let network = NetworkMonitor::online();
//! let mut service = SyncService::new(
//!     SyncConfig::default(),
//!     Arc::new(MemoryStorage::new()),
//!     dispatcher,
//!     network.clone(),
//! );
//! service.start()?;
//!
//! service.queue_operation(Operation::CreateProject(ProjectDraft::named("Tower A")));
//! let projects = service.view(Collection::Projects, &json!([]));
//! println!("{} projects shown", projects.as_array().map_or(0, Vec::len));
//!
//! let stats = service.stats();
//! println!("{} pending", stats.pending);
//! # Ok(())
//! # }
//! ```

pub mod dispatcher;
pub mod metrics;
pub mod network_monitor;
pub mod processor;

pub use dispatcher::{FnDispatcher, MutationDispatcher, RemoteError};
pub use metrics::SyncMetrics;
pub use network_monitor::{NetworkMonitor, NetworkStatus};
pub use processor::{DrainReport, SyncProcessor};

use crate::offline::optimistic::{FoldOp, OptimisticManager};
use crate::offline::queue::{OfflineQueue, QueueItem, QueueStats};
use crate::offline::retry::RetryScheduler;
use crate::shared::clock::{Clock, SystemClock};
use crate::shared::config::SyncConfig;
use crate::shared::error::{Result, SyncError};
use crate::shared::event::SyncNotice;
use crate::shared::operation::{Collection, Operation, OperationEnvelope};
use crate::storage::LocalStorage;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

const NOTICE_CAPACITY: usize = 64;

/// Commands handled by the background worker
///
/// Commands that pile up while a pass runs are merged into one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncCommand {
    /// Attempt every queued item (scheduled retries, reconnects)
    Drain,
    /// Attempt new items, and retry items whose backoff has elapsed
    DrainDue,
}

/// Optimistic state keyed by collection
#[derive(Debug, Default)]
struct Overlays {
    /// One manager per collection
    managers: HashMap<Collection, OptimisticManager>,
    /// Collection owning each queue item's overlay
    owners: HashMap<String, Collection>,
}

/// State shared between the service handle and its worker
struct SyncShared {
    config: SyncConfig,
    queue: Mutex<OfflineQueue>,
    overlays: Mutex<Overlays>,
    processor: SyncProcessor,
    scheduler: RetryScheduler,
    dispatcher: Arc<dyn MutationDispatcher>,
    network: NetworkMonitor,
    clock: Arc<dyn Clock>,
    notices: broadcast::Sender<SyncNotice>,
    metrics: Mutex<SyncMetrics>,
    commands: mpsc::UnboundedSender<SyncCommand>,
}

/// Main sync service coordinator
pub struct SyncService {
    /// State shared with the background worker
    shared: Arc<SyncShared>,
    /// Receiver handed to the worker on `start`
    command_rx: Option<mpsc::UnboundedReceiver<SyncCommand>>,
    /// Background worker handle
    background_task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("queue", &*self.shared.queue.lock())
            .field("network", &self.shared.network.status())
            .field("running", &self.is_running())
            .finish()
    }
}

impl SyncService {
    /// Create a service over `storage`, restoring any persisted queue
    pub fn new(
        config: SyncConfig,
        storage: Arc<dyn LocalStorage>,
        dispatcher: Arc<dyn MutationDispatcher>,
        network: NetworkMonitor,
    ) -> Self {
        Self::with_clock(config, storage, dispatcher, network, Arc::new(SystemClock))
    }

    /// Like [`SyncService::new`] with an explicit time source
    pub fn with_clock(
        config: SyncConfig,
        storage: Arc<dyn LocalStorage>,
        dispatcher: Arc<dyn MutationDispatcher>,
        network: NetworkMonitor,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let queue = OfflineQueue::load(storage, &config);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        let drain_trigger = commands.clone();
        let scheduler = RetryScheduler::new(move || {
            let _ = drain_trigger.send(SyncCommand::Drain);
        });

        let shared = SyncShared {
            overlays: Mutex::new(Overlays::default()),
            queue: Mutex::new(queue),
            processor: SyncProcessor::new(),
            scheduler,
            dispatcher,
            network,
            clock,
            notices,
            metrics: Mutex::new(SyncMetrics::new()),
            commands,
            config,
        };
        shared.restore_overlays();

        Self {
            shared: Arc::new(shared),
            command_rx: Some(command_rx),
            background_task: None,
        }
    }

    /// Start the background worker
    ///
    /// The worker runs at most once per service; a second call, even after
    /// [`SyncService::stop`], returns `AlreadyRunning`. Must be called from
    /// within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        let Some(command_rx) = self.command_rx.take() else {
            return Err(SyncError::AlreadyRunning);
        };

        let shared = Arc::clone(&self.shared);
        let network = shared.network.subscribe();
        let handle = tokio::spawn(async move {
            run_worker(shared, command_rx, network).await;
        });
        self.background_task = Some(handle);

        // Items left over from a previous session
        let queued = self.shared.queue.lock().len();
        if self.shared.network.is_online() {
            self.shared
                .scheduler
                .on_online(queued, self.shared.config.reconnect_delay);
        }

        tracing::info!(queued, "sync service started");
        Ok(())
    }

    /// Stop the background worker and any pending drain
    pub async fn stop(&mut self) {
        self.shared.scheduler.cancel();
        if let Some(handle) = self.background_task.take() {
            handle.abort();
            let _ = handle.await;
            tracing::info!("sync service stopped");
        }
    }

    /// Whether the background worker is running
    pub fn is_running(&self) -> bool {
        self.background_task
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Queue a typed operation and show it optimistically
    ///
    /// Returns the queue item id, or `None` if the operation could not be
    /// queued (the failure is logged).
    pub fn queue_operation(&self, operation: Operation) -> Option<String> {
        let envelope = match operation.to_envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(kind = %operation.kind(), error = %e, "operation could not be encoded");
                return None;
            }
        };
        let id = self.shared.enqueue(envelope)?;
        self.shared.apply_overlay(&id, &operation);
        self.shared.after_enqueue();
        Some(id)
    }

    /// Queue a raw `{ type, data }` operation
    ///
    /// The envelope must carry a known type; its payload is checked when it
    /// is delivered.
    pub fn queue_envelope(&self, envelope: OperationEnvelope) -> Option<String> {
        let decoded = envelope.decode().ok();
        let id = self.shared.enqueue(envelope)?;
        if let Some(operation) = decoded {
            self.shared.apply_overlay(&id, &operation);
        }
        self.shared.after_enqueue();
        Some(id)
    }

    /// Run a drain pass now
    ///
    /// `None` when a pass is already running, the queue is empty, or the
    /// connection is down.
    pub async fn process_queue(&self) -> Option<DrainReport> {
        self.shared.process_queue().await
    }

    /// User-initiated sync
    pub async fn manual_sync(&self) -> Result<Option<DrainReport>> {
        if !self.shared.network.is_online() {
            return Err(SyncError::NoConnection);
        }
        Ok(self.shared.process_queue().await)
    }

    /// Discard every queued and failed item, reverting their overlays
    pub fn clear_queue(&self) -> Result<usize> {
        self.shared.scheduler.cancel();
        let removed = self.shared.queue.lock().clear()?;
        let mut overlays = self.shared.overlays.lock();
        for id in &removed {
            overlays.rollback(id);
        }
        tracing::info!(removed = removed.len(), "offline queue cleared");
        Ok(removed.len())
    }

    /// Give every failed item a fresh retry budget
    pub fn retry_failed(&self) -> Result<usize> {
        let ids = self.shared.queue.lock().retry_failed()?;
        if ids.is_empty() {
            return Ok(0);
        }

        let items: Vec<QueueItem> = {
            let queue = self.shared.queue.lock();
            ids.iter().filter_map(|id| queue.get(id).cloned()).collect()
        };
        for item in &items {
            if let Ok(operation) = item.operation.decode() {
                self.shared.apply_overlay(&item.id, &operation);
            }
        }

        tracing::info!(count = ids.len(), "failed items requeued");
        self.shared.after_enqueue();
        Ok(ids.len())
    }

    /// Queue counts
    pub fn stats(&self) -> QueueStats {
        self.shared.queue.lock().stats()
    }

    /// Active queue items in order
    pub fn items(&self) -> Vec<QueueItem> {
        self.shared.queue.lock().items().to_vec()
    }

    /// Items that exhausted their retries
    pub fn failed_items(&self) -> Vec<QueueItem> {
        self.shared.queue.lock().failed_items().to_vec()
    }

    /// `base` with this collection's pending writes folded in
    pub fn view(&self, collection: Collection, base: &Value) -> Value {
        let mut overlays = self.shared.overlays.lock();
        match overlays.managers.get_mut(&collection) {
            Some(manager) => {
                let before = manager.dropped_count();
                let view = manager.apply_optimistic_updates(base);
                let dropped = manager.dropped_count() - before;
                if dropped > 0 {
                    self.shared.metrics.lock().record_dropped_optimistic(dropped);
                }
                view
            }
            None => base.clone(),
        }
    }

    /// Pending optimistic writes for a collection
    pub fn pending_overlays(&self, collection: Collection) -> usize {
        self.shared
            .overlays
            .lock()
            .managers
            .get(&collection)
            .map_or(0, OptimisticManager::count_pending)
    }

    /// Subscribe to user-facing notices
    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotice> {
        self.shared.notices.subscribe()
    }

    /// Connectivity source
    pub fn network(&self) -> &NetworkMonitor {
        &self.shared.network
    }

    /// Snapshot of pass metrics
    pub fn metrics(&self) -> SyncMetrics {
        self.shared.metrics.lock().clone()
    }

    /// Whether a drain is waiting on the scheduler
    pub fn is_drain_scheduled(&self) -> bool {
        self.shared.scheduler.is_scheduled()
    }

    /// Whether a drain pass is in flight
    pub fn is_processing(&self) -> bool {
        self.shared.processor.is_processing()
    }

    /// Active configuration
    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        self.shared.scheduler.cancel();
        if let Some(handle) = self.background_task.take() {
            handle.abort();
        }
    }
}

impl Overlays {
    fn rollback(&mut self, id: &str) {
        if let Some(collection) = self.owners.remove(id) {
            if let Some(manager) = self.managers.get_mut(&collection) {
                manager.rollback_optimistic(id);
            }
        }
    }

    fn confirm(&mut self, id: &str) {
        if let Some(collection) = self.owners.remove(id) {
            if let Some(manager) = self.managers.get_mut(&collection) {
                manager.confirm_optimistic(id);
            }
        }
    }
}

impl SyncShared {
    fn enqueue(&self, envelope: OperationEnvelope) -> Option<String> {
        let now = self.clock.now();
        match self.queue.lock().enqueue(envelope, now) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(error = %e, "operation not queued");
                None
            }
        }
    }

    fn apply_overlay(&self, id: &str, operation: &Operation) {
        let Some(fold) = FoldOp::for_operation(operation, id, &self.config.record_id_field) else {
            return;
        };
        let collection = operation.collection();
        let mut overlays = self.overlays.lock();
        overlays
            .managers
            .entry(collection)
            .or_insert_with(|| OptimisticManager::new(self.config.record_id_field.clone()))
            .apply_optimistic(id, fold);
        overlays.owners.insert(id.to_string(), collection);
    }

    /// Rebuild overlays for items persisted by a previous session
    fn restore_overlays(&self) {
        let items = self.queue.lock().snapshot();
        for item in items {
            if let Ok(operation) = item.operation.decode() {
                self.apply_overlay(&item.id, &operation);
            }
        }
    }

    fn after_enqueue(&self) {
        if self.network.is_online() {
            let _ = self.commands.send(SyncCommand::DrainDue);
        } else {
            let queued = self.queue.lock().len();
            self.notify(SyncNotice::QueuedOffline { queued });
        }
    }

    fn notify(&self, notice: SyncNotice) {
        tracing::debug!(title = notice.title(), message = %notice.message(), "sync notice");
        let _ = self.notices.send(notice);
    }

    async fn process_queue(&self) -> Option<DrainReport> {
        self.run_pass(SyncCommand::Drain).await
    }

    async fn run_pass(&self, command: SyncCommand) -> Option<DrainReport> {
        let started = tokio::time::Instant::now();
        let (queue, dispatcher, clock) = (&self.queue, self.dispatcher.as_ref(), self.clock.as_ref());
        let report = match command {
            SyncCommand::Drain => {
                self.processor
                    .drain(queue, dispatcher, &self.network, clock, &self.config)
                    .await
            }
            SyncCommand::DrainDue => {
                self.processor
                    .drain_due(queue, dispatcher, &self.network, clock, &self.config)
                    .await
            }
        }?;

        {
            let mut overlays = self.overlays.lock();
            for id in &report.succeeded {
                overlays.confirm(id);
            }
            for item in &report.failed {
                overlays.rollback(&item.id);
            }
        }

        if report.succeeded_count() > 0 {
            self.notify(SyncNotice::Synced {
                count: report.succeeded_count(),
            });
        }
        if report.failed_count() > 0 {
            self.notify(SyncNotice::SyncFailed {
                count: report.failed_count(),
            });
        }

        self.metrics.lock().record_pass(
            report.succeeded_count(),
            report.retrying_count(),
            report.failed_count(),
            started.elapsed(),
            self.clock.now(),
        );

        // A retry already due sooner keeps its timer
        let next = self.queue.lock().next_backoff(&self.config);
        if let Some(delay) = next {
            if self.network.is_online() {
                self.scheduler.schedule_earliest(delay);
            }
        }

        Some(report)
    }

    fn on_connectivity(&self, status: NetworkStatus) {
        match status {
            NetworkStatus::Online => {
                let queued = self.queue.lock().len();
                if self.scheduler.on_online(queued, self.config.reconnect_delay) {
                    self.notify(SyncNotice::ConnectionRestored { queued });
                }
            }
            NetworkStatus::Offline => {
                self.scheduler.on_offline();
                self.notify(SyncNotice::ConnectionLost);
            }
        }
    }
}

async fn run_worker(
    shared: Arc<SyncShared>,
    mut commands: mpsc::UnboundedReceiver<SyncCommand>,
    mut network: watch::Receiver<NetworkStatus>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(mut command) => {
                    while let Ok(next) = commands.try_recv() {
                        if next == SyncCommand::Drain {
                            command = SyncCommand::Drain;
                        }
                    }
                    shared.run_pass(command).await;
                }
                None => break,
            },
            changed = network.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *network.borrow_and_update();
                shared.on_connectivity(status);
            }
        }
    }
    tracing::debug!("sync worker exited");
}
