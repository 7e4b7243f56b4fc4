//! # Offline Queue Store
//!
//! Durable, ordered holding area for operations that could not be applied
//! immediately. The whole queue is rewritten to local storage on every
//! change, so it survives reloads.
//!
//! ## Features
//!
//! - **Persistent Queue**: Operations survive app restarts
//! - **Lenient Recovery**: Malformed persisted entries are dropped, not fatal
//! - **Status Tracking**: `pending -> retry -> failed`, or `completed`
//! - **Failed Ledger**: Items that exhausted their retries are kept under a
//!   separate key for inspection and manual retry, oldest evicted first once
//!   `failed_retention` is reached
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cms_sync::offline::queue::OfflineQueue;
//! use cms_sync::shared::{Operation, SyncConfig};
//! use cms_sync::shared::operation::ProjectDraft;
//! use cms_sync::storage::MemoryStorage;
//! use std::sync::Arc;
//!
//! let config = SyncConfig::default();
//! let mut queue = OfflineQueue::load(Arc::new(MemoryStorage::new()), &config);
//!
//! let envelope = Operation::CreateProject(ProjectDraft::named("Tower A"))
//!     .to_envelope()
//!     .unwrap();
//! let id = queue.enqueue(envelope, chrono::Utc::now()).unwrap();
//! assert_eq!(queue.stats().pending, 1);
//! # let _ = id;
//! ```

use crate::shared::config::SyncConfig;
use crate::shared::error::{Result, SyncError};
use crate::shared::operation::OperationEnvelope;
use crate::storage::LocalStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle status of a queued item
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    /// Never attempted
    #[default]
    Pending,
    /// Attempted and failed, will be retried
    Retry,
    /// Delivered
    Completed,
    /// Gave up after the retry bound
    Failed,
}

impl QueueStatus {
    /// Whether the item will never be attempted again automatically
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }
}

/// A single deferred write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Correlation id assigned at enqueue time
    pub id: String,
    /// Enqueue time
    pub timestamp: DateTime<Utc>,
    /// Operation to deliver
    pub operation: OperationEnvelope,
    /// Failed attempts so far
    #[serde(default)]
    pub retries: u32,
    /// Time of the most recent attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
    /// Error from the most recent failed attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Current status
    #[serde(default)]
    pub status: QueueStatus,
}

impl QueueItem {
    /// Fresh `pending` item
    pub fn new(operation: OperationEnvelope, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: now,
            operation,
            retries: 0,
            last_attempt: None,
            last_error: None,
            status: QueueStatus::Pending,
        }
    }

    /// Record a successful delivery
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.last_attempt = Some(now);
        self.status = QueueStatus::Completed;
    }

    /// Record a failed attempt and return the resulting status
    ///
    /// The item becomes `failed` exactly when `retries` reaches `max_retries`.
    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>, max_retries: u32) -> QueueStatus {
        self.retries = (self.retries + 1).min(max_retries);
        self.last_attempt = Some(now);
        self.last_error = Some(error.into());
        self.status = if self.retries >= max_retries {
            QueueStatus::Failed
        } else {
            QueueStatus::Retry
        };
        self.status
    }

    /// Whether the item may be attempted at `now` after waiting `backoff`
    /// since its last attempt
    ///
    /// Pending items are always due; terminal items never are.
    pub fn is_due(&self, now: DateTime<Utc>, backoff: Duration) -> bool {
        match self.status {
            QueueStatus::Pending => true,
            QueueStatus::Retry => match self.last_attempt {
                Some(at) => chrono::Duration::from_std(backoff)
                    .map(|wait| at + wait <= now)
                    .unwrap_or(false),
                None => true,
            },
            QueueStatus::Completed | QueueStatus::Failed => false,
        }
    }

    /// Put a failed item back at the start of its lifecycle
    pub fn reset(&mut self) {
        self.retries = 0;
        self.status = QueueStatus::Pending;
        self.last_error = None;
        self.last_attempt = None;
    }
}

/// Read-only queue statistics exposed to the UI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    /// Active items plus failed items
    pub total: usize,
    /// Items never attempted
    pub pending: usize,
    /// Items waiting for another attempt
    pub retry: usize,
    /// Items that exhausted their retries
    pub failed: usize,
    /// Whether anything is queued or failed
    pub has_items: bool,
    /// Whether failed items need a decision from the user
    pub needs_attention: bool,
}

/// Items removed from the active queue by [`OfflineQueue::cleanup`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cleanup {
    /// Ids of delivered items
    pub completed: Vec<String>,
    /// Items moved to the failed ledger
    pub failed: Vec<QueueItem>,
    /// Ids evicted from the ledger to stay within `failed_retention`
    pub evicted: Vec<String>,
}

/// Durable queue of deferred operations
pub struct OfflineQueue {
    storage: Arc<dyn LocalStorage>,
    queue_key: String,
    failed_key: String,
    failed_retention: usize,
    items: Vec<QueueItem>,
    failed: Vec<QueueItem>,
}

impl std::fmt::Debug for OfflineQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineQueue")
            .field("queue_key", &self.queue_key)
            .field("items", &self.items.len())
            .field("failed", &self.failed.len())
            .finish()
    }
}

impl OfflineQueue {
    /// Load the persisted queue, discarding malformed entries
    pub fn load(storage: Arc<dyn LocalStorage>, config: &SyncConfig) -> Self {
        let items = read_items(storage.as_ref(), &config.queue_key);
        let mut failed = read_items(storage.as_ref(), &config.failed_queue_key);
        let excess = failed.len().saturating_sub(config.failed_retention);
        failed.drain(..excess);

        tracing::debug!(
            key = %config.queue_key,
            active = items.len(),
            failed = failed.len(),
            "loaded offline queue"
        );

        Self {
            storage,
            queue_key: config.queue_key.clone(),
            failed_key: config.failed_queue_key.clone(),
            failed_retention: config.failed_retention,
            items,
            failed,
        }
    }

    /// Validate and append an operation, then persist; returns the new item id
    pub fn enqueue(&mut self, operation: OperationEnvelope, now: DateTime<Utc>) -> Result<String> {
        let kind = operation.validate()?;
        let item = QueueItem::new(operation, now);
        let id = item.id.clone();
        self.items.push(item);

        if let Err(e) = self.persist() {
            self.items.pop();
            return Err(e);
        }

        tracing::info!(id = %id, kind = %kind, queued = self.items.len(), "operation queued");
        Ok(id)
    }

    /// Write the active queue and the failed ledger to storage
    pub fn persist(&self) -> Result<()> {
        let items = serde_json::to_string(&self.items)?;
        let failed = serde_json::to_string(&self.failed)?;
        self.storage.set(&self.queue_key, &items)?;
        self.storage.set(&self.failed_key, &failed)?;
        Ok(())
    }

    /// Active items in queue order
    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    /// Items that exhausted their retries
    pub fn failed_items(&self) -> &[QueueItem] {
        &self.failed
    }

    /// Look up an active item
    pub fn get(&self, id: &str) -> Option<&QueueItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Number of active items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the active queue is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Active, non-terminal items in queue order
    pub fn snapshot(&self) -> Vec<QueueItem> {
        self.items
            .iter()
            .filter(|item| !item.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Active items that may be attempted at `now`, honouring each retry
    /// item's backoff
    pub fn due_snapshot(&self, now: DateTime<Utc>, config: &SyncConfig) -> Vec<QueueItem> {
        self.items
            .iter()
            .filter(|item| item.is_due(now, config.backoff_for(item.retries)))
            .cloned()
            .collect()
    }

    /// Mutate an active item and persist; `None` if the item is gone
    pub fn update<F>(&mut self, id: &str, f: F) -> Result<Option<QueueStatus>>
    where
        F: FnOnce(&mut QueueItem),
    {
        let Some(item) = self.items.iter_mut().find(|item| item.id == id) else {
            return Ok(None);
        };
        f(item);
        let status = item.status;
        self.persist()?;
        Ok(Some(status))
    }

    /// Drop completed items and move failed ones to the ledger
    pub fn cleanup(&mut self) -> Result<Cleanup> {
        let mut outcome = Cleanup::default();
        let mut remaining = Vec::with_capacity(self.items.len());

        for item in self.items.drain(..) {
            match item.status {
                QueueStatus::Completed => outcome.completed.push(item.id),
                QueueStatus::Failed => outcome.failed.push(item),
                QueueStatus::Pending | QueueStatus::Retry => remaining.push(item),
            }
        }

        self.items = remaining;
        self.failed.extend(outcome.failed.iter().cloned());

        let excess = self.failed.len().saturating_sub(self.failed_retention);
        outcome.evicted = self.failed.drain(..excess).map(|item| item.id).collect();
        if !outcome.evicted.is_empty() {
            tracing::warn!(
                evicted = outcome.evicted.len(),
                retention = self.failed_retention,
                "failed ledger full, dropped oldest items"
            );
        }

        if !outcome.completed.is_empty() || !outcome.failed.is_empty() {
            self.persist()?;
        }
        Ok(outcome)
    }

    /// Remove every active and failed item; returns the removed ids
    pub fn clear(&mut self) -> Result<Vec<String>> {
        let removed: Vec<String> = self
            .items
            .drain(..)
            .chain(self.failed.drain(..))
            .map(|item| item.id)
            .collect();
        self.persist()?;
        Ok(removed)
    }

    /// Move failed items back into the active queue with a fresh retry budget
    pub fn retry_failed(&mut self) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(self.failed.len());
        for mut item in self.failed.drain(..) {
            item.reset();
            ids.push(item.id.clone());
            self.items.push(item);
        }
        self.persist()?;
        Ok(ids)
    }

    /// Counts by status
    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for item in &self.items {
            match item.status {
                QueueStatus::Pending => stats.pending += 1,
                QueueStatus::Retry => stats.retry += 1,
                QueueStatus::Failed => stats.failed += 1,
                QueueStatus::Completed => {}
            }
        }
        stats.failed += self.failed.len();
        stats.total = self.items.len() + self.failed.len();
        stats.has_items = stats.total > 0;
        stats.needs_attention = stats.failed > 0;
        stats
    }

    /// Shortest backoff among items still awaiting delivery
    pub fn next_backoff(&self, config: &SyncConfig) -> Option<Duration> {
        self.items
            .iter()
            .filter(|item| !item.status.is_terminal())
            .map(|item| config.backoff_for(item.retries))
            .min()
    }
}

fn read_items(storage: &dyn LocalStorage, key: &str) -> Vec<QueueItem> {
    let Some(raw) = storage.get(key) else {
        return Vec::new();
    };

    let entries: Vec<Value> = match serde_json::from_str(&raw) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) | Err(_) => {
            tracing::warn!(key, "persisted queue is not a JSON array, starting empty");
            return Vec::new();
        }
    };

    let total = entries.len();
    let items: Vec<QueueItem> = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<QueueItem>(entry) {
            Ok(item) if !item.id.is_empty() => Some(item),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(key, error = %e, "skipping malformed queue entry");
                None
            }
        })
        .collect();

    if items.len() < total {
        tracing::warn!(key, discarded = total - items.len(), "discarded malformed queue entries");
    }
    items
}
