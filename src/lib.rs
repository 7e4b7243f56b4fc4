//! cms-sync - Offline Sync Library
//!
//! Lets the site-operations client keep writing while the connection is
//! down. Writes are queued durably, shown optimistically, and delivered in
//! order once the remote store is reachable again.
//!
//! # Module Structure
//!
//! - **`shared`** - Types used across the crate
//!   - Typed operations and their persisted envelope
//!   - Notices, errors, configuration, clock
//!
//! - **`storage`** - Durable key/value storage
//!   - In-memory (quota aware) and JSON-file backends
//!
//! - **`offline`** - Local building blocks
//!   - Offline queue, retry scheduler, optimistic overlays, synced values
//!
//! - **`sync`** - Delivery
//!   - Drain processor, network monitor, metrics, `SyncService`
//!
//! - **`migration`** - One-time transfer of local data
//!   - Backup, migrate, validate, rollback, audit log
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cms_sync::shared::operation::{Operation, ProjectDraft};
//! use cms_sync::storage::FileStorage;
//! use cms_sync::sync::{MutationDispatcher, NetworkMonitor, SyncService};
//! use cms_sync::SyncConfig;
//! use std::sync::Arc;
//!
//! # async fn example(dispatcher: Arc<dyn MutationDispatcher>) -> cms_sync::Result<()> {
//! let storage = Arc::new(FileStorage::open_default()?);
//! let network = NetworkMonitor::offline();
//! let mut service = SyncService::new(SyncConfig::default(), storage, dispatcher, network.clone());
//! service.start()?;
//!
//! // Stored locally while offline
//! service.queue_operation(Operation::CreateProject(ProjectDraft::named("Tower A")));
//!
//! // Drained after the reconnect delay
//! network.set_status(cms_sync::sync::NetworkStatus::Online);
//! # Ok(())
//! # }
//! ```

pub mod migration;
pub mod offline;
pub mod shared;
pub mod storage;
pub mod sync;

pub use shared::{
    Collection, ConfigError, NoticeLevel, Operation, OperationEnvelope, OperationKind, Result,
    SyncConfig, SyncError, SyncNotice,
};
pub use storage::{FileStorage, LocalStorage, MemoryStorage, StorageError};
pub use sync::{MutationDispatcher, NetworkMonitor, NetworkStatus, RemoteError, SyncService};
