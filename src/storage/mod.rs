//! # Durable Local Storage
//!
//! Synchronous key/value persistence consumed by the offline queue, the
//! synced-value wrapper and the migration manager. Values are JSON strings
//! stored under fixed keys.
//!
//! ## Backends
//!
//! - `memory.rs`: in-process map with an optional byte quota
//! - `file.rs`: single JSON document on disk, rewritten atomically

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use thiserror::Error;

/// Key of the primary offline queue
pub const CMS_QUEUE_KEY: &str = "cms_offline_queue";

/// Key of the queue used by the Convex-backed storage variant
pub const CONVEX_QUEUE_KEY: &str = "convex_offline_queue";

/// Prefix of every backup snapshot key
pub const BACKUP_PREFIX: &str = "cms_backup_";

/// Key of the migration audit trail
pub const MIGRATION_LOG_KEY: &str = "cms_migration_log";

/// Key of the migration completion marker
pub const MIGRATION_STATUS_KEY: &str = "cms_migration_status";

/// Prefix of offline fallback copies written by `SyncedValue`
pub const FALLBACK_PREFIX: &str = "cms_fallback_";

/// Errors raised by a storage backend
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Writing the value would exceed the backend's quota
    #[error("Storage quota exceeded while writing '{key}'")]
    QuotaExceeded {
        /// Key being written
        key: String,
    },

    /// Underlying I/O failure
    #[error("Storage I/O error: {message}")]
    Io {
        /// Human-readable error message
        message: String,
    },

    /// Persisted document could not be parsed
    #[error("Corrupt storage document: {message}")]
    Corrupt {
        /// Human-readable error message
        message: String,
    },
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Synchronous key/value store with `localStorage` semantics
pub trait LocalStorage: Send + Sync {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`; deleting a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// All keys currently stored, in ascending order
    fn keys(&self) -> Vec<String>;

    /// Whether `key` holds a value
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}
