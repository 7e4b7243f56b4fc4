//! Shared Error Types
//!
//! This module defines the error taxonomy of the offline-sync layer. Every
//! fallible public operation returns [`SyncError`] (or one of the narrower
//! errors it wraps).
//!
//! # Error Categories
//!
//! - `InvalidOperation` - malformed operation rejected at enqueue time
//! - `UnknownOperation` / `InvalidPayload` - operation the dispatcher cannot decode
//! - `TransientSync` - rejection from the remote mutation dispatcher
//! - `NoConnection` - manual sync requested while offline
//! - `Backup` / `BackupNotFound` / `Migration` - migration safety rails
//! - `UpdateFailed` - optimistic write reverted after a remote failure
//!
//! # Usage
//!
//! ```rust
//! use cms_sync::shared::error::SyncError;
//!
//! let error = SyncError::backup("snapshot could not be written");
//! assert!(error.to_string().contains("snapshot"));
//! ```
//!
//! # Thread Safety
//!
//! All error types are `Send + Sync` and can be safely shared across thread boundaries.
use crate::storage::StorageError;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised by the offline queue, sync processor, optimistic wrapper and migration manager
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// Operation rejected before entering the queue
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Why the operation was rejected
        reason: String,
    },

    /// Operation type not recognised by the dispatcher
    #[error("Unknown operation type '{kind}'")]
    UnknownOperation {
        /// The unrecognised `type` tag
        kind: String,
    },

    /// Known operation type whose payload no longer decodes
    #[error("Invalid payload for '{kind}': {message}")]
    InvalidPayload {
        /// Operation type tag
        kind: String,
        /// Decoder message
        message: String,
    },

    /// Remote mutation rejected the attempt
    #[error("Sync attempt failed: {message}")]
    TransientSync {
        /// Message reported by the remote side
        message: String,
    },

    /// A manual sync was requested while the connection is down
    #[error("No connection available")]
    NoConnection,

    /// Backup could not be created or read back
    #[error("Backup error: {message}")]
    Backup {
        /// Human-readable error message
        message: String,
    },

    /// Rollback requested for a backup key that does not exist
    #[error("Backup not found: {key}")]
    BackupNotFound {
        /// The missing backup key
        key: String,
    },

    /// A record failed to migrate; the batch was aborted
    #[error("Migration of '{data_type}' failed at record {index}: {message}")]
    Migration {
        /// Data type being migrated
        data_type: String,
        /// Index of the record that failed
        index: usize,
        /// Underlying failure
        message: String,
    },

    /// Optimistic write reverted because the remote mutation failed
    #[error("Update failed: {message}")]
    UpdateFailed {
        /// Underlying failure
        message: String,
    },

    /// Durable local storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Human-readable error message
        message: String,
    },

    /// The background worker was started twice
    #[error("Sync service is already running")]
    AlreadyRunning,
}

impl SyncError {
    /// Create a new invalid-operation error
    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            reason: reason.into(),
        }
    }

    /// Create a new unknown-operation error
    pub fn unknown_operation(kind: impl Into<String>) -> Self {
        Self::UnknownOperation { kind: kind.into() }
    }

    /// Create a new transient sync error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientSync {
            message: message.into(),
        }
    }

    /// Create a new backup error
    pub fn backup(message: impl Into<String>) -> Self {
        Self::Backup {
            message: message.into(),
        }
    }

    /// Create a new update-failed error
    pub fn update_failed(message: impl Into<String>) -> Self {
        Self::UpdateFailed {
            message: message.into(),
        }
    }

    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Whether a user can reasonably retry the action that produced this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TransientSync { .. } | Self::NoConnection | Self::UpdateFailed { .. }
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}
