//! Shared Module
//!
//! Types used by every layer of the sync client: the operation model, the
//! error taxonomy, configuration, user-visible notices and the injected
//! clock. None of them perform I/O.

/// Queueable operations
pub mod operation;

/// User-visible notices
pub mod event;

/// Shared error types
pub mod error;

/// Sync configuration
pub mod config;

/// Injected wall clock
pub mod clock;

/// Re-export commonly used types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, SyncConfig, SyncConfigBuilder};
pub use error::{Result, SyncError};
pub use event::{NoticeLevel, SyncNotice};
pub use operation::{Collection, Operation, OperationEnvelope, OperationKind};
