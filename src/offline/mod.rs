//! # Offline Support
//!
//! Local building blocks that let writes happen without a connection.
//!
//! ## Features
//!
//! - **Durable Queue**: Operations persisted in local storage until delivered
//! - **Retry Scheduling**: Single-timer scheduling with progressive backoff
//! - **Optimistic Overlays**: Pending writes folded over server data for display
//! - **Synced Values**: Single server values with optimistic writes and revert
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cms_sync::offline::{FoldOp, OptimisticManager};
//! use serde_json::json;
//!
//! let mut overlay = OptimisticManager::new("_id");
//! overlay.apply_optimistic("op-1", FoldOp::insert(json!({ "_id": "tmp-1", "name": "Tower A" })));
//!
//! let view = overlay.apply_optimistic_updates(&json!([]));
//! assert_eq!(view.as_array().map(Vec::len), Some(1));
//! ```

pub mod optimistic;
pub mod queue;
pub mod retry;
pub mod synced_value;

pub use optimistic::{FoldError, FoldOp, OptimisticManager, OptimisticOperation};
pub use queue::{OfflineQueue, QueueItem, QueueStats, QueueStatus};
pub use retry::RetryScheduler;
pub use synced_value::{SyncedValue, ValueMutation};
