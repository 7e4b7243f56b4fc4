/**
 * Sync Notice System
 *
 * This module defines the user-visible notices emitted by the sync layer:
 * connectivity changes, sync outcomes and reverted optimistic writes. UI
 * callers subscribe to them and render toasts.
 */
use serde::{Deserialize, Serialize};

/// Severity used when rendering a notice
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    /// Informational notice
    Info,
    /// Something succeeded
    Success,
    /// Something failed and needs attention
    Error,
}

/// Notice broadcast to every subscriber of a `SyncService` or `SyncedValue`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncNotice {
    /// A write was stored locally because the connection is down
    QueuedOffline {
        /// Items currently waiting in the queue
        queued: usize,
    },
    /// The connection dropped; subsequent writes will be queued
    ConnectionLost,
    /// The connection came back; a drain is scheduled
    ConnectionRestored {
        /// Items waiting to be synced
        queued: usize,
    },
    /// A drain pass delivered items
    Synced {
        /// Items delivered in the pass
        count: usize,
    },
    /// A drain pass gave up on items
    SyncFailed {
        /// Items that failed permanently in the pass
        count: usize,
    },
    /// An optimistic write was reverted
    UpdateFailed {
        /// Failure reported by the remote side
        message: String,
    },
}

impl SyncNotice {
    /// Rendering severity
    pub fn level(&self) -> NoticeLevel {
        match self {
            SyncNotice::QueuedOffline { .. }
            | SyncNotice::ConnectionLost
            | SyncNotice::ConnectionRestored { .. } => NoticeLevel::Info,
            SyncNotice::Synced { .. } => NoticeLevel::Success,
            SyncNotice::SyncFailed { .. } | SyncNotice::UpdateFailed { .. } => NoticeLevel::Error,
        }
    }

    /// Short title suitable for a toast
    pub fn title(&self) -> &'static str {
        match self {
            SyncNotice::QueuedOffline { .. } => "Saved Offline",
            SyncNotice::ConnectionLost => "Connection Lost",
            SyncNotice::ConnectionRestored { .. } => "Back Online",
            SyncNotice::Synced { .. } => "Sync Complete",
            SyncNotice::SyncFailed { .. } => "Sync Failed",
            SyncNotice::UpdateFailed { .. } => "Update Failed",
        }
    }

    /// Body text suitable for a toast
    pub fn message(&self) -> String {
        match self {
            SyncNotice::QueuedOffline { queued } => {
                format!("Changes saved locally ({} waiting to sync)", queued)
            }
            SyncNotice::ConnectionLost => {
                "You are offline. Changes will be saved locally and synced later".to_string()
            }
            SyncNotice::ConnectionRestored { queued } => {
                format!("Connection restored, syncing {} queued change(s)", queued)
            }
            SyncNotice::Synced { count } => format!("Synced {} change(s)", count),
            SyncNotice::SyncFailed { count } => {
                format!("{} change(s) could not be synced", count)
            }
            SyncNotice::UpdateFailed { message } => message.clone(),
        }
    }
}
