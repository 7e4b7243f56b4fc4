//! Append-only migration audit trail.

use crate::shared::error::Result;
use crate::storage::LocalStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub level: LogLevel,
    pub message: String,
}

/// Log persisted under a single storage key, rewritten after every append
pub struct MigrationLog {
    storage: Arc<dyn LocalStorage>,
    key: String,
    entries: Vec<MigrationLogEntry>,
}

impl std::fmt::Debug for MigrationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationLog")
            .field("key", &self.key)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl MigrationLog {
    /// Load existing entries; an unreadable log starts over
    pub fn load(storage: Arc<dyn LocalStorage>, key: impl Into<String>) -> Self {
        let key = key.into();
        let entries = match storage.get(&key) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(key = %key, error = %e, "unreadable migration log, starting fresh");
                Vec::new()
            }),
            None => Vec::new(),
        };
        Self {
            storage,
            key,
            entries,
        }
    }

    /// Append an entry and persist the whole trail
    pub fn append(&mut self, level: LogLevel, message: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        let message = message.into();
        match level {
            LogLevel::Error => tracing::error!(%message, "migration"),
            LogLevel::Warning => tracing::warn!(%message, "migration"),
            LogLevel::Info | LogLevel::Success => tracing::info!(%level, %message, "migration"),
        }

        self.entries.push(MigrationLogEntry {
            timestamp: now,
            level,
            message,
        });
        let raw = serde_json::to_string(&self.entries)?;
        self.storage.set(&self.key, &raw)?;
        Ok(())
    }

    pub fn entries(&self) -> &[MigrationLogEntry] {
        &self.entries
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}
