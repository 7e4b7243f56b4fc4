//! # Migration Manager
//!
//! One-time transfer of records kept in local storage into the remote store.
//!
//! ## Features
//!
//! - **Backup First**: Every migration starts from a verified snapshot of
//!   local storage
//! - **Fail-Fast Batches**: The first rejected record aborts its data type
//! - **Validation**: Count parity and key-field checks on migrated records
//! - **Rollback**: Restores local storage exactly as the snapshot recorded it
//! - **Retention**: Keeps the most recent snapshots only
//! - **Audit Trail**: Every step is logged and persisted immediately
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cms_sync::migration::{MigrationManager, MigrationStep, RecordMutation};
//! use cms_sync::storage::FileStorage;
//! use cms_sync::SyncConfig;
//! use std::sync::Arc;
//!
//! # async fn example(mutation: &dyn RecordMutation) -> cms_sync::Result<()> {
//! let storage = Arc::new(FileStorage::open_default()?);
//! let mut manager = MigrationManager::new(storage, SyncConfig::default());
//!
//! let steps = [
//!     MigrationStep::new("projects", "cms_projects"),
//!     MigrationStep::new("inventory", "cms_inventory"),
//! ];
//! let status = manager.migrate_all(&steps, mutation).await?;
//! println!("backup kept at {}", status.backup_key);
//! # Ok(())
//! # }
//! ```

pub mod log;
pub mod validate;

pub use log::{LogLevel, MigrationLog, MigrationLogEntry};
pub use validate::{key_fields_for, validate_migration};

use crate::shared::clock::{Clock, SystemClock};
use crate::shared::config::SyncConfig;
use crate::shared::error::{Result, SyncError};
use crate::storage::LocalStorage;
use crate::sync::dispatcher::RemoteError;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Value stamped into `migratedFrom`
pub const MIGRATED_FROM: &str = "localStorage";

/// Remote write used to migrate one record
pub trait RecordMutation: Send + Sync {
    /// Submit `record` of `data_type`, resolving to the stored record
    fn submit<'a>(&'a self, data_type: &'a str, record: Value) -> BoxFuture<'a, std::result::Result<Value, RemoteError>>;
}

/// A data type and the storage key holding its records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    pub data_type: String,
    pub source_key: String,
}

impl MigrationStep {
    pub fn new(data_type: impl Into<String>, source_key: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            source_key: source_key.into(),
        }
    }
}

/// Completion marker written after a successful `migrate_all`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    pub completed_at: DateTime<Utc>,
    pub backup_key: String,
    /// Records migrated per data type
    pub migrated: BTreeMap<String, usize>,
    /// Validation findings; not fatal
    pub discrepancies: Vec<String>,
}

pub struct MigrationManager {
    storage: Arc<dyn LocalStorage>,
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    log: MigrationLog,
}

impl std::fmt::Debug for MigrationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationManager")
            .field("backup_prefix", &self.config.backup_prefix)
            .field("log", &self.log)
            .finish()
    }
}

impl MigrationManager {
    pub fn new(storage: Arc<dyn LocalStorage>, config: SyncConfig) -> Self {
        Self::with_clock(storage, config, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: Arc<dyn LocalStorage>, config: SyncConfig, clock: Arc<dyn Clock>) -> Self {
        let log = MigrationLog::load(Arc::clone(&storage), config.migration_log_key.clone());
        Self {
            storage,
            config,
            clock,
            log,
        }
    }

    /// Snapshot every regular key into a new backup; returns the backup key
    ///
    /// Backups, the audit trail and the status marker are not included. The
    /// snapshot is read back before this returns, so a returned key always
    /// names a complete backup.
    pub fn backup_local_storage(&mut self) -> Result<String> {
        let snapshot: BTreeMap<String, String> = self
            .storage
            .keys()
            .into_iter()
            .filter(|key| !self.is_reserved(key))
            .filter_map(|key| self.storage.get(&key).map(|value| (key, value)))
            .collect();

        let raw = serde_json::to_string(&snapshot)
            .map_err(|e| SyncError::backup(format!("failed to serialize snapshot: {}", e)))?;

        let mut millis = self.clock.now().timestamp_millis();
        let mut key = format!("{}{}", self.config.backup_prefix, millis);
        while self.storage.contains(&key) {
            millis += 1;
            key = format!("{}{}", self.config.backup_prefix, millis);
        }

        self.storage
            .set(&key, &raw)
            .map_err(|e| SyncError::backup(format!("failed to store {}: {}", key, e)))?;
        if self.storage.get(&key).as_deref() != Some(raw.as_str()) {
            return Err(SyncError::backup(format!("backup {} did not read back intact", key)));
        }

        self.log(
            LogLevel::Success,
            format!("Backup created: {} ({} keys)", key, snapshot.len()),
        );
        Ok(key)
    }

    /// Submit every record stored under `source_key`, stopping at the first
    /// rejection
    ///
    /// A missing source key migrates nothing. Each record is stamped with
    /// `migratedFrom`, `migrationDate` and `originalKey` before submission.
    pub async fn migrate_data_type(
        &mut self,
        data_type: &str,
        source_key: &str,
        mutation: &dyn RecordMutation,
    ) -> Result<Vec<Value>> {
        let records = self.read_records(data_type, source_key)?;
        self.log(
            LogLevel::Info,
            format!("Migrating {} {} records from {}", records.len(), data_type, source_key),
        );

        let migration_date = self.clock.now().to_rfc3339();
        let mut migrated = Vec::with_capacity(records.len());

        for (index, record) in records.into_iter().enumerate() {
            let Value::Object(mut fields) = record else {
                let error = migration_error(data_type, index, "record is not an object");
                self.log(LogLevel::Error, error.to_string());
                return Err(error);
            };
            fields.insert("migratedFrom".to_string(), Value::from(MIGRATED_FROM));
            fields.insert("migrationDate".to_string(), Value::from(migration_date.clone()));
            fields.insert("originalKey".to_string(), Value::from(source_key));

            match mutation.submit(data_type, Value::Object(fields)).await {
                Ok(result) => migrated.push(result),
                Err(e) => {
                    let error = migration_error(data_type, index, e.message);
                    self.log(LogLevel::Error, error.to_string());
                    return Err(error);
                }
            }
        }

        self.log(
            LogLevel::Success,
            format!("Migrated {} {} records", migrated.len(), data_type),
        );
        Ok(migrated)
    }

    /// Compare originals with migrated records, logging each finding
    pub fn validate_migration(&mut self, original: &[Value], migrated: &[Value]) -> Vec<String> {
        let discrepancies = validate_migration(original, migrated);
        for discrepancy in &discrepancies {
            self.log(LogLevel::Warning, discrepancy.clone());
        }
        discrepancies
    }

    /// Restore local storage from a backup
    ///
    /// The backup is parsed before anything is touched; a missing or
    /// unreadable backup leaves storage unchanged.
    pub fn rollback_migration(&mut self, backup_key: &str) -> Result<()> {
        let raw = match self.storage.get(backup_key) {
            Some(raw) if backup_key.starts_with(&self.config.backup_prefix) => raw,
            _ => {
                return Err(SyncError::BackupNotFound {
                    key: backup_key.to_string(),
                })
            }
        };
        let snapshot: BTreeMap<String, String> = serde_json::from_str(&raw)
            .map_err(|e| SyncError::backup(format!("backup {} is unreadable: {}", backup_key, e)))?;

        for key in self.storage.keys() {
            if !self.is_reserved(&key) {
                self.storage.remove(&key)?;
            }
        }
        for (key, value) in &snapshot {
            self.storage.set(key, value)?;
        }

        self.log(
            LogLevel::Success,
            format!("Rolled back to {} ({} keys restored)", backup_key, snapshot.len()),
        );
        Ok(())
    }

    /// Backup keys, newest first
    pub fn list_backups(&self) -> Vec<String> {
        let mut backups: Vec<String> = self
            .storage
            .keys()
            .into_iter()
            .filter(|key| key.starts_with(&self.config.backup_prefix))
            .collect();
        backups.sort_by(|a, b| b.cmp(a));
        backups
    }

    /// Delete all but the most recent backups; returns the deleted keys
    pub fn cleanup_old_backups(&mut self) -> Result<Vec<String>> {
        let stale: Vec<String> = self
            .list_backups()
            .into_iter()
            .skip(self.config.backup_retention)
            .collect();
        for key in &stale {
            self.storage.remove(key)?;
        }
        if !stale.is_empty() {
            self.log(LogLevel::Info, format!("Removed {} old backups", stale.len()));
        }
        Ok(stale)
    }

    /// Append to the audit trail
    ///
    /// A failed write is reported through `tracing`; the entry stays in memory.
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let now = self.clock.now();
        if let Err(e) = self.log.append(level, message, now) {
            tracing::error!(error = %e, "failed to persist migration log");
        }
    }

    /// Audit trail, oldest first
    pub fn logs(&self) -> &[MigrationLogEntry] {
        self.log.entries()
    }

    /// Marker written by the last successful `migrate_all`
    pub fn migration_status(&self) -> Option<MigrationStatus> {
        let raw = self.storage.get(&self.config.migration_status_key)?;
        serde_json::from_str(&raw)
            .map_err(|e| tracing::warn!(error = %e, "unreadable migration status"))
            .ok()
    }

    /// Back up, migrate every step, validate and record completion
    ///
    /// Any failure rolls local storage back to the backup taken at the start
    /// and returns the original error.
    pub async fn migrate_all(
        &mut self,
        steps: &[MigrationStep],
        mutation: &dyn RecordMutation,
    ) -> Result<MigrationStatus> {
        self.log(LogLevel::Info, format!("Starting migration of {} data types", steps.len()));
        let backup_key = self.backup_local_storage()?;

        match self.run_steps(steps, mutation, &backup_key).await {
            Ok(status) => {
                self.log(LogLevel::Success, "Migration completed");
                Ok(status)
            }
            Err(e) => {
                self.log(LogLevel::Error, format!("Migration failed: {}", e));
                if let Err(rollback) = self.rollback_migration(&backup_key) {
                    self.log(LogLevel::Error, format!("Rollback failed: {}", rollback));
                }
                Err(e)
            }
        }
    }

    async fn run_steps(
        &mut self,
        steps: &[MigrationStep],
        mutation: &dyn RecordMutation,
        backup_key: &str,
    ) -> Result<MigrationStatus> {
        let mut migrated_counts = BTreeMap::new();
        let mut discrepancies = Vec::new();

        for step in steps {
            let original = self.read_records(&step.data_type, &step.source_key)?;
            let migrated = self
                .migrate_data_type(&step.data_type, &step.source_key, mutation)
                .await?;
            discrepancies.extend(
                self.validate_migration(&original, &migrated)
                    .into_iter()
                    .map(|d| format!("{}: {}", step.data_type, d)),
            );
            migrated_counts.insert(step.data_type.clone(), migrated.len());
        }

        let status = MigrationStatus {
            completed_at: self.clock.now(),
            backup_key: backup_key.to_string(),
            migrated: migrated_counts,
            discrepancies,
        };
        let raw = serde_json::to_string(&status)?;
        self.storage.set(&self.config.migration_status_key, &raw)?;
        Ok(status)
    }

    fn read_records(&self, data_type: &str, source_key: &str) -> Result<Vec<Value>> {
        let Some(raw) = self.storage.get(source_key) else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(Value::Array(records)) => Ok(records),
            Ok(_) => Err(migration_error(data_type, 0, format!("{} does not hold an array", source_key))),
            Err(e) => Err(migration_error(data_type, 0, format!("{} is not valid JSON: {}", source_key, e))),
        }
    }

    /// Keys that backups neither capture nor overwrite
    fn is_reserved(&self, key: &str) -> bool {
        key.starts_with(&self.config.backup_prefix)
            || key == self.config.migration_log_key
            || key == self.config.migration_status_key
    }
}

fn migration_error(data_type: &str, index: usize, message: impl Into<String>) -> SyncError {
    SyncError::Migration {
        data_type: data_type.to_string(),
        index,
        message: message.into(),
    }
}
