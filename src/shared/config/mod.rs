//! Sync configuration module
//!
//! Provides [`SyncConfig`], its builder, and loading from TOML files and
//! environment overrides.
//!
//! ```toml
//! queue_key = "convex_offline_queue"
//! max_retries = 5
//! retry_delays_ms = [1000, 3000, 10000, 30000]
//! reconnect_delay_ms = 2000
//! ```

use crate::storage::{BACKUP_PREFIX, CMS_QUEUE_KEY, CONVEX_QUEUE_KEY, MIGRATION_LOG_KEY, MIGRATION_STATUS_KEY};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default number of failed attempts before an item is given up on
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default progressive backoff table, in milliseconds
pub const DEFAULT_RETRY_DELAYS_MS: [u64; 3] = [1_000, 3_000, 10_000];

/// Default stabilisation delay after the connection comes back
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2_000;

/// Default number of backups kept by cleanup
pub const DEFAULT_BACKUP_RETENTION: usize = 5;

/// Default size of the failed ledger; the oldest entries go first
pub const DEFAULT_FAILED_RETENTION: usize = 100;

/// Environment variable overriding the queue key
pub const ENV_QUEUE_KEY: &str = "CMS_SYNC_QUEUE_KEY";
/// Environment variable overriding the retry bound
pub const ENV_MAX_RETRIES: &str = "CMS_SYNC_MAX_RETRIES";
/// Environment variable overriding the reconnect delay (milliseconds)
pub const ENV_RECONNECT_DELAY_MS: &str = "CMS_SYNC_RECONNECT_DELAY_MS";

/// Configuration shared by the queue, scheduler, processor and migration manager
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Storage key of the active queue
    pub queue_key: String,
    /// Storage key of permanently failed items
    pub failed_queue_key: String,
    /// Failed attempts after which an item becomes `failed`
    pub max_retries: u32,
    /// Backoff table indexed by an item's retry count
    pub retry_delays: Vec<Duration>,
    /// Delay before draining after the connection comes back
    pub reconnect_delay: Duration,
    /// Field identifying a record inside a collection
    pub record_id_field: String,
    /// Prefix of backup snapshot keys
    pub backup_prefix: String,
    /// Storage key of the migration audit trail
    pub migration_log_key: String,
    /// Storage key of the migration completion marker
    pub migration_status_key: String,
    /// Backups kept by `cleanup_old_backups`
    pub backup_retention: usize,
    /// Most failed items kept in the ledger
    pub failed_retention: usize,
    /// Whether `SyncedValue` keeps an offline fallback copy
    pub offline_fallback: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            queue_key: CMS_QUEUE_KEY.to_string(),
            failed_queue_key: failed_key_for(CMS_QUEUE_KEY),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delays: DEFAULT_RETRY_DELAYS_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            record_id_field: "_id".to_string(),
            backup_prefix: BACKUP_PREFIX.to_string(),
            migration_log_key: MIGRATION_LOG_KEY.to_string(),
            migration_status_key: MIGRATION_STATUS_KEY.to_string(),
            backup_retention: DEFAULT_BACKUP_RETENTION,
            failed_retention: DEFAULT_FAILED_RETENTION,
            offline_fallback: true,
        }
    }
}

fn failed_key_for(queue_key: &str) -> String {
    format!("{}_failed", queue_key)
}

impl SyncConfig {
    /// Create a new SyncConfigBuilder
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Defaults for the Convex-backed storage variant
    pub fn convex() -> Self {
        Self {
            queue_key: CONVEX_QUEUE_KEY.to_string(),
            failed_queue_key: failed_key_for(CONVEX_QUEUE_KEY),
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::invalid("max_retries", "must be at least 1"));
        }
        if self.retry_delays.is_empty() {
            return Err(ConfigError::invalid("retry_delays", "backoff table is empty"));
        }
        if self.backup_retention == 0 {
            return Err(ConfigError::invalid("backup_retention", "must keep at least one backup"));
        }
        if self.failed_retention == 0 {
            return Err(ConfigError::invalid("failed_retention", "must keep at least one failed item"));
        }
        for (field, value) in [
            ("queue_key", &self.queue_key),
            ("failed_queue_key", &self.failed_queue_key),
            ("record_id_field", &self.record_id_field),
            ("backup_prefix", &self.backup_prefix),
            ("migration_log_key", &self.migration_log_key),
            ("migration_status_key", &self.migration_status_key),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingValue(field));
            }
        }
        if self.queue_key == self.failed_queue_key {
            return Err(ConfigError::invalid(
                "failed_queue_key",
                "must differ from queue_key",
            ));
        }
        Ok(())
    }

    /// Backoff delay for an item that has failed `retries` times
    ///
    /// Counts past the end of the table reuse its last entry.
    pub fn backoff_for(&self, retries: u32) -> Duration {
        let last = self.retry_delays.len().saturating_sub(1);
        let index = (retries as usize).min(last);
        self.retry_delays.get(index).copied().unwrap_or_default()
    }

    /// Parse a TOML document; absent fields keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        file.into_builder().build()
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// Apply `CMS_SYNC_*` environment overrides and re-validate
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(key) = std::env::var(ENV_QUEUE_KEY) {
            if self.failed_queue_key == failed_key_for(&self.queue_key) {
                self.failed_queue_key = failed_key_for(&key);
            }
            self.queue_key = key;
        }
        if let Ok(raw) = std::env::var(ENV_MAX_RETRIES) {
            self.max_retries = raw.parse().map_err(|_| ConfigError::Env {
                var: ENV_MAX_RETRIES,
                value: raw.clone(),
            })?;
        }
        if let Ok(raw) = std::env::var(ENV_RECONNECT_DELAY_MS) {
            let ms: u64 = raw.parse().map_err(|_| ConfigError::Env {
                var: ENV_RECONNECT_DELAY_MS,
                value: raw.clone(),
            })?;
            self.reconnect_delay = Duration::from_millis(ms);
        }
        self.validate()?;
        Ok(self)
    }
}

/// Builder for SyncConfig
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    queue_key: Option<String>,
    failed_queue_key: Option<String>,
    max_retries: Option<u32>,
    retry_delays: Option<Vec<Duration>>,
    reconnect_delay: Option<Duration>,
    record_id_field: Option<String>,
    backup_prefix: Option<String>,
    migration_log_key: Option<String>,
    migration_status_key: Option<String>,
    backup_retention: Option<usize>,
    failed_retention: Option<usize>,
    offline_fallback: Option<bool>,
}

impl SyncConfigBuilder {
    /// Set the active queue key; the failed-ledger key follows unless set explicitly
    pub fn queue_key(mut self, key: impl Into<String>) -> Self {
        self.queue_key = Some(key.into());
        self
    }

    /// Set the failed-ledger key
    pub fn failed_queue_key(mut self, key: impl Into<String>) -> Self {
        self.failed_queue_key = Some(key.into());
        self
    }

    /// Set the retry bound
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set the backoff table
    pub fn retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = Some(delays);
        self
    }

    /// Set the reconnect stabilisation delay
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = Some(delay);
        self
    }

    /// Set the record id field
    pub fn record_id_field(mut self, field: impl Into<String>) -> Self {
        self.record_id_field = Some(field.into());
        self
    }

    /// Set the backup key prefix
    pub fn backup_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.backup_prefix = Some(prefix.into());
        self
    }

    /// Set the migration log key
    pub fn migration_log_key(mut self, key: impl Into<String>) -> Self {
        self.migration_log_key = Some(key.into());
        self
    }

    /// Set the migration status key
    pub fn migration_status_key(mut self, key: impl Into<String>) -> Self {
        self.migration_status_key = Some(key.into());
        self
    }

    /// Set how many backups cleanup keeps
    pub fn backup_retention(mut self, count: usize) -> Self {
        self.backup_retention = Some(count);
        self
    }

    /// Set how many failed items the ledger keeps
    pub fn failed_retention(mut self, count: usize) -> Self {
        self.failed_retention = Some(count);
        self
    }

    /// Enable or disable offline fallback copies
    pub fn offline_fallback(mut self, enabled: bool) -> Self {
        self.offline_fallback = Some(enabled);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        let defaults = SyncConfig::default();
        let queue_key = self.queue_key.unwrap_or(defaults.queue_key);
        let failed_queue_key = self
            .failed_queue_key
            .unwrap_or_else(|| failed_key_for(&queue_key));

        let config = SyncConfig {
            queue_key,
            failed_queue_key,
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_delays: self.retry_delays.unwrap_or(defaults.retry_delays),
            reconnect_delay: self.reconnect_delay.unwrap_or(defaults.reconnect_delay),
            record_id_field: self.record_id_field.unwrap_or(defaults.record_id_field),
            backup_prefix: self.backup_prefix.unwrap_or(defaults.backup_prefix),
            migration_log_key: self.migration_log_key.unwrap_or(defaults.migration_log_key),
            migration_status_key: self
                .migration_status_key
                .unwrap_or(defaults.migration_status_key),
            backup_retention: self.backup_retention.unwrap_or(defaults.backup_retention),
            failed_retention: self.failed_retention.unwrap_or(defaults.failed_retention),
            offline_fallback: self.offline_fallback.unwrap_or(defaults.offline_fallback),
        };
        config.validate()?;
        Ok(config)
    }
}

/// On-disk TOML shape
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    queue_key: Option<String>,
    failed_queue_key: Option<String>,
    max_retries: Option<u32>,
    retry_delays_ms: Option<Vec<u64>>,
    reconnect_delay_ms: Option<u64>,
    record_id_field: Option<String>,
    backup_prefix: Option<String>,
    migration_log_key: Option<String>,
    migration_status_key: Option<String>,
    backup_retention: Option<usize>,
    failed_retention: Option<usize>,
    offline_fallback: Option<bool>,
}

impl ConfigFile {
    fn into_builder(self) -> SyncConfigBuilder {
        SyncConfigBuilder {
            queue_key: self.queue_key,
            failed_queue_key: self.failed_queue_key,
            max_retries: self.max_retries,
            retry_delays: self
                .retry_delays_ms
                .map(|ms| ms.into_iter().map(Duration::from_millis).collect()),
            reconnect_delay: self.reconnect_delay_ms.map(Duration::from_millis),
            record_id_field: self.record_id_field,
            backup_prefix: self.backup_prefix,
            migration_log_key: self.migration_log_key,
            migration_status_key: self.migration_status_key,
            backup_retention: self.backup_retention,
            failed_retention: self.failed_retention,
            offline_fallback: self.offline_fallback,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("could not parse configuration: {0}")]
    Parse(String),
    #[error("could not read configuration: {0}")]
    Io(String),
    #[error("invalid environment override {var}={value}")]
    Env { var: &'static str, value: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
