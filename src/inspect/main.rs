//! cms-sync-inspect
//!
//! Looks at (and repairs) the persisted sync state in a `FileStorage`
//! document.
//!
//! ```text
//! cms-sync-inspect <storage.json> stats
//! cms-sync-inspect <storage.json> failed
//! cms-sync-inspect <storage.json> backups
//! cms-sync-inspect <storage.json> log
//! cms-sync-inspect <storage.json> rollback <backup-key>
//! cms-sync-inspect <storage.json> cleanup-backups
//! ```
//!
//! Configuration is read from the TOML file named by `CMS_SYNC_CONFIG` when
//! set, then overridden by the `CMS_SYNC_*` environment variables.

use cms_sync::migration::MigrationManager;
use cms_sync::offline::OfflineQueue;
use cms_sync::storage::{FileStorage, LocalStorage};
use cms_sync::SyncConfig;
use std::sync::Arc;

const USAGE: &str = "usage: cms-sync-inspect <storage.json> <stats|failed|backups|log|rollback <key>|cleanup-backups>";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (Some(path), Some(command)) = (args.first(), args.get(1)) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let config = load_config()?;
    let storage: Arc<dyn LocalStorage> = Arc::new(FileStorage::open(path)?);
    tracing::debug!(path = %path, queue_key = %config.queue_key, "opened storage");

    match command.as_str() {
        "stats" => {
            let queue = OfflineQueue::load(Arc::clone(&storage), &config);
            println!("{}", serde_json::to_string_pretty(&queue.stats())?);
        }
        "failed" => {
            let queue = OfflineQueue::load(Arc::clone(&storage), &config);
            println!("{}", serde_json::to_string_pretty(queue.failed_items())?);
        }
        "backups" => {
            let manager = MigrationManager::new(storage, config);
            for key in manager.list_backups() {
                println!("{}", key);
            }
        }
        "log" => {
            let manager = MigrationManager::new(storage, config);
            for entry in manager.logs() {
                println!("{} [{}] {}", entry.timestamp.to_rfc3339(), entry.level, entry.message);
            }
        }
        "rollback" => {
            let Some(key) = args.get(2) else {
                eprintln!("{}", USAGE);
                std::process::exit(2);
            };
            let mut manager = MigrationManager::new(storage, config);
            manager.rollback_migration(key)?;
            println!("restored {}", key);
        }
        "cleanup-backups" => {
            let mut manager = MigrationManager::new(storage, config);
            let removed = manager.cleanup_old_backups()?;
            println!("removed {} backups", removed.len());
        }
        other => {
            eprintln!("unknown command '{}'\n{}", other, USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

fn load_config() -> Result<SyncConfig, cms_sync::ConfigError> {
    let config = match std::env::var_os("CMS_SYNC_CONFIG") {
        Some(path) => SyncConfig::from_file(path)?,
        None => SyncConfig::default(),
    };
    config.apply_env()
}
