//! Migration safety rails against an in-memory store

use crate::common::*;
use crate::{assert_err, assert_ok};
use cms_sync::migration::{LogLevel, MigrationManager, MigrationStep};
use cms_sync::{LocalStorage, MemoryStorage, SyncConfig, SyncError};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn seeded_storage() -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    let projects = json!([
        { "projectName": "Tower A", "clientInfo": "Acme" },
        { "projectName": "Tower B", "clientInfo": "Acme" },
        { "projectName": "Depot", "clientInfo": "City" },
        { "projectName": "Bridge", "clientInfo": "State" },
        { "projectName": "School", "clientInfo": "District" },
    ]);
    storage.set("cms_projects", &projects.to_string()).unwrap();
    storage
}

#[tokio::test]
async fn test_migration_stops_at_first_rejection() {
    let storage = seeded_storage();
    let mut manager = MigrationManager::new(storage, SyncConfig::default());
    let mutation = ScriptedMutation::accepting()
        .then(Outcome::Accept)
        .then(Outcome::Accept)
        .then(Outcome::reject("duplicate project"));

    let result = manager
        .migrate_data_type("projects", "cms_projects", &mutation)
        .await;

    assert_err!(result, SyncError::Migration { index: 2, .. });
    assert_eq!(mutation.call_count(), 3);
    assert_eq!(mutation.submitted()[2]["projectName"], "Depot");
    assert!(manager.logs().iter().any(|entry| entry.level == LogLevel::Error));
}

#[test]
fn test_rollback_requires_existing_backup() {
    let storage = seeded_storage();
    let before = storage.get("cms_projects");
    let mut manager = MigrationManager::new(storage.clone(), SyncConfig::default());

    assert_err!(
        manager.rollback_migration("cms_backup_1700000000000"),
        SyncError::BackupNotFound { .. }
    );
    assert_eq!(storage.get("cms_projects"), before);
}

#[test]
fn test_corrupt_backup_leaves_storage_untouched() {
    let storage = seeded_storage();
    let mut manager = MigrationManager::new(storage.clone(), SyncConfig::default());
    let key = assert_ok!(manager.backup_local_storage());

    storage.set(&key, "{\"truncated\":").unwrap();
    storage.set("cms_inventory", "[]").unwrap();
    let keys_before = storage.keys();

    assert_err!(manager.rollback_migration(&key), SyncError::Backup { .. });
    assert_eq!(storage.keys(), keys_before);
    assert_eq!(storage.get("cms_inventory").as_deref(), Some("[]"));
}

#[tokio::test]
async fn test_failed_migration_restores_local_data() {
    let storage = seeded_storage();
    storage.set("cms_inventory", &json!([{ "itemName": "Cement", "quantity": 40 }]).to_string()).unwrap();
    let original_projects = storage.get("cms_projects");

    let mut manager = MigrationManager::new(storage.clone(), SyncConfig::default());
    let mutation = ScriptedMutation::accepting()
        .then(Outcome::Accept)
        .then(Outcome::reject("quota exceeded"));

    let steps = [
        MigrationStep::new("projects", "cms_projects"),
        MigrationStep::new("inventory", "cms_inventory"),
    ];
    assert_err!(manager.migrate_all(&steps, &mutation).await, SyncError::Migration { .. });

    assert_eq!(storage.get("cms_projects"), original_projects);
    assert!(manager.migration_status().is_none());
    assert_eq!(mutation.call_count(), 2);
}

#[tokio::test]
async fn test_successful_migration_is_recorded() {
    let storage = seeded_storage();
    let mut manager = MigrationManager::new(storage.clone(), SyncConfig::default());
    let steps = [
        MigrationStep::new("projects", "cms_projects"),
        MigrationStep::new("inventory", "cms_inventory"),
    ];

    let status = assert_ok!(manager.migrate_all(&steps, &ScriptedMutation::accepting()).await);
    assert_eq!(status.migrated.get("projects"), Some(&5));
    assert_eq!(status.migrated.get("inventory"), Some(&0));
    assert!(status.discrepancies.is_empty());

    // The audit trail is reloaded by a fresh manager
    let reopened = MigrationManager::new(storage, SyncConfig::default());
    assert_eq!(reopened.migration_status(), Some(status));
    assert!(reopened.logs().len() >= 3);
}
