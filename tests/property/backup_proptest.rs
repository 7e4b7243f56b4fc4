//! Property-based tests for backup retention

use cms_sync::migration::MigrationManager;
use cms_sync::{LocalStorage, MemoryStorage, SyncConfig};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

proptest! {
    #[test]
    fn test_cleanup_keeps_most_recent(timestamps in prop::collection::btree_set(1_600_000_000_000i64..1_800_000_000_000, 0..15)) {
        let storage = Arc::new(MemoryStorage::new());
        for ts in &timestamps {
            storage.set(&format!("cms_backup_{}", ts), "{}").unwrap();
        }
        storage.set("cms_projects", "[]").unwrap();

        let mut manager = MigrationManager::new(storage.clone(), SyncConfig::default());
        manager.cleanup_old_backups().unwrap();

        let expected: BTreeSet<String> = timestamps
            .iter()
            .rev()
            .take(5)
            .map(|ts| format!("cms_backup_{}", ts))
            .collect();
        let remaining: BTreeSet<String> = manager.list_backups().into_iter().collect();

        prop_assert_eq!(remaining, expected);
        prop_assert!(storage.get("cms_projects").is_some());
    }
}
