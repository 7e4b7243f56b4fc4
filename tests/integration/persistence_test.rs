//! Queue and overlay state surviving a restart on file-backed storage

use crate::assert_ok;
use crate::common::*;
use cms_sync::shared::operation::Collection;
use cms_sync::{FileStorage, LocalStorage, NetworkMonitor, SyncConfig, SyncService};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn open_service(path: &std::path::Path, dispatcher: Arc<ScriptedDispatcher>) -> SyncService {
    let storage = Arc::new(assert_ok!(FileStorage::open(path)));
    SyncService::new(SyncConfig::default(), storage, dispatcher, NetworkMonitor::offline())
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("storage.json");
    let dispatcher = Arc::new(ScriptedDispatcher::accepting());

    let id = {
        let service = open_service(&path, dispatcher.clone());
        service.queue_operation(log_attendance("e-7", "2024-05-02"));
        service.queue_operation(create_project("Tower A")).unwrap()
    };

    let service = open_service(&path, dispatcher.clone());
    assert_eq!(service.stats().pending, 2);

    // Pending writes are shown again after the restart
    let projects = service.view(Collection::Projects, &json!([]));
    assert_eq!(projects[0]["_id"], json!(id));

    service.network().set_status(cms_sync::NetworkStatus::Online);
    let report = assert_ok!(service.manual_sync().await).expect("pass should run");
    assert_eq!(report.succeeded_count(), 2);

    let storage = assert_ok!(FileStorage::open(&path));
    assert_eq!(storage.get("cms_offline_queue").as_deref(), Some("[]"));
}

#[test]
fn test_malformed_entries_are_discarded_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("storage.json");
    let storage = assert_ok!(FileStorage::open(&path));
    let raw = json!([
        { "id": "ok-1", "timestamp": "2024-05-01T09:00:00Z", "operation": { "type": "CREATE_PROJECT", "data": { "name": "A" } } },
        { "timestamp": "2024-05-01T09:00:00Z" },
        "garbage",
    ]);
    assert_ok!(storage.set("cms_offline_queue", &raw.to_string()));

    let service = open_service(&path, Arc::new(ScriptedDispatcher::accepting()));
    assert_eq!(service.items().len(), 1);
    assert_eq!(service.items()[0].id, "ok-1");
}
