//! Operation, storage and service fixtures

use super::mocks::ScriptedDispatcher;
use cms_sync::shared::operation::{AttendanceEntry, ProjectDraft};
use cms_sync::{MemoryStorage, NetworkMonitor, Operation, SyncConfig, SyncService};
use serde_json::Map;
use std::sync::Arc;

pub fn create_project(name: &str) -> Operation {
    Operation::CreateProject(ProjectDraft::named(name))
}

pub fn log_attendance(employee_id: &str, date: &str) -> Operation {
    Operation::LogAttendance(AttendanceEntry {
        employee_id: employee_id.to_string(),
        date: date.to_string(),
        status: "present".to_string(),
        extra: Map::new(),
    })
}

/// Service, its storage and its dispatcher
pub struct TestService {
    pub service: SyncService,
    pub storage: Arc<MemoryStorage>,
    pub dispatcher: Arc<ScriptedDispatcher>,
    pub network: NetworkMonitor,
}

pub fn test_service(dispatcher: ScriptedDispatcher, network: NetworkMonitor) -> TestService {
    let storage = Arc::new(MemoryStorage::new());
    let dispatcher = Arc::new(dispatcher);
    let service = SyncService::new(
        SyncConfig::default(),
        storage.clone(),
        dispatcher.clone(),
        network.clone(),
    );
    TestService {
        service,
        storage,
        dispatcher,
        network,
    }
}
