//! End-to-end behaviour of `SyncService` with simulated time and connectivity

use crate::common::*;
use crate::{assert_contains, assert_err, assert_ok, assert_stats};
use cms_sync::shared::operation::Collection;
use cms_sync::{NetworkMonitor, NetworkStatus, OperationEnvelope, SyncError, SyncNotice};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_offline_write_syncs_after_reconnect() {
    let mut t = test_service(ScriptedDispatcher::accepting(), NetworkMonitor::offline());
    let mut notices = t.service.subscribe();
    assert_ok!(t.service.start());

    let envelope = OperationEnvelope::new("CREATE_PROJECT", json!({ "name": "Tower A" }));
    assert!(t.service.queue_envelope(envelope).is_some());
    assert_stats!(t.service.stats(), total: 1, pending: 1, retry: 0, failed: 0);

    t.network.set_status(NetworkStatus::Online);

    // Stabilisation delay before the drain
    tokio::time::sleep(Duration::from_millis(1_900)).await;
    assert_eq!(t.dispatcher.call_count(), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(t.dispatcher.call_count(), 1);
    assert_stats!(t.service.stats(), total: 0, pending: 0, retry: 0, failed: 0);

    assert_eq!(
        drain_notices(&mut notices),
        vec![
            SyncNotice::QueuedOffline { queued: 1 },
            SyncNotice::ConnectionRestored { queued: 1 },
            SyncNotice::Synced { count: 1 },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_rejected_items_end_in_failed_ledger() {
    let mut t = test_service(ScriptedDispatcher::rejecting("503 Service Unavailable"), NetworkMonitor::online());
    let mut notices = t.service.subscribe();
    assert_ok!(t.service.start());

    for name in ["A", "B", "C"] {
        t.service.queue_operation(create_project(name));
    }

    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_stats!(t.service.stats(), total: 3, pending: 0, retry: 0, failed: 3);
    assert!(t.service.stats().needs_attention);
    assert_eq!(t.dispatcher.call_count(), 9);

    let failed = t.service.failed_items();
    assert!(failed.iter().all(|item| item.retries == 3));
    assert_contains!(failed[0].last_error.as_deref().unwrap_or_default(), "503");

    let notices = drain_notices(&mut notices);
    assert!(notices.contains(&SyncNotice::SyncFailed { count: 3 }));
    assert!(!t.service.is_drain_scheduled());
}

#[tokio::test(start_paused = true)]
async fn test_write_burst_during_outage_keeps_backoff() {
    let mut t = test_service(ScriptedDispatcher::rejecting("503 Service Unavailable"), NetworkMonitor::online());
    assert_ok!(t.service.start());

    for name in ["A", "B", "C"] {
        t.service.queue_operation(create_project(name));
    }

    // The three enqueues share one pass
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(t.dispatcher.call_count(), 3);
    assert_stats!(t.service.stats(), total: 3, pending: 0, retry: 3, failed: 0);

    // One failure each: the 3s entry applies
    tokio::time::sleep(Duration::from_millis(2_880)).await;
    assert_eq!(t.dispatcher.call_count(), 3);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(t.dispatcher.call_count(), 6);
    assert_stats!(t.service.stats(), total: 3, pending: 0, retry: 3, failed: 0);

    // Two failures each: the 10s entry applies
    tokio::time::sleep(Duration::from_millis(9_800)).await;
    assert_eq!(t.dispatcher.call_count(), 6);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(t.dispatcher.call_count(), 9);
    assert_stats!(t.service.stats(), total: 3, pending: 0, retry: 0, failed: 3);
}

#[tokio::test(start_paused = true)]
async fn test_new_write_does_not_retry_items_in_backoff() {
    let mut t = test_service(ScriptedDispatcher::rejecting("timeout"), NetworkMonitor::online());
    assert_ok!(t.service.start());

    t.service.queue_operation(create_project("A"));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(t.dispatcher.call_count(), 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    t.service.queue_operation(create_project("B"));
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Only the new write was attempted; A still waits for its timer
    assert_eq!(t.dispatcher.call_count(), 2);
    let retries: Vec<u32> = t.service.items().iter().map(|item| item.retries).collect();
    assert_eq!(retries, vec![1, 1]);
    assert!(t.service.is_drain_scheduled());

    // A's timer was not pushed back by B's failure
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(t.dispatcher.call_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_retry_follows_backoff_table() {
    let dispatcher = ScriptedDispatcher::accepting().then(Outcome::reject("timeout"));
    let mut t = test_service(dispatcher, NetworkMonitor::online());
    assert_ok!(t.service.start());

    t.service.queue_operation(create_project("Tower A"));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(t.dispatcher.call_count(), 1);
    assert_stats!(t.service.stats(), total: 1, pending: 0, retry: 1, failed: 0);

    // One failed attempt: the second table entry applies
    tokio::time::sleep(Duration::from_millis(2_900)).await;
    assert_eq!(t.dispatcher.call_count(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(t.dispatcher.call_count(), 2);
    assert_stats!(t.service.stats(), total: 0, pending: 0, retry: 0, failed: 0);
}

#[tokio::test(start_paused = true)]
async fn test_going_offline_cancels_pending_retry() {
    let dispatcher = ScriptedDispatcher::accepting().then(Outcome::reject("timeout"));
    let mut t = test_service(dispatcher, NetworkMonitor::online());
    let mut notices = t.service.subscribe();
    assert_ok!(t.service.start());

    t.service.queue_operation(create_project("Tower A"));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(t.service.is_drain_scheduled());

    t.network.set_status(NetworkStatus::Offline);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(t.dispatcher.call_count(), 1);
    assert!(drain_notices(&mut notices).contains(&SyncNotice::ConnectionLost));

    t.network.set_status(NetworkStatus::Online);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(t.dispatcher.call_count(), 2);
    assert!(!t.service.stats().has_items);
}

#[tokio::test]
async fn test_success_is_not_redelivered() {
    let t = test_service(ScriptedDispatcher::accepting(), NetworkMonitor::online());
    t.service.queue_operation(create_project("A"));
    t.service.queue_operation(log_attendance("e-1", "2024-05-02"));

    let report = assert_ok!(t.service.manual_sync().await).expect("pass should run");
    assert_eq!(report.succeeded_count(), 2);
    assert!(assert_ok!(t.service.manual_sync().await).is_none());
    assert_eq!(t.dispatcher.call_count(), 2);
}

#[tokio::test]
async fn test_manual_sync_offline() {
    let t = test_service(ScriptedDispatcher::accepting(), NetworkMonitor::offline());
    t.service.queue_operation(create_project("A"));
    assert_err!(t.service.manual_sync().await, SyncError::NoConnection);
}

#[tokio::test]
async fn test_drain_preserves_queue_order() {
    let t = test_service(ScriptedDispatcher::accepting(), NetworkMonitor::offline());
    t.service.queue_operation(create_project("first"));
    t.service.queue_operation(log_attendance("e-1", "2024-05-02"));
    t.service.queue_operation(create_project("third"));

    t.network.set_status(NetworkStatus::Online);
    assert_ok!(t.service.manual_sync().await);

    let kinds: Vec<String> = t
        .dispatcher
        .calls()
        .iter()
        .map(|op| op.kind().to_string())
        .collect();
    assert_eq!(kinds, vec!["CREATE_PROJECT", "LOG_ATTENDANCE", "CREATE_PROJECT"]);
}

#[tokio::test]
async fn test_retry_failed_requeues_and_delivers() {
    let t = test_service(ScriptedDispatcher::rejecting("down"), NetworkMonitor::online());
    t.service.queue_operation(create_project("A"));
    for _ in 0..3 {
        assert_ok!(t.service.manual_sync().await);
    }
    assert_stats!(t.service.stats(), total: 1, pending: 0, retry: 0, failed: 1);
    assert_eq!(t.service.pending_overlays(Collection::Projects), 0);

    t.dispatcher.set_fallback(Outcome::Accept);
    assert_eq!(assert_ok!(t.service.retry_failed()), 1);
    assert_stats!(t.service.stats(), total: 1, pending: 1, retry: 0, failed: 0);
    assert_eq!(t.service.pending_overlays(Collection::Projects), 1);

    let report = assert_ok!(t.service.manual_sync().await).expect("pass should run");
    assert_eq!(report.succeeded_count(), 1);
    assert!(!t.service.stats().has_items);
}

#[tokio::test]
async fn test_permanent_failure_rolls_back_overlay() {
    let t = test_service(ScriptedDispatcher::rejecting("forbidden"), NetworkMonitor::online());
    let base = json!([{ "_id": "p-1", "name": "Existing" }]);

    t.service.queue_operation(create_project("New"));
    assert_eq!(
        t.service.view(Collection::Projects, &base).as_array().map(Vec::len),
        Some(2)
    );

    for _ in 0..3 {
        assert_ok!(t.service.manual_sync().await);
    }
    assert_eq!(t.service.view(Collection::Projects, &base), base);
}

#[tokio::test]
async fn test_stale_overlay_is_dropped_and_counted() {
    let t = test_service(ScriptedDispatcher::accepting(), NetworkMonitor::offline());
    let delete = cms_sync::Operation::DeleteRecord(cms_sync::shared::operation::RecordDeletion {
        collection: Collection::Inventory,
        id: "gone".to_string(),
    });
    t.service.queue_operation(delete);

    let base = json!([{ "_id": "kept" }]);
    assert_eq!(t.service.view(Collection::Inventory, &base), base);
    assert_eq!(t.service.metrics().dropped_optimistic, 1);
}
