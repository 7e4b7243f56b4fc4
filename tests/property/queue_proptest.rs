//! Property-based tests for the offline queue and drain passes

use crate::common::*;
use cms_sync::offline::{OfflineQueue, QueueStatus};
use cms_sync::shared::clock::SystemClock;
use cms_sync::sync::SyncProcessor;
use cms_sync::{LocalStorage, MemoryStorage, NetworkMonitor, SyncConfig};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn config(max_retries: u32) -> SyncConfig {
    SyncConfig::builder().max_retries(max_retries).build().unwrap()
}

proptest! {
    #[test]
    fn test_reload_is_idempotent(
        names in prop::collection::vec("[a-zA-Z ]{1,12}", 0..8),
        failures in prop::collection::vec(0u32..4, 0..8),
    ) {
        let config = SyncConfig::default();
        let storage = Arc::new(MemoryStorage::new());
        let mut queue = OfflineQueue::load(storage.clone(), &config);

        let mut ids = Vec::new();
        for name in &names {
            let envelope = create_project(name).to_envelope().unwrap();
            ids.push(queue.enqueue(envelope, chrono::Utc::now()).unwrap());
        }
        for (id, count) in ids.iter().zip(&failures) {
            for _ in 0..*count {
                queue
                    .update(id, |item| {
                        item.mark_failed("timeout", chrono::Utc::now(), config.max_retries);
                    })
                    .unwrap();
            }
        }
        queue.cleanup().unwrap();
        queue.persist().unwrap();
        let first = (storage.get(&config.queue_key), storage.get(&config.failed_queue_key));

        let reloaded = OfflineQueue::load(storage.clone(), &config);
        reloaded.persist().unwrap();
        let second = (storage.get(&config.queue_key), storage.get(&config.failed_queue_key));

        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_retries_grow_until_failed(max_retries in 1u32..6) {
        let config = config(max_retries);
        let queue = Mutex::new(OfflineQueue::load(Arc::new(MemoryStorage::new()), &config));
        queue
            .lock()
            .enqueue(create_project("A").to_envelope().unwrap(), chrono::Utc::now())
            .unwrap();

        let dispatcher = ScriptedDispatcher::rejecting("down");
        let processor = SyncProcessor::new();
        let network = NetworkMonitor::online();
        let rt = runtime();

        for attempt in 1..=max_retries {
            let report = rt
                .block_on(processor.drain(&queue, &dispatcher, &network, &SystemClock, &config))
                .unwrap();
            let queue = queue.lock();
            if attempt < max_retries {
                let item = &queue.items()[0];
                prop_assert_eq!(item.retries, attempt);
                prop_assert_eq!(item.status, QueueStatus::Retry);
            } else {
                prop_assert_eq!(report.failed_count(), 1);
                prop_assert!(queue.is_empty());
                let failed = &queue.failed_items()[0];
                prop_assert_eq!(failed.retries, max_retries);
                prop_assert_eq!(failed.status, QueueStatus::Failed);
            }
        }

        // Nothing left to attempt
        let extra = rt.block_on(processor.drain(&queue, &dispatcher, &network, &SystemClock, &config));
        prop_assert!(extra.is_none());
        prop_assert_eq!(dispatcher.call_count(), max_retries as usize);
    }

    #[test]
    fn test_success_on_attempt_k_is_final(k in 1u32..4) {
        let config = SyncConfig::default();
        let queue = Mutex::new(OfflineQueue::load(Arc::new(MemoryStorage::new()), &config));
        queue
            .lock()
            .enqueue(create_project("A").to_envelope().unwrap(), chrono::Utc::now())
            .unwrap();

        let mut dispatcher = ScriptedDispatcher::accepting();
        for _ in 1..k {
            dispatcher = dispatcher.then(Outcome::reject("flaky"));
        }
        let processor = SyncProcessor::new();
        let network = NetworkMonitor::online();
        let rt = runtime();

        for _ in 0..(k + 2) {
            rt.block_on(processor.drain(&queue, &dispatcher, &network, &SystemClock, &config));
        }

        prop_assert_eq!(dispatcher.call_count(), k as usize);
        prop_assert!(queue.lock().is_empty());
        prop_assert!(queue.lock().failed_items().is_empty());
    }
}
