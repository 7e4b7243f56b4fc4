//! Custom assertion macros and utilities
//!
//! Provides assertion macros for results, queue statistics and notices with
//! more descriptive failure messages.

/// Assert that a result is ok and return the value
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $message:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $message, e),
        }
    };
}

/// Assert that a result is an error, optionally of a given shape
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        assert!($result.is_err(), "Expected Err, got Ok");
    };
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => {}
            Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
            Err(e) => panic!("Expected different error variant, got: {:?}", e),
        }
    };
}

/// Assert that a string contains a substring
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        assert!(
            $haystack.contains($needle),
            "Expected '{}' to contain '{}'",
            $haystack,
            $needle
        );
    };
}

/// Assert queue counts as `total, pending, retry, failed`
#[macro_export]
macro_rules! assert_stats {
    ($stats:expr, total: $total:expr, pending: $pending:expr, retry: $retry:expr, failed: $failed:expr) => {{
        let stats = $stats;
        assert_eq!(
            (stats.total, stats.pending, stats.retry, stats.failed),
            ($total, $pending, $retry, $failed),
            "unexpected queue stats {:?}",
            stats
        );
    }};
}

/// Drain every notice currently buffered in a broadcast receiver
pub fn drain_notices(
    receiver: &mut tokio::sync::broadcast::Receiver<cms_sync::SyncNotice>,
) -> Vec<cms_sync::SyncNotice> {
    let mut notices = Vec::new();
    while let Ok(notice) = receiver.try_recv() {
        notices.push(notice);
    }
    notices
}
