//! Integration tests

pub mod migration_test;
pub mod offline_sync_test;
pub mod persistence_test;
