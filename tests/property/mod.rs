//! Property-based tests

pub mod backup_proptest;
pub mod optimistic_proptest;
pub mod queue_proptest;
