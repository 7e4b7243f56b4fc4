//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Scripted remote mocks that record every call
//! - Fixtures for operations, storage and services
//! - Custom assertion macros

pub mod assertions;
pub mod fixtures;
pub mod mocks;

// Re-export commonly used utilities
pub use assertions::*;
pub use fixtures::*;
pub use mocks::*;
