//! Remote mutation interface consumed by the sync processor.
//!
//! Implementations route each [`Operation`] variant to the matching remote
//! mutation (project creation, attendance logging, dispatch creation, ...).
//! Matching on `Operation` is exhaustive, so adding a kind forces every
//! dispatcher to handle it.

use crate::shared::operation::Operation;
use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

/// Rejection reported by the remote side
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    /// Human-readable error message
    pub message: String,
}

impl RemoteError {
    /// Create a new remote error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Applies operations against the remote store
pub trait MutationDispatcher: Send + Sync {
    /// Apply `operation`, resolving to the remote result
    fn invoke<'a>(&'a self, operation: &'a Operation) -> BoxFuture<'a, Result<Value, RemoteError>>;
}

/// Dispatcher backed by a closure
pub struct FnDispatcher<F> {
    f: F,
}

impl<F> FnDispatcher<F>
where
    F: Fn(&Operation) -> BoxFuture<'static, Result<Value, RemoteError>> + Send + Sync,
{
    /// Wrap `f`
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> MutationDispatcher for FnDispatcher<F>
where
    F: Fn(&Operation) -> BoxFuture<'static, Result<Value, RemoteError>> + Send + Sync,
{
    fn invoke<'a>(&'a self, operation: &'a Operation) -> BoxFuture<'a, Result<Value, RemoteError>> {
        (self.f)(operation)
    }
}
