//! # Synced Value
//!
//! A single server-backed value with optimistic local writes.
//!
//! ## Features
//!
//! - **Optimistic Writes**: `set` shows the new value immediately
//! - **Automatic Revert**: A rejected save restores the previous view and
//!   broadcasts [`SyncNotice::UpdateFailed`]
//! - **Offline Fallback**: Optionally mirrors the last written value into
//!   local storage so it can be shown before the server value arrives
//!
//! The overlay is cleared as soon as the server publishes any new value. With
//! several writers a newer server value from someone else replaces a local
//! write that is still in flight; the subscription is assumed to have a
//! single writer per value.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cms_sync::offline::synced_value::{SyncedValue, ValueMutation};
//! use cms_sync::sync::dispatcher::RemoteError;
//! use futures_util::future::{BoxFuture, FutureExt};
//! use tokio::sync::watch;
//!
//! struct SaveTheme;
//!
//! impl ValueMutation<String> for SaveTheme {
//!     fn save(&self, _value: String) -> BoxFuture<'_, Result<(), RemoteError>> {
//!         async { Ok(()) }.boxed()
//!     }
//! }
//!
//! # async fn example() -> cms_sync::Result<()> {
//! let (_server, subscription) = watch::channel(None::<String>);
//! let mut theme = SyncedValue::new("theme", subscription, "light".to_string(), SaveTheme);
//! theme.set("dark".to_string()).await?;
//! assert_eq!(theme.get(), "dark");
//! # Ok(())
//! # }
//! ```

use crate::shared::config::SyncConfig;
use crate::shared::error::{Result, SyncError};
use crate::shared::event::SyncNotice;
use crate::storage::{LocalStorage, FALLBACK_PREFIX};
use crate::sync::dispatcher::RemoteError;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Remote write for a [`SyncedValue`]
pub trait ValueMutation<T>: Send + Sync {
    /// Persist `value` on the server
    fn save(&self, value: T) -> BoxFuture<'_, std::result::Result<(), RemoteError>>;
}

/// Server value with an optimistic local overlay
pub struct SyncedValue<T> {
    name: String,
    server: watch::Receiver<Option<T>>,
    optimistic: Option<T>,
    default: T,
    mutation: Arc<dyn ValueMutation<T>>,
    fallback: Option<Arc<dyn LocalStorage>>,
    notices: broadcast::Sender<SyncNotice>,
}

impl<T> SyncedValue<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Wrap a server subscription; `default` is shown until a value is known
    pub fn new(
        name: impl Into<String>,
        server: watch::Receiver<Option<T>>,
        default: T,
        mutation: impl ValueMutation<T> + 'static,
    ) -> Self {
        let (notices, _) = broadcast::channel(16);
        Self {
            name: name.into(),
            server,
            optimistic: None,
            default,
            mutation: Arc::new(mutation),
            fallback: None,
            notices,
        }
    }

    /// Like [`SyncedValue::new`], attaching the offline fallback when the
    /// configuration enables it
    pub fn from_config(
        name: impl Into<String>,
        server: watch::Receiver<Option<T>>,
        default: T,
        mutation: impl ValueMutation<T> + 'static,
        storage: Arc<dyn LocalStorage>,
        config: &SyncConfig,
    ) -> Self {
        let value = Self::new(name, server, default, mutation);
        if config.offline_fallback {
            value.with_offline_fallback(storage)
        } else {
            value
        }
    }

    /// Mirror written values into `storage`
    pub fn with_offline_fallback(mut self, storage: Arc<dyn LocalStorage>) -> Self {
        self.fallback = Some(storage);
        self
    }

    /// Name of the value
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage key of the fallback copy
    pub fn fallback_key(&self) -> String {
        format!("{}{}", FALLBACK_PREFIX, self.name)
    }

    /// Current view: optimistic write, then server value, then the fallback
    /// copy, then the default
    pub fn get(&mut self) -> T {
        self.reconcile();
        if let Some(value) = &self.optimistic {
            return value.clone();
        }
        if let Some(value) = self.server.borrow().as_ref() {
            return value.clone();
        }
        self.read_fallback().unwrap_or_else(|| self.default.clone())
    }

    /// Latest value published by the server
    pub fn server_value(&self) -> Option<T> {
        self.server.borrow().clone()
    }

    /// Whether a local write is still shown over the server value
    pub fn has_pending_write(&mut self) -> bool {
        self.reconcile();
        self.optimistic.is_some()
    }

    /// Write `value` optimistically and persist it remotely
    pub async fn set(&mut self, value: T) -> Result<()> {
        self.reconcile();
        let previous_fallback = self.fallback_raw();
        self.optimistic = Some(value.clone());
        self.write_fallback(&value);

        match self.mutation.save(value).await {
            Ok(()) => {
                tracing::debug!(name = %self.name, "value saved");
                Ok(())
            }
            Err(e) => {
                self.optimistic = None;
                self.restore_fallback(previous_fallback);
                tracing::warn!(name = %self.name, error = %e, "save failed, reverting");
                let _ = self.notices.send(SyncNotice::UpdateFailed {
                    message: e.message.clone(),
                });
                Err(SyncError::update_failed(e.message))
            }
        }
    }

    /// Write a value derived from the current view
    pub async fn update<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.get();
        self.set(f(&current)).await
    }

    /// Subscribe to failure notices
    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotice> {
        self.notices.subscribe()
    }

    /// Drop the overlay once the server has published something new
    fn reconcile(&mut self) {
        if self.server.has_changed().unwrap_or(false) {
            self.server.borrow_and_update();
            if self.optimistic.take().is_some() {
                tracing::debug!(name = %self.name, "server value arrived, clearing overlay");
            }
        }
    }

    fn fallback_raw(&self) -> Option<String> {
        self.fallback.as_ref()?.get(&self.fallback_key())
    }

    fn read_fallback(&self) -> Option<T> {
        let raw = self.fallback_raw()?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(name = %self.name, error = %e, "ignoring unreadable fallback copy");
                None
            }
        }
    }

    fn write_fallback(&self, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.restore_fallback(Some(raw)),
            Err(e) => tracing::warn!(name = %self.name, error = %e, "failed to encode fallback copy"),
        }
    }

    /// Put back the fallback copy exactly as it was stored
    fn restore_fallback(&self, raw: Option<String>) {
        let Some(storage) = &self.fallback else {
            return;
        };
        let key = self.fallback_key();
        let result = match raw {
            Some(raw) => storage.set(&key, &raw),
            None => storage.remove(&key),
        };
        if let Err(e) = result {
            tracing::warn!(name = %self.name, error = %e, "failed to update fallback copy");
        }
    }
}
