//! Remote store abstraction for LaborSync.
//!
//! This module provides a pluggable adapter over a hierarchical,
//! path-addressable real-time store. The core never talks to a concrete
//! backend; it is handed an implementation of [`RemoteStore`] once and
//! passes it down explicitly.
//!
//! # Contract
//!
//! - `write(path, value)` replaces the value at `path`; values containing
//!   `null` are rejected with [`StoreError::MalformedWrite`]
//! - `read(path)` returns the current value or `None` when absent
//! - `delete(path)` removes the value; deleting an absent path is a no-op
//! - `subscribe(path, listener)` invokes `listener` with the full current
//!   value at `path` (not a diff) whenever it changes, and returns a
//!   [`Subscription`] that detaches the listener exactly once
//!
//! # Example
//!
//! ```ignore
//! let store = MemoryStore::new();
//! store.write("sessions/AB12CD/deviceIds", json!(["device_1_abcdefg"])).await?;
//! let sub = store.subscribe("sessions/AB12CD", Arc::new(|value| println!("{value:?}")))?;
//! sub.unsubscribe();
//! ```

mod memory;
pub(crate) mod tree;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A write was refused or lost.
    #[error("write failed at {path}: {reason}")]
    WriteFailed {
        /// Target path.
        path: String,
        /// Backend message.
        reason: String,
    },

    /// A read failed.
    #[error("read failed at {path}: {reason}")]
    ReadFailed {
        /// Target path.
        path: String,
        /// Backend message.
        reason: String,
    },

    /// The value contained an absent (`null`) field.
    #[error("malformed write at {path}: absent values are not allowed")]
    MalformedWrite {
        /// Target path.
        path: String,
    },

    /// The path is empty or has an empty segment.
    #[error("invalid path: {0:?}")]
    InvalidPath(String),
}

/// Callback invoked with the full value at a subscribed path.
pub type Listener = Arc<dyn Fn(Option<Value>) + Send + Sync>;

/// Handle to a live subscription.
///
/// The listener is detached either by [`Subscription::unsubscribe`] or when
/// the handle is dropped, whichever comes first; the release runs once.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Wrap a release function.
    pub fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Detach the listener now. No callback runs after this returns.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Remote store trait.
///
/// Implementations handle the underlying backend (a hosted real-time
/// database, a shared file, memory for tests).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Replace the value at `path`.
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Read the value at `path`.
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Remove the value at `path`. Absent paths are a no-op.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Listen for changes at `path`.
    ///
    /// The listener fires once with the current value right away, then
    /// again on every change.
    fn subscribe(&self, path: &str, listener: Listener) -> Result<Subscription, StoreError>;
}
