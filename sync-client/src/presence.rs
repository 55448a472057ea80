//! Presence Tracker.
//!
//! Watches a session's member list and reports the device count on every
//! change. An absent list counts as zero devices.

use serde_json::Value;
use std::sync::Arc;
use sync_core::{paths, Presence};
use sync_types::{DeviceId, SessionCode};
use tracing::warn;

use crate::store::{RemoteStore, StoreError, Subscription};

/// Subscribes to presence changes for one session.
#[derive(Debug)]
pub struct PresenceTracker<S: RemoteStore> {
    store: Arc<S>,
}

impl<S: RemoteStore> PresenceTracker<S> {
    /// Create a tracker over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Call `on_change` with the current presence now and after every change
    /// to the member list of `code`.
    pub fn watch<F>(&self, code: &SessionCode, on_change: F) -> Result<Subscription, StoreError>
    where
        F: Fn(Presence) + Send + Sync + 'static,
    {
        let session = code.clone();
        self.store.subscribe(
            &paths::device_ids(code),
            Arc::new(move |value| on_change(decode_presence(&session, value))),
        )
    }
}

/// Presence from the raw member list.
///
/// Entries that are not valid device ids still count: presence is list
/// length, not identity.
pub fn decode_presence(code: &SessionCode, value: Option<Value>) -> Presence {
    match value {
        None => Presence::from_count(0),
        Some(Value::Array(items)) => {
            let valid = items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| DeviceId::parse(s).is_ok())
                .count();
            if valid != items.len() {
                warn!(code = %code, entries = items.len(), valid, "Malformed member list entries");
            }
            Presence::from_count(items.len())
        }
        Some(other) => {
            warn!(code = %code, kind = value_kind(&other), "Member list is not an array");
            Presence::from_count(0)
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
