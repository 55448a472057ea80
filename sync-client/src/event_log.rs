//! Event Log.
//!
//! Reads and writes one session's events on the remote store. Writes are
//! fire-and-forget: failures are logged and the mutation is lost from the
//! remote log. There is no retry and no outbox.

use serde_json::{Map, Value};
use std::sync::Arc;
use sync_core::paths;
use sync_types::{sort_newest_first, DeviceId, Event, EventId, EventPatch, SessionCode, SyncError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::store::{RemoteStore, StoreError, Subscription};

/// Event log errors. Only surfaced by the `try_*` methods.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The event could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] SyncError),

    /// The stored value is not an event object.
    #[error("stored event {0} is not an object")]
    NotAnObject(EventId),
}

/// The event log of one session, as seen by one device.
#[derive(Debug)]
pub struct EventLog<S: RemoteStore> {
    store: Arc<S>,
    code: SessionCode,
    device: DeviceId,
    clock: Arc<dyn Clock>,
}

impl<S: RemoteStore> EventLog<S> {
    /// Open the log of session `code`, writing as `device`.
    pub fn new(store: Arc<S>, code: SessionCode, device: DeviceId, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            code,
            device,
            clock,
        }
    }

    /// The session this log belongs to.
    pub fn code(&self) -> &SessionCode {
        &self.code
    }

    /// Write the full event, stamping authorship if missing.
    pub async fn put_event(&self, event: &Event) {
        if let Err(e) = self.try_put_event(event).await {
            warn!(code = %self.code, id = %event.id, error = %e, "Event write lost");
        }
    }

    /// [`EventLog::put_event`], reporting the failure.
    pub async fn try_put_event(&self, event: &Event) -> Result<(), EventLogError> {
        let mut event = event.clone();
        event.stamp(&self.device, self.clock.now_ms());
        let value = sanitize(event.to_value()?);
        self.store
            .write(&paths::event(&self.code, &event.id), value)
            .await?;
        debug!(code = %self.code, id = %event.id, "Event written");
        Ok(())
    }

    /// Read the stored event, shallow-merge `patch` over it and write it back.
    ///
    /// Not atomic: a concurrent write between the read and the write is
    /// overwritten. An event that does not exist is left absent.
    pub async fn update_event(&self, id: &EventId, patch: &EventPatch) {
        if let Err(e) = self.try_update_event(id, patch).await {
            warn!(code = %self.code, id = %id, error = %e, "Event update lost");
        }
    }

    /// [`EventLog::update_event`], reporting the failure.
    pub async fn try_update_event(
        &self,
        id: &EventId,
        patch: &EventPatch,
    ) -> Result<(), EventLogError> {
        let path = paths::event(&self.code, id);
        let mut object: Map<String, Value> = match self.store.read(&path).await? {
            Some(Value::Object(object)) => object,
            Some(_) => return Err(EventLogError::NotAnObject(id.clone())),
            None => {
                debug!(code = %self.code, id = %id, "Update of absent event skipped");
                return Ok(());
            }
        };
        patch.merge_into(&mut object);
        self.store
            .write(&path, sanitize(Value::Object(object)))
            .await?;
        debug!(code = %self.code, id = %id, "Event updated");
        Ok(())
    }

    /// Remove an event. Absent ids are a no-op.
    pub async fn delete_event(&self, id: &EventId) {
        if let Err(e) = self.store.delete(&paths::event(&self.code, id)).await {
            warn!(code = %self.code, id = %id, error = %e, "Event delete lost");
        }
    }

    /// Remove the whole event subtree in one operation.
    pub async fn clear_all_events(&self) {
        if let Err(e) = self.try_clear_all_events().await {
            warn!(code = %self.code, error = %e, "Event log clear lost");
        }
    }

    /// [`EventLog::clear_all_events`], reporting the failure.
    pub async fn try_clear_all_events(&self) -> Result<(), EventLogError> {
        self.store.delete(&paths::events(&self.code)).await?;
        debug!(code = %self.code, "Event log cleared");
        Ok(())
    }

    /// Call `on_snapshot` with every event, newest first, now and after every
    /// change to the log.
    pub fn subscribe<F>(&self, on_snapshot: F) -> Result<Subscription, StoreError>
    where
        F: Fn(Vec<Event>) + Send + Sync + 'static,
    {
        let code = self.code.clone();
        self.store.subscribe(
            &paths::events(&self.code),
            Arc::new(move |value| on_snapshot(decode_snapshot(&code, value))),
        )
    }
}

/// Decode the stored event map into a list sorted newest first.
///
/// Entries that fail to decode are skipped. Every decoded event is marked
/// synced. The map key is the event's identity.
pub fn decode_snapshot(code: &SessionCode, value: Option<Value>) -> Vec<Event> {
    let entries = match value {
        None => return Vec::new(),
        Some(Value::Object(entries)) => entries,
        Some(_) => {
            warn!(code = %code, "Event log is not an object");
            return Vec::new();
        }
    };

    let mut events: Vec<Event> = entries
        .into_iter()
        .filter_map(|(key, value)| match Event::from_value(value) {
            Ok(mut event) => {
                if event.id.as_str() != key {
                    match EventId::parse(&key) {
                        Ok(id) => {
                            warn!(code = %code, key = %key, id = %event.id, "Event id differs from its key");
                            event.id = id;
                        }
                        Err(_) => return None,
                    }
                }
                event.synced = true;
                Some(event)
            }
            Err(e) => {
                warn!(code = %code, key = %key, error = %e, "Skipping malformed event");
                None
            }
        })
        .collect();
    sort_newest_first(&mut events);
    events
}

/// Strip `null` values, which the store refuses.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, sanitize(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(sanitize)
                .collect(),
        ),
        other => other,
    }
}
