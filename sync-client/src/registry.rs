//! Session Registry.
//!
//! Creates, validates, joins and leaves pairing sessions on the remote
//! store. Expiry rules live in `sync_core::registry`; this module does
//! the reads and writes.

use serde_json::Value;
use std::sync::Arc;
use sync_core::{add_member, check_joinable, paths, remove_member, Membership, SessionRejection};
use sync_types::{DeviceId, SessionCode, SessionRecord};
use thiserror::Error;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::store::{RemoteStore, StoreError};

/// Session registry errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No record exists at the code.
    #[error("session {0} not found")]
    NotFound(SessionCode),

    /// The record exists but its TTL elapsed.
    #[error("session {code} expired at {expired_at}")]
    Expired {
        /// The code that was checked.
        code: SessionCode,
        /// Epoch milliseconds when it stopped being joinable.
        expired_at: i64,
    },

    /// The text is not a session code.
    #[error("invalid session code: {0:?}")]
    InvalidCode(String),

    /// The stored record could not be decoded.
    #[error("session {code} is corrupt: {reason}")]
    Corrupt {
        /// The affected session.
        code: SessionCode,
        /// Decoder message.
        reason: String,
    },

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Encoding a record failed.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SessionError {
    fn rejected(code: &SessionCode, rejection: SessionRejection) -> Self {
        match rejection {
            SessionRejection::NotFound => Self::NotFound(code.clone()),
            SessionRejection::Expired { expired_at } => Self::Expired {
                code: code.clone(),
                expired_at,
            },
        }
    }

    /// The session does not exist or can no longer be joined.
    ///
    /// Callers surface both cases identically.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Expired { .. })
    }
}

/// Session lifecycle operations for one device.
#[derive(Debug)]
pub struct SessionRegistry<S: RemoteStore> {
    store: Arc<S>,
    device: DeviceId,
    clock: Arc<dyn Clock>,
    ttl_ms: i64,
}

impl<S: RemoteStore> SessionRegistry<S> {
    /// Create a registry acting as `device`.
    pub fn new(store: Arc<S>, device: DeviceId, clock: Arc<dyn Clock>, ttl_ms: i64) -> Self {
        Self {
            store,
            device,
            clock,
            ttl_ms,
        }
    }

    /// Write a fresh session with this device as the only member.
    ///
    /// Overwrites any record already at `code` (last writer wins).
    pub async fn create(&self, code: &SessionCode) -> Result<SessionRecord, SessionError> {
        let record = SessionRecord::new(self.device.clone(), self.clock.now_ms(), self.ttl_ms);
        let value = serde_json::to_value(&record)?;
        self.store.write(&paths::session(code), value).await?;
        info!(code = %code, expires_at = record.expires_at, "Session created");
        Ok(record)
    }

    /// Read the session record at `code`, without its events.
    pub async fn fetch(&self, code: &SessionCode) -> Result<Option<SessionRecord>, SessionError> {
        let Some(value) = self.store.read(&paths::session(code)).await? else {
            return Ok(None);
        };
        decode_record(code, value).map(Some)
    }

    /// Read-only validity check: the record exists and has not expired.
    pub async fn check(&self, code: &SessionCode) -> Result<SessionRecord, SessionError> {
        let record = self.fetch(code).await?;
        check_joinable(record.as_ref(), self.clock.now_ms())
            .map_err(|rejection| SessionError::rejected(code, rejection))?;
        record.ok_or_else(|| SessionError::NotFound(code.clone()))
    }

    /// Join the session at `code`, adding this device to its members.
    pub async fn join(&self, code: &SessionCode) -> Result<SessionRecord, SessionError> {
        let mut record = self.check(code).await?;
        if let Some(members) = add_member(&record.device_ids, &self.device) {
            let value = serde_json::to_value(&members)?;
            self.store.write(&paths::device_ids(code), value).await?;
            record.device_ids = members;
        }
        info!(code = %code, members = record.device_ids.len(), "Joined session");
        Ok(record)
    }

    /// Remove this device from the session's members.
    ///
    /// When nobody is left the field is deleted rather than written empty.
    pub async fn leave(&self, code: &SessionCode) -> Result<(), SessionError> {
        let path = paths::device_ids(code);
        let members: Vec<DeviceId> = match self.store.read(&path).await? {
            Some(value) => serde_json::from_value(value).map_err(|e| SessionError::Corrupt {
                code: code.clone(),
                reason: e.to_string(),
            })?,
            None => Vec::new(),
        };

        match remove_member(&members, &self.device) {
            Membership::Members(remaining) => {
                debug!(code = %code, remaining = remaining.len(), "Leaving session");
                self.store
                    .write(&path, serde_json::to_value(&remaining)?)
                    .await?;
            }
            Membership::Empty => {
                debug!(code = %code, "Last member leaving session");
                self.store.delete(&path).await?;
            }
        }
        info!(code = %code, "Left session");
        Ok(())
    }

    /// The device this registry acts as.
    pub fn device(&self) -> &DeviceId {
        &self.device
    }
}

/// Decode the membership and lifetime fields of a record.
///
/// The event map is the event log's concern and is not decoded here, so a
/// malformed event never makes a session unjoinable.
fn decode_record(code: &SessionCode, mut value: Value) -> Result<SessionRecord, SessionError> {
    if let Some(object) = value.as_object_mut() {
        object.remove(paths::EVENTS_KEY);
    }
    serde_json::from_value(value).map_err(|e| SessionError::Corrupt {
        code: code.clone(),
        reason: e.to_string(),
    })
}
