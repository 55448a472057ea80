//! The shared session record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{DeviceId, Event, EventId};

/// The record stored at `sessions/{code}`.
///
/// `device_ids` is duplicate-free and unordered. When the last member
/// leaves the field is removed from the store rather than written as an
/// empty list, so it deserializes to an empty vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Epoch milliseconds when the creator wrote the record.
    pub created_at: i64,
    /// `created_at` plus the session TTL.
    pub expires_at: i64,
    /// Devices currently attached.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_ids: Vec<DeviceId>,
    /// The event log, keyed by event id.
    #[serde(
        default,
        rename = "contractions",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub events: BTreeMap<EventId, Event>,
}

impl SessionRecord {
    /// A fresh record with `creator` as the only member and no events.
    pub fn new(creator: DeviceId, created_at: i64, ttl_ms: i64) -> Self {
        Self {
            created_at,
            expires_at: created_at + ttl_ms,
            device_ids: vec![creator],
            events: BTreeMap::new(),
        }
    }

    /// Whether `device` is currently a member.
    pub fn has_member(&self, device: &DeviceId) -> bool {
        self.device_ids.contains(device)
    }
}
