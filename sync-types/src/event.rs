//! Timed events recorded in a session log.
//!
//! The stored representation uses camelCase keys and omits absent optional
//! fields entirely, so a serialized event never carries a `null`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::{DeviceId, EventId, SyncError};

/// Kind of entry in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A timed contraction.
    #[default]
    Contraction,
    /// Point-in-time marker: membranes ruptured.
    WaterBroke,
    /// Milestone: early labor began.
    LaborPhaseEarly,
    /// Milestone: active labor began.
    LaborPhaseActive,
    /// Milestone: transition began.
    LaborPhaseTransition,
}

impl EventType {
    /// The stored string form of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Contraction => "contraction",
            EventType::WaterBroke => "water_broke",
            EventType::LaborPhaseEarly => "labor_phase_early",
            EventType::LaborPhaseActive => "labor_phase_active",
            EventType::LaborPhaseTransition => "labor_phase_transition",
        }
    }

    /// Whether this type is a point-in-time marker rather than a contraction.
    pub fn is_marker(&self) -> bool {
        !matches!(self, EventType::Contraction)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contraction" => Ok(EventType::Contraction),
            "water_broke" => Ok(EventType::WaterBroke),
            "labor_phase_early" => Ok(EventType::LaborPhaseEarly),
            "labor_phase_active" => Ok(EventType::LaborPhaseActive),
            "labor_phase_transition" => Ok(EventType::LaborPhaseTransition),
            other => Err(SyncError::InvalidData(format!("unknown event type: {other}"))),
        }
    }
}

/// A single contraction or milestone marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique within a session, immutable once created.
    pub id: EventId,
    /// Epoch milliseconds.
    pub start_time: i64,
    /// Whole seconds; `None` while in progress or for markers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// Kind of entry.
    #[serde(rename = "type", default)]
    pub kind: EventType,
    /// Originating device, stamped on first write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_by: Option<DeviceId>,
    /// Epoch milliseconds at write time (client clock).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Local-only: the entry is known to the remote log. Never stored.
    #[serde(skip)]
    pub synced: bool,
}

impl Event {
    /// A contraction starting at `start_ms`, still in progress.
    pub fn contraction(start_ms: i64) -> Self {
        Self::new(EventId::new(), start_ms, EventType::Contraction)
    }

    /// A point-in-time marker at `at_ms`.
    pub fn marker(kind: EventType, at_ms: i64) -> Self {
        Self::new(EventId::new(), at_ms, kind)
    }

    /// An event with an explicit id.
    pub fn new(id: EventId, start_ms: i64, kind: EventType) -> Self {
        Self {
            id,
            start_time: start_ms,
            duration: None,
            kind,
            added_by: None,
            created_at: None,
            synced: false,
        }
    }

    /// Set the duration in seconds.
    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration = Some(secs);
        self
    }

    /// Derived end time: `start_time + duration * 1000`. Never stored.
    pub fn end_time(&self) -> Option<i64> {
        self.duration
            .map(|secs| self.start_time + i64::from(secs) * 1000)
    }

    /// A contraction that has been started but not ended.
    pub fn is_in_progress(&self) -> bool {
        self.kind == EventType::Contraction && self.duration.is_none()
    }

    /// End an in-progress contraction at `end_ms`, rounding to whole seconds.
    pub fn finish(&mut self, end_ms: i64) {
        let elapsed = (end_ms - self.start_time).max(0);
        let secs = (elapsed + 500) / 1000;
        self.duration = Some(u32::try_from(secs).unwrap_or(u32::MAX));
    }

    /// Fill in authorship fields that are not already set.
    pub fn stamp(&mut self, device: &DeviceId, now_ms: i64) {
        if self.added_by.is_none() {
            self.added_by = Some(device.clone());
        }
        if self.created_at.is_none() {
            self.created_at = Some(now_ms);
        }
    }

    /// Encode to the stored representation.
    pub fn to_value(&self) -> Result<Value, SyncError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode from the stored representation.
    pub fn from_value(value: Value) -> Result<Self, SyncError> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Sort events by start time, newest first. Ties break on id for stability.
pub fn sort_newest_first(events: &mut [Event]) {
    events.sort_by(|a, b| {
        b.start_time
            .cmp(&a.start_time)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// A partial update applied as a shallow merge over a stored event.
///
/// `duration: Some(None)` clears the duration (the key is removed).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPatch {
    /// New start time.
    pub start_time: Option<i64>,
    /// New duration, or `Some(None)` to clear it.
    pub duration: Option<Option<u32>>,
    /// New type.
    pub kind: Option<EventType>,
}

impl EventPatch {
    /// Patch that sets the duration.
    pub fn duration(secs: u32) -> Self {
        Self {
            duration: Some(Some(secs)),
            ..Self::default()
        }
    }

    /// Patch that clears the duration.
    pub fn clear_duration() -> Self {
        Self {
            duration: Some(None),
            ..Self::default()
        }
    }

    /// Also set the start time.
    pub fn with_start_time(mut self, start_ms: i64) -> Self {
        self.start_time = Some(start_ms);
        self
    }

    /// Also set the type.
    pub fn with_kind(mut self, kind: EventType) -> Self {
        self.kind = Some(kind);
        self
    }

    /// True if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.start_time.is_none() && self.duration.is_none() && self.kind.is_none()
    }

    /// Apply to an in-memory event.
    pub fn apply(&self, event: &mut Event) {
        if let Some(start) = self.start_time {
            event.start_time = start;
        }
        if let Some(duration) = self.duration {
            event.duration = duration;
        }
        if let Some(kind) = self.kind {
            event.kind = kind;
        }
    }

    /// Shallow-merge over a stored object. Keys not named by the patch are
    /// left untouched.
    pub fn merge_into(&self, object: &mut Map<String, Value>) {
        if let Some(start) = self.start_time {
            object.insert("startTime".into(), Value::from(start));
        }
        match self.duration {
            Some(Some(secs)) => {
                object.insert("duration".into(), Value::from(secs));
            }
            Some(None) => {
                object.remove("duration");
            }
            None => {}
        }
        if let Some(kind) = self.kind {
            object.insert("type".into(), Value::from(kind.as_str()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn c1() -> Event {
        Event::new(EventId::parse("c1").unwrap(), 1000, EventType::Contraction).with_duration(60)
    }

    #[test]
    fn end_time_is_derived() {
        assert_eq!(c1().end_time(), Some(61_000));
        assert_eq!(Event::contraction(1000).end_time(), None);
    }

    #[test]
    fn end_time_is_never_serialized() {
        let value = c1().to_value().unwrap();
        assert!(value.get("endTime").is_none());
    }

    #[test]
    fn absent_fields_are_omitted() {
        let value = Event::contraction(5).to_value().unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("duration"));
        assert!(!object.contains_key("addedBy"));
        assert!(!object.contains_key("createdAt"));
        assert!(!object.contains_key("synced"));
        assert!(object.values().all(|v| !v.is_null()));
    }

    #[test]
    fn stored_shape_uses_camel_case_and_snake_type() {
        let mut event = Event::marker(EventType::WaterBroke, 42);
        event.stamp(&DeviceId::parse("device_1_abcdefg").unwrap(), 99);
        let value = event.to_value().unwrap();
        assert_eq!(value["startTime"], json!(42));
        assert_eq!(value["type"], json!("water_broke"));
        assert_eq!(value["addedBy"], json!("device_1_abcdefg"));
        assert_eq!(value["createdAt"], json!(99));
    }

    #[test]
    fn missing_type_defaults_to_contraction() {
        let event = Event::from_value(json!({"id": "x", "startTime": 7})).unwrap();
        assert_eq!(event.kind, EventType::Contraction);
        assert!(!event.synced);
    }

    #[test]
    fn stamp_keeps_existing_authorship() {
        let first = DeviceId::parse("device_1_aaaaaaa").unwrap();
        let second = DeviceId::parse("device_2_bbbbbbb").unwrap();
        let mut event = Event::contraction(0);
        event.stamp(&first, 10);
        event.stamp(&second, 20);
        assert_eq!(event.added_by, Some(first));
        assert_eq!(event.created_at, Some(10));
    }

    #[test]
    fn finish_rounds_to_seconds() {
        let mut event = Event::contraction(1000);
        assert!(event.is_in_progress());
        event.finish(61_499);
        assert_eq!(event.duration, Some(60));
        assert!(!event.is_in_progress());
    }

    #[test]
    fn markers_are_never_in_progress() {
        assert!(!Event::marker(EventType::LaborPhaseActive, 0).is_in_progress());
    }

    #[test]
    fn sort_is_newest_first() {
        let mut events = vec![
            Event::contraction(1),
            Event::contraction(3),
            Event::contraction(2),
        ];
        sort_newest_first(&mut events);
        let starts: Vec<i64> = events.iter().map(|e| e.start_time).collect();
        assert_eq!(starts, vec![3, 2, 1]);
    }

    #[test]
    fn patch_merge_only_touches_named_keys() {
        let mut object = c1().to_value().unwrap().as_object().unwrap().clone();
        let before = object.clone();
        EventPatch::duration(90).merge_into(&mut object);

        assert_eq!(object["duration"], json!(90));
        for (key, value) in &before {
            if key != "duration" {
                assert_eq!(&object[key], value);
            }
        }
    }

    #[test]
    fn patch_clear_duration_removes_key() {
        let mut object = c1().to_value().unwrap().as_object().unwrap().clone();
        EventPatch::clear_duration().merge_into(&mut object);
        assert!(!object.contains_key("duration"));
    }

    #[test]
    fn patch_apply_matches_merge() {
        let patch = EventPatch::duration(30)
            .with_start_time(5)
            .with_kind(EventType::LaborPhaseEarly);

        let mut event = c1();
        patch.apply(&mut event);

        let mut object = c1().to_value().unwrap().as_object().unwrap().clone();
        patch.merge_into(&mut object);

        assert_eq!(event, Event::from_value(Value::Object(object)).unwrap());
    }

    #[test]
    fn event_type_parses_from_str() {
        for kind in [
            EventType::Contraction,
            EventType::WaterBroke,
            EventType::LaborPhaseEarly,
            EventType::LaborPhaseActive,
            EventType::LaborPhaseTransition,
        ] {
            assert_eq!(kind.as_str().parse::<EventType>().unwrap(), kind);
        }
        assert!("labour".parse::<EventType>().is_err());
    }
}
