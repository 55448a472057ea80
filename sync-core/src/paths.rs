//! Store path layout.
//!
//! ```text
//! sessions/{code}                        session record root
//! sessions/{code}/deviceIds              presence list
//! sessions/{code}/contractions/{eventId} individual event
//! ```

use sync_types::{EventId, SessionCode};

/// Root under which every session record lives.
pub const SESSIONS_ROOT: &str = "sessions";

/// Key of the presence list inside a session record.
pub const DEVICE_IDS_KEY: &str = "deviceIds";

/// Key of the event map inside a session record.
pub const EVENTS_KEY: &str = "contractions";

/// `sessions/{code}`
pub fn session(code: &SessionCode) -> String {
    format!("{SESSIONS_ROOT}/{code}")
}

/// `sessions/{code}/deviceIds`
pub fn device_ids(code: &SessionCode) -> String {
    format!("{SESSIONS_ROOT}/{code}/{DEVICE_IDS_KEY}")
}

/// `sessions/{code}/contractions`
pub fn events(code: &SessionCode) -> String {
    format!("{SESSIONS_ROOT}/{code}/{EVENTS_KEY}")
}

/// `sessions/{code}/contractions/{id}`
pub fn event(code: &SessionCode, id: &EventId) -> String {
    format!("{SESSIONS_ROOT}/{code}/{EVENTS_KEY}/{id}")
}
