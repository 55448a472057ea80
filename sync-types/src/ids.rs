//! Identifier types for LaborSync.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::SyncError;

/// Length of a session code.
pub const SESSION_CODE_LEN: usize = 6;

/// Length of the random suffix of a device id.
const DEVICE_SUFFIX_LEN: usize = 7;

const BASE36_UPPER: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const BASE36_LOWER: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Draw `len` characters uniformly from a base-36 alphabet.
///
/// Bytes >= 252 are rejected so that every symbol is equally likely.
fn random_base36(len: usize, alphabet: &[u8; 36]) -> String {
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 16];
    while out.len() < len {
        getrandom::getrandom(&mut buf).expect("getrandom failed");
        for &byte in buf.iter().filter(|b| **b < 252) {
            out.push(alphabet[(byte % 36) as usize] as char);
            if out.len() == len {
                break;
            }
        }
    }
    out
}

/// The human-shareable pairing token addressing a session.
///
/// Six uppercase base-36 characters, e.g. `AB12CD`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionCode(String);

impl SessionCode {
    /// Generate a new random session code.
    pub fn generate() -> Self {
        Self(random_base36(SESSION_CODE_LEN, BASE36_UPPER))
    }

    /// Parse user input into a session code.
    ///
    /// Surrounding whitespace is ignored and lowercase letters are accepted.
    pub fn parse(input: &str) -> Result<Self, SyncError> {
        let code = input.trim().to_ascii_uppercase();
        let valid = code.len() == SESSION_CODE_LEN
            && code
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase());
        if valid {
            Ok(Self(code))
        } else {
            Err(SyncError::InvalidSessionCode(input.to_string()))
        }
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionCode {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionCode> for String {
    fn from(code: SessionCode) -> Self {
        code.0
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionCode({})", self.0)
    }
}

/// A per-device identifier used as a presence and authorship tag.
///
/// Format: `device_<unixMillis>_<7 lowercase base-36 chars>`. Generated
/// once per device and reused across sessions. Not a cryptographic identity.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Generate a new device id stamped with the given time.
    pub fn generate(now_ms: i64) -> Self {
        Self(format!(
            "device_{}_{}",
            now_ms,
            random_base36(DEVICE_SUFFIX_LEN, BASE36_LOWER)
        ))
    }

    /// Parse and validate a device id.
    pub fn parse(input: &str) -> Result<Self, SyncError> {
        let invalid = || SyncError::InvalidDeviceId(input.to_string());
        let rest = input.strip_prefix("device_").ok_or_else(invalid)?;
        let (millis, suffix) = rest.split_once('_').ok_or_else(invalid)?;

        let millis_ok = !millis.is_empty() && millis.bytes().all(|b| b.is_ascii_digit());
        let suffix_ok = suffix.len() == DEVICE_SUFFIX_LEN
            && suffix
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase());

        if millis_ok && suffix_ok {
            Ok(Self(input.to_string()))
        } else {
            Err(invalid())
        }
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.0)
    }
}

/// Identifier of a single event, unique within a session.
///
/// Assigned by the originating device and immutable once created. Ids are
/// opaque but must be usable as a store key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Create a new random EventId (UUID v4 text).
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Parse an externally supplied event id.
    pub fn parse(input: &str) -> Result<Self, SyncError> {
        const RESERVED: &[char] = &['/', '.', '#', '$', '[', ']'];
        if input.is_empty() || input.contains(RESERVED) {
            return Err(SyncError::InvalidEventId(input.to_string()));
        }
        Ok(Self(input.to_string()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}
