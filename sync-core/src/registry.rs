//! Session lifetime and membership rules.
//!
//! A session is joinable iff its record exists and `now < expires_at`.
//! Expiry never deletes anything: an expired record may still be present
//! in the store but is treated as not found.

use std::time::Duration;
use sync_types::{DeviceId, SessionRecord};
use thiserror::Error;

/// Fixed session TTL (24 hours).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// [`DEFAULT_SESSION_TTL`] in milliseconds.
pub const DEFAULT_SESSION_TTL_MS: i64 = 86_400_000;

/// Why a session cannot be joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionRejection {
    /// No record exists at the code.
    #[error("session not found")]
    NotFound,
    /// The record exists but its TTL elapsed.
    #[error("session expired at {expired_at}")]
    Expired {
        /// Epoch milliseconds when the session stopped being joinable.
        expired_at: i64,
    },
}

/// Check whether a (possibly absent) record can be joined at `now_ms`.
pub fn check_joinable(
    record: Option<&SessionRecord>,
    now_ms: i64,
) -> Result<(), SessionRejection> {
    match record {
        None => Err(SessionRejection::NotFound),
        Some(record) if now_ms >= record.expires_at => Err(SessionRejection::Expired {
            expired_at: record.expires_at,
        }),
        Some(_) => Ok(()),
    }
}

/// Add `device` to a member list.
///
/// Returns `None` when the device is already a member and the list is
/// already duplicate-free, meaning no write is needed.
pub fn add_member(members: &[DeviceId], device: &DeviceId) -> Option<Vec<DeviceId>> {
    let mut next: Vec<DeviceId> = Vec::with_capacity(members.len() + 1);
    for member in members {
        if !next.contains(member) {
            next.push(member.clone());
        }
    }
    let had_duplicates = next.len() != members.len();

    if next.contains(device) {
        return had_duplicates.then_some(next);
    }
    next.push(device.clone());
    Some(next)
}

/// Result of removing a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    /// Remaining members to write back.
    Members(Vec<DeviceId>),
    /// Nobody is left: the stored field must be removed, not written empty.
    Empty,
}

/// Remove every occurrence of `device` from a member list.
pub fn remove_member(members: &[DeviceId], device: &DeviceId) -> Membership {
    let remaining: Vec<DeviceId> = members.iter().filter(|m| *m != device).cloned().collect();
    if remaining.is_empty() {
        Membership::Empty
    } else {
        Membership::Members(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(n: u8) -> DeviceId {
        DeviceId::parse(&format!("device_{n}_abcdefg")).unwrap()
    }

    #[test]
    fn ttl_constants_agree() {
        assert_eq!(DEFAULT_SESSION_TTL.as_millis() as i64, DEFAULT_SESSION_TTL_MS);
    }

    #[test]
    fn missing_record_is_not_found() {
        assert_eq!(check_joinable(None, 0), Err(SessionRejection::NotFound));
    }

    #[test]
    fn ttl_boundary() {
        let t = 1_700_000_000_000;
        let record = SessionRecord::new(device(1), t, DEFAULT_SESSION_TTL_MS);

        assert!(check_joinable(Some(&record), t).is_ok());
        assert!(check_joinable(Some(&record), t + 86_399_999).is_ok());
        assert!(matches!(
            check_joinable(Some(&record), t + 86_400_000),
            Err(SessionRejection::Expired { .. })
        ));
        assert!(matches!(
            check_joinable(Some(&record), t + 86_400_001),
            Err(SessionRejection::Expired { .. })
        ));
    }

    #[test]
    fn add_member_appends_new_device() {
        let next = add_member(&[device(1)], &device(2)).unwrap();
        assert_eq!(next, vec![device(1), device(2)]);
    }

    #[test]
    fn add_existing_member_needs_no_write() {
        assert_eq!(add_member(&[device(1), device(2)], &device(2)), None);
    }

    #[test]
    fn add_member_repairs_duplicates() {
        let next = add_member(&[device(1), device(1)], &device(1)).unwrap();
        assert_eq!(next, vec![device(1)]);
    }

    #[test]
    fn remove_member_keeps_others() {
        assert_eq!(
            remove_member(&[device(1), device(2)], &device(1)),
            Membership::Members(vec![device(2)])
        );
    }

    #[test]
    fn removing_last_member_empties() {
        assert_eq!(remove_member(&[device(1)], &device(1)), Membership::Empty);
        assert_eq!(remove_member(&[], &device(1)), Membership::Empty);
    }

    #[test]
    fn removing_non_member_is_harmless() {
        assert_eq!(
            remove_member(&[device(2)], &device(1)),
            Membership::Members(vec![device(2)])
        );
    }
}
