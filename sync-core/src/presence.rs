//! Presence derivation.
//!
//! Presence is a pure function of list membership, not of liveness. A
//! device that vanishes without leaving stays counted until it leaves.

use sync_types::DeviceId;

/// Number of devices attached to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Presence {
    count: usize,
}

impl Presence {
    /// Presence with an explicit device count.
    pub fn from_count(count: usize) -> Self {
        Self { count }
    }

    /// Presence derived from the stored member list.
    pub fn from_members(members: &[DeviceId]) -> Self {
        Self::from_count(members.len())
    }

    /// Device count.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Paired means more than one device is attached.
    pub fn is_paired(&self) -> bool {
        self.count > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_one_are_never_paired() {
        assert!(!Presence::from_count(0).is_paired());
        assert!(!Presence::from_count(1).is_paired());
    }

    #[test]
    fn two_or_more_are_paired() {
        assert!(Presence::from_count(2).is_paired());
        assert!(Presence::from_count(3).is_paired());
    }

    #[test]
    fn counts_members() {
        let members = vec![
            DeviceId::parse("device_1_aaaaaaa").unwrap(),
            DeviceId::parse("device_2_bbbbbbb").unwrap(),
        ];
        assert_eq!(Presence::from_members(&members).count(), 2);
        assert_eq!(Presence::default().count(), 0);
    }
}
