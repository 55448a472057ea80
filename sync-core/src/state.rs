//! Per-device pairing state machine.
//!
//! This module provides a pure, side-effect-free state machine for the
//! lifetime of a device's pairing. The state machine takes events as input
//! and produces a new state plus a list of actions to execute.
//!
//! The actual I/O (store writes, subscriptions, local persistence) is
//! performed by sync-client, not by this module.
//!
//! ```text
//!              Created                 count > 1
//!  Unpaired ─────────────► HasCode ─────────────► Paired
//!     │  ▲                   ▲  │ ◄───────────────  │
//!     │  │                   │  │     count <= 1    │
//!     │  │ LeaveCompleted    │  └───Leave/Clear───┐ │
//!     │  └──────────── Leaving ◄───Leave/Clear────┼─┘
//!     │                                           │
//!     └──────────────── Joined ──────────────► Paired
//! ```

use sync_types::SessionCode;

/// Pairing state - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingState {
    /// No session held.
    Unpaired,
    /// Created a session to share; nobody else attached yet.
    HasCode {
        /// The session this device created.
        code: SessionCode,
    },
    /// At least one other device is attached.
    Paired {
        /// The shared session.
        code: SessionCode,
    },
    /// Leave or clear in progress.
    Leaving {
        /// The session being left.
        code: SessionCode,
    },
}

impl PairingState {
    /// Create a new state machine in the Unpaired state.
    pub fn new() -> Self {
        Self::Unpaired
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (sync-client)
    /// is responsible for executing the returned actions in order.
    pub fn on_event(self, event: PairingEvent) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Unpaired
            (Self::Unpaired, PairingEvent::Restored { code, was_paired }) => {
                let actions = vec![Action::Attach { code: code.clone() }];
                if was_paired {
                    (Self::Paired { code }, actions)
                } else {
                    (Self::HasCode { code }, actions)
                }
            }
            (Self::Unpaired, PairingEvent::RestoreRejected) => {
                (Self::Unpaired, vec![Action::ClearPersisted])
            }
            (Self::Unpaired, PairingEvent::Created { code }) => (
                Self::HasCode { code: code.clone() },
                vec![
                    Action::PersistSession { code: code.clone() },
                    Action::PersistPaired(false),
                    Action::Attach { code },
                ],
            ),
            (Self::Unpaired, PairingEvent::Joined { code }) => (
                Self::Paired { code: code.clone() },
                vec![
                    Action::PersistSession { code: code.clone() },
                    Action::PersistPaired(true),
                    Action::Attach { code },
                ],
            ),
            (Self::Unpaired, PairingEvent::ClearRequested) => (
                Self::Unpaired,
                vec![
                    Action::ClearLocalEvents,
                    Action::ClearPersisted,
                    Action::RegenerateShareCode,
                ],
            ),

            // From HasCode
            (Self::HasCode { code: current }, PairingEvent::Joined { code }) => {
                if current == code {
                    return (Self::HasCode { code }, vec![]);
                }
                (
                    Self::Paired { code: code.clone() },
                    vec![
                        Action::Detach,
                        Action::RemoveMembership { code: current },
                        Action::PersistSession { code: code.clone() },
                        Action::PersistPaired(true),
                        Action::Attach { code },
                    ],
                )
            }
            (Self::HasCode { code }, PairingEvent::PresenceChanged { count }) if count > 1 => {
                (Self::Paired { code }, vec![Action::PersistPaired(true)])
            }

            // From Paired
            (Self::Paired { code }, PairingEvent::PresenceChanged { count }) if count <= 1 => {
                (Self::HasCode { code }, vec![Action::PersistPaired(false)])
            }

            // Leaving an attached session
            (
                Self::HasCode { code } | Self::Paired { code },
                PairingEvent::LeaveRequested,
            ) => (
                Self::Leaving { code: code.clone() },
                vec![Action::Detach, Action::RemoveMembership { code }],
            ),
            (
                Self::HasCode { code } | Self::Paired { code },
                PairingEvent::ClearRequested,
            ) => (
                Self::Leaving { code: code.clone() },
                vec![
                    Action::ClearRemoteEvents { code: code.clone() },
                    Action::Detach,
                    Action::RemoveMembership { code },
                    Action::ClearLocalEvents,
                ],
            ),

            // From Leaving
            (Self::Leaving { .. }, PairingEvent::LeaveCompleted) => (
                Self::Unpaired,
                vec![Action::ClearPersisted, Action::RegenerateShareCode],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// The session currently held, if any.
    pub fn session_code(&self) -> Option<&SessionCode> {
        match self {
            Self::Unpaired => None,
            Self::HasCode { code } | Self::Paired { code } | Self::Leaving { code } => Some(code),
        }
    }

    /// Check if paired with at least one other device.
    pub fn is_paired(&self) -> bool {
        matches!(self, Self::Paired { .. })
    }

    /// Check if attached to a session (created or joined).
    pub fn is_attached(&self) -> bool {
        matches!(self, Self::HasCode { .. } | Self::Paired { .. })
    }
}

impl Default for PairingState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that can occur in the pairing lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    /// A persisted session passed `CheckSession` after restart.
    Restored {
        /// The persisted code.
        code: SessionCode,
        /// The persisted "was paired" flag.
        was_paired: bool,
    },
    /// A persisted session failed `CheckSession`.
    RestoreRejected,
    /// `CreateSession` succeeded.
    Created {
        /// The new session.
        code: SessionCode,
    },
    /// `JoinSession` succeeded.
    Joined {
        /// The joined session.
        code: SessionCode,
    },
    /// The presence list changed.
    PresenceChanged {
        /// New device count.
        count: usize,
    },
    /// User asked to leave.
    LeaveRequested,
    /// User asked to clear all data.
    ClearRequested,
    /// Leave/clear side effects have been executed.
    LeaveCompleted,
}

/// Actions to be executed by the sync-client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Subscribe to presence and the event log, and arm reconciliation.
    Attach {
        /// Session to attach to.
        code: SessionCode,
    },
    /// Release every subscription of the current attachment.
    Detach,
    /// Persist the session code locally.
    PersistSession {
        /// Code to persist.
        code: SessionCode,
    },
    /// Persist the "was paired" flag locally.
    PersistPaired(bool),
    /// Forget the persisted session code and paired flag.
    ClearPersisted,
    /// Remove this device from the session's member list.
    RemoveMembership {
        /// Session to leave.
        code: SessionCode,
    },
    /// Remove the session's entire event log.
    ClearRemoteEvents {
        /// Session whose log is cleared.
        code: SessionCode,
    },
    /// Drop every local event.
    ClearLocalEvents,
    /// Draw a fresh code for the next session this device creates.
    RegenerateShareCode,
}
