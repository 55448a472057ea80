//! # sync-core
//!
//! Pure logic for LaborSync (no I/O, instant tests).
//!
//! This crate implements the rules and state machines for pairing two
//! devices around a shared event log, without any network or disk I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. Time is always passed in as epoch milliseconds.
//!
//! The actual I/O (remote store, local persistence) is performed by
//! `sync-client`, which interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod paths;
pub mod presence;
pub mod reconcile;
pub mod registry;
pub mod state;

pub use presence::Presence;
pub use reconcile::{reconcile, ReconcileState, Reconciler, Reconciliation, SnapshotOutcome};
pub use registry::{
    add_member, check_joinable, remove_member, Membership, SessionRejection,
    DEFAULT_SESSION_TTL, DEFAULT_SESSION_TTL_MS,
};
pub use state::{Action, PairingEvent, PairingState};
