//! # sync-types
//!
//! Data model for LaborSync, the paired contraction log.
//!
//! This crate provides the foundational types used across all LaborSync crates:
//! - [`SessionCode`], [`DeviceId`], [`EventId`] - Identifiers
//! - [`Event`], [`EventType`], [`EventPatch`] - The timed entries of a log
//! - [`SessionRecord`] - The shared record two devices pair around
//! - [`SyncError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod event;
mod ids;
mod session;

pub use error::SyncError;
pub use event::{sort_newest_first, Event, EventPatch, EventType};
pub use ids::{now_millis, DeviceId, EventId, SessionCode, SESSION_CODE_LEN};
pub use session::SessionRecord;
