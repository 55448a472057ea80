//! # sync-client
//!
//! Client library for LaborSync session pairing and event log sync.
//!
//! This is the library applications use to share a live contraction log
//! between two devices through a real-time store.
//!
//! ## Features
//!
//! - **Session pairing**: short shareable codes with a fixed 24 hour TTL
//! - **Presence**: paired as soon as a second device is attached
//! - **Reconciliation**: history recorded before pairing is merged once
//! - **Store abstraction**: pluggable remote store (in-memory, file, hosted)
//! - **Pure state machine**: uses sync-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use sync_client::{MemoryLocalStore, MemoryStore, SyncClient, SyncConfig};
//!
//! let store = Arc::new(MemoryStore::new());
//! let client = SyncClient::open(SyncConfig::default(), store, MemoryLocalStore::new()).await?;
//!
//! // Share this code with a partner
//! let code = client.create_session().await?;
//!
//! // Record a contraction
//! client.sync_event(Event::contraction(now)).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod clock;
pub mod event_log;
pub mod local;
pub mod presence;
pub mod registry;
pub mod store;

pub use client::{ClientError, SyncClient, SyncConfig, SyncView};
pub use clock::{Clock, ManualClock, SystemClock};
pub use event_log::{EventLog, EventLogError};
pub use local::{DeviceStorage, FileLocalStore, LocalStore, LocalStoreError, MemoryLocalStore};
pub use presence::PresenceTracker;
pub use registry::{SessionError, SessionRegistry};
pub use store::{Listener, MemoryStore, RemoteStore, StoreError, Subscription};
