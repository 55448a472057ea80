//! SyncClient - the main interface for LaborSync.
//!
//! This module provides [`SyncClient`], the only type the rest of an
//! application needs: session actions, event mutations, and a live view of
//! the merged event list.
//!
//! # Architecture
//!
//! SyncClient uses a pure state machine (from sync-core) for pairing logic
//! and interprets the actions to perform actual I/O via the [`RemoteStore`]
//! and [`LocalStore`] traits.
//!
//! ```text
//! Application → SyncClient → {SessionRegistry, EventLog} → RemoteStore
//!                   ↓                                           │ push
//!              sync-core (pure state machine)                   ▼
//!                   ↑                      driver task ← {presence, snapshots}
//!                   └──────────────────────────┘
//! ```
//!
//! Each attachment to a session owns two subscriptions (presence and event
//! log) and a driver task that feeds their notifications through the
//! reconciliation gate. Detaching drops all three.
//!
//! # Example
//!
//! ```ignore
//! use sync_client::{MemoryLocalStore, MemoryStore, SyncClient, SyncConfig};
//!
//! let store = Arc::new(MemoryStore::new());
//! let client = SyncClient::open(SyncConfig::default(), store, MemoryLocalStore::new()).await?;
//!
//! let code = client.create_session().await?;
//! client.sync_event(Event::contraction(now)).await;
//! let mut view = client.watch();
//! view.wait_for(|v| v.paired).await?;
//! ```

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use sync_core::{
    Action, PairingEvent, PairingState, Presence, Reconciler, SnapshotOutcome,
    DEFAULT_SESSION_TTL,
};
use sync_types::{sort_newest_first, DeviceId, Event, EventId, EventPatch, SessionCode};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::event_log::EventLog;
use crate::local::{DeviceStorage, LocalStore, LocalStoreError};
use crate::presence::PresenceTracker;
use crate::registry::{SessionError, SessionRegistry};
use crate::store::{RemoteStore, Subscription};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Session registry error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Local persistence error.
    #[error("local store error: {0}")]
    Local(#[from] LocalStoreError),

    /// Creating a session while paired to another one.
    #[error("already paired in session {0}")]
    AlreadyPaired(SessionCode),
}

/// Configuration for SyncClient.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long a created session stays joinable.
    pub session_ttl: Duration,
    /// Time source for expiry and event timestamps.
    pub clock: Arc<dyn Clock>,
}

impl SyncConfig {
    /// Default configuration: 24 hour sessions, system clock.
    pub fn new() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the session TTL.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Set the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.session_ttl.as_millis()).unwrap_or(i64::MAX)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a UI needs to render, published after every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncView {
    /// Pairing state.
    pub state: PairingState,
    /// At least one other device is attached.
    pub paired: bool,
    /// Devices attached to the current session (0 when detached).
    pub device_count: usize,
    /// The session currently held, if any.
    pub session_code: Option<SessionCode>,
    /// The code the next created session will use.
    pub share_code: SessionCode,
    /// Merged event list, newest first.
    pub events: Vec<Event>,
}

/// The main sync client.
///
/// Cheap to clone; clones drive the same device.
pub struct SyncClient<S: RemoteStore + 'static, L: LocalStore + 'static> {
    shared: Arc<Shared<S, L>>,
}

impl<S: RemoteStore + 'static, L: LocalStore + 'static> Clone for SyncClient<S, L> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

struct Shared<S: RemoteStore + 'static, L: LocalStore + 'static> {
    store: Arc<S>,
    local: DeviceStorage<L>,
    device: DeviceId,
    clock: Arc<dyn Clock>,
    registry: SessionRegistry<S>,
    inner: Mutex<Inner<S>>,
    view: watch::Sender<SyncView>,
}

struct Inner<S: RemoteStore + 'static> {
    state: PairingState,
    share_code: SessionCode,
    events: Vec<Event>,
    device_count: usize,
    generation: u64,
    attachment: Option<Attachment<S>>,
}

/// Live link to one session. Dropping it releases both subscriptions and
/// stops the driver.
struct Attachment<S: RemoteStore + 'static> {
    generation: u64,
    log: Arc<EventLog<S>>,
    _presence: Subscription,
    _events: Subscription,
    driver: JoinHandle<()>,
}

impl<S: RemoteStore + 'static> Drop for Attachment<S> {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

enum Notification {
    Presence(Presence),
    Snapshot(Vec<Event>),
}

impl<S: RemoteStore + 'static, L: LocalStore + 'static> SyncClient<S, L> {
    /// Open the client for this device.
    ///
    /// Loads (or creates) the device id and the local events, then
    /// revalidates a persisted session. A session that no longer exists or
    /// has expired is forgotten; one that cannot be checked because the
    /// store is unreachable is kept for the next start.
    pub async fn open(config: SyncConfig, store: Arc<S>, local: L) -> Result<Self, ClientError> {
        let local = DeviceStorage::new(local);
        let clock = config.clock.clone();

        let device = match local.device_id().await? {
            Some(device) => device,
            None => {
                let device = DeviceId::generate(clock.now_ms());
                local.save_device_id(&device).await?;
                info!(device = %device, "Generated device id");
                device
            }
        };

        let mut events = local.events().await?;
        sort_newest_first(&mut events);

        let inner = Inner {
            state: PairingState::new(),
            share_code: SessionCode::generate(),
            events,
            device_count: 0,
            generation: 0,
            attachment: None,
        };
        let (view, _) = watch::channel(inner.view());
        let registry =
            SessionRegistry::new(store.clone(), device.clone(), clock.clone(), config.ttl_ms());

        let shared = Arc::new(Shared {
            store,
            local,
            device,
            clock,
            registry,
            inner: Mutex::new(inner),
            view,
        });
        shared.restore().await?;

        Ok(Self { shared })
    }

    /// Create a session using [`SyncClient::share_code`].
    ///
    /// Returns the existing code if this device already created one that
    /// nobody has joined.
    pub async fn create_session(&self) -> Result<SessionCode, ClientError> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;
        match &inner.state {
            PairingState::HasCode { code } => return Ok(code.clone()),
            PairingState::Paired { code } => return Err(ClientError::AlreadyPaired(code.clone())),
            PairingState::Unpaired | PairingState::Leaving { .. } => {}
        }

        let code = inner.share_code.clone();
        shared.registry.create(&code).await?;
        shared
            .apply(&mut inner, PairingEvent::Created { code: code.clone() })
            .await;
        Ok(code)
    }

    /// Join someone else's session.
    ///
    /// Returns `false` for an invalid, unknown or expired code, or when the
    /// store cannot be reached; the client state is left unchanged.
    pub async fn join_session(&self, input: &str) -> bool {
        let code = match SessionCode::parse(input) {
            Ok(code) => code,
            Err(e) => {
                info!(error = %e, "Join rejected");
                return false;
            }
        };

        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;
        match &inner.state {
            PairingState::Paired { code: current } if *current != code => {
                warn!(current = %current, requested = %code, "Leave the current session before joining another");
                return false;
            }
            PairingState::HasCode { code: current } | PairingState::Paired { code: current }
                if *current == code =>
            {
                return true;
            }
            _ => {}
        }

        match shared.registry.join(&code).await {
            Ok(_) => {
                shared.apply(&mut inner, PairingEvent::Joined { code }).await;
                true
            }
            Err(e) if e.is_rejection() => {
                info!(code = %code, error = %e, "Join rejected");
                false
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Join failed");
                false
            }
        }
    }

    /// Leave the current session. Local events are kept.
    pub async fn leave_session(&self) {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;
        shared.apply(&mut inner, PairingEvent::LeaveRequested).await;
        shared.finish_leaving(&mut inner).await;
    }

    /// Clear all data: the session's remote events, the membership, the
    /// persisted session and the local events. The device id is kept.
    pub async fn clear_session(&self) {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;
        shared.apply(&mut inner, PairingEvent::ClearRequested).await;
        shared.finish_leaving(&mut inner).await;
    }

    /// Record a new or changed event locally and propagate it.
    pub async fn sync_event(&self, mut event: Event) {
        let shared = &self.shared;
        event.stamp(&shared.device, shared.clock.now_ms());
        event.synced = false;

        let mut inner = shared.inner.lock().await;
        match inner.events.iter_mut().find(|e| e.id == event.id) {
            Some(existing) => *existing = event.clone(),
            None => inner.events.push(event.clone()),
        }
        sort_newest_first(&mut inner.events);

        if let Some(log) = inner.log() {
            log.put_event(&event).await;
        }
        shared.persist_events(&inner).await;
        shared.publish(&inner);
    }

    /// Apply a partial update locally and to the remote log.
    pub async fn update_event(&self, id: &EventId, patch: &EventPatch) {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;
        if let Some(event) = inner.events.iter_mut().find(|e| &e.id == id) {
            patch.apply(event);
            event.synced = false;
        }
        sort_newest_first(&mut inner.events);

        if let Some(log) = inner.log() {
            log.update_event(id, patch).await;
        }
        shared.persist_events(&inner).await;
        shared.publish(&inner);
    }

    /// Delete an event locally and from the remote log. Unknown ids are a
    /// no-op.
    pub async fn sync_delete(&self, id: &EventId) {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;
        inner.events.retain(|e| &e.id != id);

        if let Some(log) = inner.log() {
            log.delete_event(id).await;
        }
        shared.persist_events(&inner).await;
        shared.publish(&inner);
    }

    /// Start fresh: drop every event locally and in the session.
    pub async fn clear_all_events(&self) {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;
        inner.events.clear();

        if let Some(log) = inner.log() {
            log.clear_all_events().await;
        }
        shared.persist_events(&inner).await;
        shared.publish(&inner);
    }

    /// Release every subscription. Session state is kept on disk and is
    /// revalidated by the next [`SyncClient::open`].
    pub async fn close(&self) {
        let mut inner = self.shared.inner.lock().await;
        if inner.attachment.take().is_some() {
            debug!("Detached on close");
        }
        inner.device_count = 0;
        self.shared.publish(&inner);
    }

    /// Current view.
    pub fn view(&self) -> SyncView {
        self.shared.view.borrow().clone()
    }

    /// Receive every published view.
    pub fn watch(&self) -> watch::Receiver<SyncView> {
        self.shared.view.subscribe()
    }

    /// Merged event list, newest first.
    pub fn events(&self) -> Vec<Event> {
        self.shared.view.borrow().events.clone()
    }

    /// At least one other device is attached.
    pub fn is_paired(&self) -> bool {
        self.shared.view.borrow().paired
    }

    /// Pairing state.
    pub fn state(&self) -> PairingState {
        self.shared.view.borrow().state.clone()
    }

    /// The session currently held, if any.
    pub fn session_code(&self) -> Option<SessionCode> {
        self.shared.view.borrow().session_code.clone()
    }

    /// The code the next created session will use.
    pub fn share_code(&self) -> SessionCode {
        self.shared.view.borrow().share_code.clone()
    }

    /// Devices attached to the current session.
    pub fn device_count(&self) -> usize {
        self.shared.view.borrow().device_count
    }

    /// This device's id.
    pub fn device_id(&self) -> &DeviceId {
        &self.shared.device
    }
}

impl<S: RemoteStore + 'static, L: LocalStore + 'static> fmt::Debug for SyncClient<S, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let view = self.shared.view.borrow();
        f.debug_struct("SyncClient")
            .field("device", &self.shared.device)
            .field("state", &view.state)
            .field("events", &view.events.len())
            .finish()
    }
}

impl<S: RemoteStore + 'static> Inner<S> {
    fn view(&self) -> SyncView {
        SyncView {
            state: self.state.clone(),
            paired: self.state.is_paired(),
            device_count: self.device_count,
            session_code: self.state.session_code().cloned(),
            share_code: self.share_code.clone(),
            events: self.events.clone(),
        }
    }

    fn log(&self) -> Option<Arc<EventLog<S>>> {
        self.attachment.as_ref().map(|a| a.log.clone())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.attachment
            .as_ref()
            .is_some_and(|a| a.generation == generation)
    }
}

impl<S: RemoteStore + 'static, L: LocalStore + 'static> Shared<S, L> {
    async fn restore(self: &Arc<Self>) -> Result<(), ClientError> {
        let Some((code, was_paired)) = self.local.session().await? else {
            return Ok(());
        };

        let event = match self.registry.check(&code).await {
            Ok(_) => {
                info!(code = %code, was_paired, "Restoring session");
                PairingEvent::Restored { code, was_paired }
            }
            Err(SessionError::Store(e)) => {
                warn!(code = %code, error = %e, "Cannot revalidate session, keeping it for next start");
                let mut inner = self.inner.lock().await;
                mark_unsynced(&mut inner.events);
                self.publish(&inner);
                return Ok(());
            }
            Err(e) => {
                info!(code = %code, error = %e, "Persisted session no longer valid");
                PairingEvent::RestoreRejected
            }
        };

        let mut inner = self.inner.lock().await;
        if event == PairingEvent::RestoreRejected {
            mark_unsynced(&mut inner.events);
        }
        self.apply(&mut inner, event).await;
        Ok(())
    }

    /// Feed an event to the state machine and execute the resulting actions.
    async fn apply(self: &Arc<Self>, inner: &mut Inner<S>, event: PairingEvent) {
        let state = std::mem::take(&mut inner.state);
        let (next, actions) = state.on_event(event);
        debug!(state = ?next, actions = actions.len(), "Pairing transition");
        inner.state = next;

        for action in actions {
            self.execute(inner, action).await;
        }
        self.publish(inner);
    }

    async fn finish_leaving(self: &Arc<Self>, inner: &mut Inner<S>) {
        if matches!(inner.state, PairingState::Leaving { .. }) {
            self.apply(inner, PairingEvent::LeaveCompleted).await;
        }
    }

    /// Execute one action. Failures are logged; the remaining actions still
    /// run so a failed write never leaves a subscription attached.
    async fn execute(self: &Arc<Self>, inner: &mut Inner<S>, action: Action) {
        match action {
            Action::Attach { code } => self.attach(inner, code),
            Action::Detach => {
                inner.attachment = None;
                inner.device_count = 0;
                // Kept events are no longer backed by any session log.
                mark_unsynced(&mut inner.events);
                self.persist_events(inner).await;
                debug!("Detached");
            }
            Action::PersistSession { code } => {
                if let Err(e) = self.local.save_session_code(&code).await {
                    error!(error = %e, "Failed to persist session code");
                }
            }
            Action::PersistPaired(paired) => {
                if let Err(e) = self.local.save_paired(paired).await {
                    error!(error = %e, "Failed to persist paired flag");
                }
            }
            Action::ClearPersisted => {
                if let Err(e) = self.local.clear_session().await {
                    error!(error = %e, "Failed to clear persisted session");
                }
            }
            Action::RemoveMembership { code } => {
                if let Err(e) = self.registry.leave(&code).await {
                    warn!(code = %code, error = %e, "Failed to remove membership");
                }
            }
            Action::ClearRemoteEvents { code } => {
                self.event_log(code).clear_all_events().await;
            }
            Action::ClearLocalEvents => {
                inner.events.clear();
                self.persist_events(inner).await;
            }
            Action::RegenerateShareCode => {
                inner.share_code = SessionCode::generate();
            }
        }
    }

    fn attach(self: &Arc<Self>, inner: &mut Inner<S>, code: SessionCode) {
        inner.attachment = None;
        inner.generation += 1;
        let generation = inner.generation;

        let log = Arc::new(self.event_log(code.clone()));
        let (tx, rx) = mpsc::unbounded_channel();

        // Events first: the first device count then arrives after the first
        // snapshot has been merged.
        let snapshot_tx = tx.clone();
        let events = match log.subscribe(move |events| {
            let _ = snapshot_tx.send(Notification::Snapshot(events));
        }) {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(code = %code, error = %e, "Event subscription failed, running detached");
                return;
            }
        };
        let presence = match PresenceTracker::new(self.store.clone()).watch(&code, move |p| {
            let _ = tx.send(Notification::Presence(p));
        }) {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(code = %code, error = %e, "Presence subscription failed, running detached");
                return;
            }
        };

        let driver = tokio::spawn(drive(
            Arc::downgrade(self),
            generation,
            log.clone(),
            rx,
        ));

        inner.attachment = Some(Attachment {
            generation,
            log,
            _presence: presence,
            _events: events,
            driver,
        });
        debug!(code = %code, generation, "Attached");
    }

    fn event_log(&self, code: SessionCode) -> EventLog<S> {
        EventLog::new(
            self.store.clone(),
            code,
            self.device.clone(),
            self.clock.clone(),
        )
    }

    async fn on_presence(&self, generation: u64, presence: Presence) {
        let mut inner = self.inner.lock().await;
        if !inner.is_current(generation) {
            return;
        }
        inner.device_count = presence.count();

        let state = std::mem::take(&mut inner.state);
        let (next, actions) = state.on_event(PairingEvent::PresenceChanged {
            count: presence.count(),
        });
        inner.state = next;
        for action in actions {
            if let Action::PersistPaired(paired) = action {
                info!(paired, devices = presence.count(), "Pairing changed");
                if let Err(e) = self.local.save_paired(paired).await {
                    error!(error = %e, "Failed to persist paired flag");
                }
            }
        }
        self.publish(&inner);
    }

    /// Run a snapshot through the gate. The first one is merged with the
    /// local events as they are now, so edits made since attaching survive.
    async fn on_snapshot(
        &self,
        generation: u64,
        log: &EventLog<S>,
        reconciler: &mut Reconciler,
        remote: Vec<Event>,
    ) {
        let mut inner = self.inner.lock().await;
        if !inner.is_current(generation) {
            return;
        }

        // Events already confirmed by this session's log are not re-uploaded:
        // if a partner deleted one while this device was away, it stays deleted.
        let pending: Vec<Event> = inner.events.iter().filter(|e| !e.synced).cloned().collect();
        inner.events = match reconciler.on_snapshot(&pending, remote) {
            SnapshotOutcome::Reconcile(reconciliation) => {
                info!(
                    code = %log.code(),
                    uploading = reconciliation.to_upload.len(),
                    merged = reconciliation.view.len(),
                    "Reconciling local history"
                );
                for event in &reconciliation.to_upload {
                    log.put_event(event).await;
                }
                reconciler.complete();
                reconciliation.view
            }
            SnapshotOutcome::Replace(events) => events,
        };
        self.persist_events(&inner).await;
        self.publish(&inner);
    }

    async fn persist_events(&self, inner: &Inner<S>) {
        if let Err(e) = self.local.save_events(&inner.events).await {
            error!(error = %e, "Failed to persist local events");
        }
    }

    fn publish(&self, inner: &Inner<S>) {
        self.view.send_replace(inner.view());
    }
}

fn mark_unsynced(events: &mut [Event]) {
    for event in events {
        event.synced = false;
    }
}

/// Per-attachment driver: runs presence and snapshot notifications through
/// the state machine and the reconciliation gate, in arrival order.
async fn drive<S: RemoteStore + 'static, L: LocalStore + 'static>(
    shared: Weak<Shared<S, L>>,
    generation: u64,
    log: Arc<EventLog<S>>,
    mut notifications: mpsc::UnboundedReceiver<Notification>,
) {
    let mut reconciler = Reconciler::new();
    while let Some(notification) = notifications.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        match notification {
            Notification::Presence(presence) => shared.on_presence(generation, presence).await,
            Notification::Snapshot(remote) => {
                shared
                    .on_snapshot(generation, &log, &mut reconciler, remote)
                    .await
            }
        }
    }
    debug!(generation, "Driver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::local::MemoryLocalStore;
    use crate::store::MemoryStore;
    use serde_json::json;
    use sync_types::EventType;

    const T0: i64 = 1_700_000_000_000;

    async fn open(
        store: &MemoryStore,
        local: &MemoryLocalStore,
        clock: &ManualClock,
    ) -> SyncClient<MemoryStore, MemoryLocalStore> {
        let config = SyncConfig::new().with_clock(Arc::new(clock.clone()));
        SyncClient::open(config, Arc::new(store.clone()), local.clone())
            .await
            .unwrap()
    }

    async fn settle<S: RemoteStore + 'static, L: LocalStore + 'static>(
        client: &SyncClient<S, L>,
        check: impl FnMut(&SyncView) -> bool,
    ) {
        let mut rx = client.watch();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(check))
            .await
            .expect("timed out waiting for view")
            .expect("client dropped");
    }

    #[tokio::test]
    async fn open_generates_and_keeps_device_id() {
        let store = MemoryStore::new();
        let local = MemoryLocalStore::new();
        let clock = ManualClock::new(T0);

        let first = open(&store, &local, &clock).await;
        let id = first.device_id().clone();
        assert!(id.as_str().starts_with(&format!("device_{T0}_")));
        drop(first);

        let second = open(&store, &local, &clock).await;
        assert_eq!(second.device_id(), &id);
        assert_eq!(second.state(), PairingState::Unpaired);
    }

    #[tokio::test]
    async fn create_moves_to_has_code_and_persists() {
        let store = MemoryStore::new();
        let local = MemoryLocalStore::new();
        let clock = ManualClock::new(T0);
        let client = open(&store, &local, &clock).await;
        let share = client.share_code();

        let code = client.create_session().await.unwrap();
        assert_eq!(code, share);
        assert_eq!(client.state(), PairingState::HasCode { code: code.clone() });
        assert!(!client.is_paired());
        settle(&client, |v| v.device_count == 1).await;

        assert_eq!(
            local.get("sessionCode").await.unwrap(),
            Some(code.to_string())
        );
        assert_eq!(local.get("wasPaired").await.unwrap(), Some("false".into()));
    }

    #[tokio::test]
    async fn create_twice_returns_same_code() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(T0);
        let client = open(&store, &MemoryLocalStore::new(), &clock).await;
        let first = client.create_session().await.unwrap();
        let second = client.create_session().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn create_failure_leaves_state_alone() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(T0);
        let client = open(&store, &MemoryLocalStore::new(), &clock).await;
        store.fail_next_write("network down");

        assert!(matches!(
            client.create_session().await,
            Err(ClientError::Session(SessionError::Store(_)))
        ));
        assert_eq!(client.state(), PairingState::Unpaired);
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn invalid_code_is_rejected_without_store_access() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(T0);
        let client = open(&store, &MemoryLocalStore::new(), &clock).await;
        store.set_offline(true);

        assert!(!client.join_session("nope").await);
        assert_eq!(client.state(), PairingState::Unpaired);
    }

    #[tokio::test]
    async fn lowercase_code_joins() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(T0);
        let a = open(&store, &MemoryLocalStore::new(), &clock).await;
        let b = open(&store, &MemoryLocalStore::new(), &clock).await;
        let code = a.create_session().await.unwrap();

        assert!(b.join_session(&code.as_str().to_lowercase()).await);
        assert_eq!(b.session_code(), Some(code));
    }

    #[tokio::test]
    async fn leave_releases_subscriptions_and_regenerates_share_code() {
        let store = MemoryStore::new();
        let local = MemoryLocalStore::new();
        let clock = ManualClock::new(T0);
        let client = open(&store, &local, &clock).await;
        let code = client.create_session().await.unwrap();
        assert_eq!(store.listener_count(), 2);

        client.leave_session().await;

        assert_eq!(client.state(), PairingState::Unpaired);
        assert_eq!(store.listener_count(), 0);
        assert_ne!(client.share_code(), code);
        assert_eq!(local.get("sessionCode").await.unwrap(), None);
        assert_eq!(
            store
                .read(&sync_core::paths::device_ids(&code))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn local_events_survive_restart() {
        let store = MemoryStore::new();
        let local = MemoryLocalStore::new();
        let clock = ManualClock::new(T0);

        let client = open(&store, &local, &clock).await;
        client
            .sync_event(Event::new(
                EventId::parse("c1").unwrap(),
                1000,
                EventType::Contraction,
            ))
            .await;
        drop(client);

        let client = open(&store, &local, &clock).await;
        let events = client.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].added_by.as_ref(), Some(client.device_id()));
        assert_eq!(events[0].created_at, Some(T0));
    }

    #[tokio::test]
    async fn unpaired_mutations_stay_local() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(T0);
        let client = open(&store, &MemoryLocalStore::new(), &clock).await;
        let id = EventId::parse("c1").unwrap();

        client
            .sync_event(Event::new(id.clone(), 1000, EventType::Contraction))
            .await;
        client.update_event(&id, &EventPatch::duration(45)).await;
        assert_eq!(client.events()[0].end_time(), Some(46_000));

        client.sync_delete(&id).await;
        assert!(client.events().is_empty());
        assert_eq!(store.snapshot(), json!({}));
    }

    #[tokio::test]
    async fn restore_rejected_when_session_expired() {
        let store = MemoryStore::new();
        let local = MemoryLocalStore::new();
        let clock = ManualClock::new(T0);
        let client = open(&store, &local, &clock).await;
        client.create_session().await.unwrap();
        client.close().await;
        drop(client);

        clock.advance(sync_core::DEFAULT_SESSION_TTL_MS);
        let client = open(&store, &local, &clock).await;

        assert_eq!(client.state(), PairingState::Unpaired);
        assert_eq!(local.get("sessionCode").await.unwrap(), None);
    }

    #[tokio::test]
    async fn restore_keeps_code_when_store_unreachable() {
        let store = MemoryStore::new();
        let local = MemoryLocalStore::new();
        let clock = ManualClock::new(T0);
        let client = open(&store, &local, &clock).await;
        let code = client.create_session().await.unwrap();
        client.close().await;
        drop(client);

        store.fail_next_read("timeout");
        let client = open(&store, &local, &clock).await;
        assert_eq!(client.state(), PairingState::Unpaired);
        assert_eq!(
            local.get("sessionCode").await.unwrap(),
            Some(code.to_string())
        );
    }

    #[tokio::test]
    async fn close_releases_listeners() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(T0);
        let client = open(&store, &MemoryLocalStore::new(), &clock).await;
        client.create_session().await.unwrap();
        assert_eq!(store.listener_count(), 2);

        client.close().await;
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn dropping_client_releases_listeners() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(T0);
        let client = open(&store, &MemoryLocalStore::new(), &clock).await;
        client.create_session().await.unwrap();
        settle(&client, |v| v.device_count == 1).await;

        drop(client);
        // The driver may briefly hold the last reference.
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.listener_count() != 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
