//! One-shot merge of pre-pairing local history into a session log.
//!
//! The first snapshot delivered after a device attaches is reconciled
//! against the local events as they stand when that snapshot is handled,
//! so edits made between attaching and the first snapshot are kept. Every later
//! snapshot replaces the view wholesale: the remote log is the only source
//! of truth from then on.
//!
//! ```text
//! NotYetReconciled --first snapshot--> Reconciling --complete()--> SteadyState
//! ```
//!
//! This is a best-effort union by id, not a CRDT join. Local events whose
//! upload fails are superseded by the next snapshot that lacks them.

use std::collections::HashSet;
use sync_types::{sort_newest_first, Event, EventId};

/// Progress of the reconciliation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    /// Attached, no snapshot seen yet.
    NotYetReconciled,
    /// First snapshot merged, uploads of local-only events in flight.
    Reconciling,
    /// Remote snapshots are authoritative.
    SteadyState,
}

/// Output of the merge step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Local events the remote log does not know yet.
    pub to_upload: Vec<Event>,
    /// Local events plus remote-only events, newest first.
    pub view: Vec<Event>,
}

/// What to do with a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// First snapshot: upload the missing events and show the merged view.
    Reconcile(Reconciliation),
    /// Any later snapshot: show it as-is.
    Replace(Vec<Event>),
}

/// The per-attachment reconciliation gate.
#[derive(Debug, Clone)]
pub struct Reconciler {
    state: ReconcileState,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    /// Create a gate for a fresh attachment.
    pub fn new() -> Self {
        Self {
            state: ReconcileState::NotYetReconciled,
        }
    }

    /// Current gate state.
    pub fn state(&self) -> ReconcileState {
        self.state
    }

    /// Feed a remote snapshot through the gate.
    ///
    /// Only the first call reconciles, against `local` as the caller holds
    /// it at that moment. Later calls ignore `local`.
    pub fn on_snapshot(&mut self, local: &[Event], remote: Vec<Event>) -> SnapshotOutcome {
        match self.state {
            ReconcileState::NotYetReconciled => {
                self.state = ReconcileState::Reconciling;
                SnapshotOutcome::Reconcile(reconcile(local, remote))
            }
            ReconcileState::Reconciling | ReconcileState::SteadyState => {
                SnapshotOutcome::Replace(mark_synced(remote))
            }
        }
    }

    /// Uploads were dispatched; later snapshots are authoritative.
    pub fn complete(&mut self) {
        if self.state == ReconcileState::Reconciling {
            self.state = ReconcileState::SteadyState;
        }
    }
}

/// Merge local events with a remote snapshot.
///
/// - `to_upload` = local events whose id is absent from `remote`
/// - `view` = local events, plus remote events whose id is absent locally,
///   sorted newest first
///
/// Local content always wins in the view. Every event the remote log
/// already holds, whichever copy is shown, is marked synced.
pub fn reconcile(local: &[Event], remote: Vec<Event>) -> Reconciliation {
    let remote_ids: HashSet<&EventId> = remote.iter().map(|e| &e.id).collect();
    let local_ids: HashSet<&EventId> = local.iter().map(|e| &e.id).collect();

    let to_upload: Vec<Event> = local
        .iter()
        .filter(|e| !remote_ids.contains(&e.id))
        .cloned()
        .collect();

    let remote_only: Vec<Event> = remote
        .iter()
        .filter(|e| !local_ids.contains(&e.id))
        .cloned()
        .collect();

    let mut view: Vec<Event> = local
        .iter()
        .cloned()
        .map(|mut event| {
            event.synced = remote_ids.contains(&event.id);
            event
        })
        .collect();
    view.extend(mark_synced(remote_only));
    sort_newest_first(&mut view);

    Reconciliation { to_upload, view }
}

fn mark_synced(mut events: Vec<Event>) -> Vec<Event> {
    for event in &mut events {
        event.synced = true;
    }
    sort_newest_first(&mut events);
    events
}
