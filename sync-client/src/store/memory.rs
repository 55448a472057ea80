//! In-memory store.
//!
//! Reference implementation of the store contract over a JSON tree. Clones
//! share one backing tree, so two clients built on clones of the same
//! store behave like two devices attached to one backend.
//!
//! Notifications are delivered in mutation order, one mutation at a time.
//! Listeners may read the store but must not write, delete, subscribe or
//! unsubscribe from inside the callback.
//!
//! Also supports failure injection for tests.

use super::tree;
use super::{Listener, RemoteStore, StoreError, Subscription};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// In-memory store with push notifications.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<MemoryStoreInner>,
    /// Held from computing a mutation's notifications until they are
    /// delivered. Always taken before `state`.
    delivery: Mutex<()>,
}

struct MemoryStoreInner {
    root: Value,
    listeners: BTreeMap<u64, Registered>,
    next_listener_id: u64,
    offline: bool,
    fail_next_write: Option<String>,
    fail_next_read: Option<String>,
    write_count: u64,
}

struct Registered {
    path: Vec<String>,
    listener: Listener,
}

impl Default for MemoryStoreInner {
    fn default() -> Self {
        Self {
            root: Value::Object(Map::new()),
            listeners: BTreeMap::new(),
            next_listener_id: 0,
            offline: false,
            fail_next_write: None,
            fail_next_read: None,
            write_count: 0,
        }
    }
}

type Notifications = Vec<(Listener, Option<Value>)>;

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(MemoryStoreInner::default()),
                delivery: Mutex::new(()),
            }),
        }
    }

    /// Create a store holding an existing tree.
    pub fn from_root(root: Value) -> Self {
        let store = Self::new();
        store.lock().root = normalize_root(root);
        store
    }

    /// A copy of the whole tree.
    pub fn snapshot(&self) -> Value {
        self.lock().root.clone()
    }

    /// Replace the whole tree, notifying every listener whose value changed.
    pub fn replace_root(&self, root: Value) {
        let _delivery = self.shared.deliver();
        let notifications = {
            let mut inner = self.lock();
            let new_root = normalize_root(root);
            let changed = changed_listeners(&inner, |_| true, |old| *old = new_root);
            apply_and_diff(&mut inner, changed)
        };
        dispatch(notifications);
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Number of successful writes and deletes so far.
    pub fn write_count(&self) -> u64 {
        self.lock().write_count
    }

    /// Simulate losing (or regaining) the connection.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Cause the next write or delete to fail with the given error.
    pub fn fail_next_write(&self, error: &str) {
        self.lock().fail_next_write = Some(error.to_string());
    }

    /// Cause the next read to fail with the given error.
    pub fn fail_next_read(&self, error: &str) {
        self.lock().fail_next_read = Some(error.to_string());
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.shared.lock()
    }

    fn mutate(
        &self,
        path: &str,
        op: impl FnOnce(&mut Value, &[String]),
    ) -> Result<(), StoreError> {
        let segments = tree::split(path)?;
        let _delivery = self.shared.deliver();
        let notifications = {
            let mut inner = self.lock();
            if inner.offline {
                return Err(StoreError::Unavailable("offline".into()));
            }
            if let Some(reason) = inner.fail_next_write.take() {
                return Err(StoreError::WriteFailed {
                    path: path.to_string(),
                    reason,
                });
            }
            let changed = changed_listeners(
                &inner,
                |registered| tree::related(&registered.path, &segments),
                |root| op(root, &segments),
            );
            inner.write_count += 1;
            apply_and_diff(&mut inner, changed)
        };
        dispatch(notifications);
        Ok(())
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self) -> MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemoryStore")
            .field("listeners", &inner.listeners.len())
            .field("offline", &inner.offline)
            .finish()
    }
}

/// A pending mutation plus the listeners it may affect and their values
/// before the mutation.
struct Pending {
    new_root: Value,
    watched: Vec<(Listener, Vec<String>, Option<Value>)>,
}

fn changed_listeners(
    inner: &MemoryStoreInner,
    affects: impl Fn(&Registered) -> bool,
    op: impl FnOnce(&mut Value),
) -> Pending {
    let watched = inner
        .listeners
        .values()
        .filter(|registered| affects(registered))
        .map(|registered| {
            let before = tree::get(&inner.root, &registered.path).cloned();
            (registered.listener.clone(), registered.path.clone(), before)
        })
        .collect();
    let mut new_root = inner.root.clone();
    op(&mut new_root);
    Pending { new_root, watched }
}

fn apply_and_diff(inner: &mut MemoryStoreInner, pending: Pending) -> Notifications {
    inner.root = pending.new_root;
    pending
        .watched
        .into_iter()
        .filter_map(|(listener, path, before)| {
            let after = tree::get(&inner.root, &path).cloned();
            (after != before).then_some((listener, after))
        })
        .collect()
}

/// Runs with the delivery lock held and the state lock released, so
/// listeners may read the store.
fn dispatch(notifications: Notifications) {
    for (listener, value) in notifications {
        listener(value);
    }
}

fn normalize_root(root: Value) -> Value {
    if root.is_object() {
        root
    } else {
        Value::Object(Map::new())
    }
}

/// Waits for any delivery in progress, so the listener never runs after
/// this returns.
fn unregister(shared: &Weak<Shared>, id: u64) {
    if let Some(shared) = shared.upgrade() {
        let _delivery = shared.deliver();
        shared.lock().listeners.remove(&id);
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        if tree::contains_null(&value) {
            return Err(StoreError::MalformedWrite {
                path: path.to_string(),
            });
        }
        self.mutate(path, |root, segments| tree::set(root, segments, value))
    }

    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segments = tree::split(path)?;
        let mut inner = self.lock();
        if inner.offline {
            return Err(StoreError::Unavailable("offline".into()));
        }
        if let Some(reason) = inner.fail_next_read.take() {
            return Err(StoreError::ReadFailed {
                path: path.to_string(),
                reason,
            });
        }
        Ok(tree::get(&inner.root, &segments).cloned())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.mutate(path, |root, segments| tree::remove(root, segments))
    }

    fn subscribe(&self, path: &str, listener: Listener) -> Result<Subscription, StoreError> {
        let segments = tree::split(path)?;
        let delivery = self.shared.deliver();
        let (id, current) = {
            let mut inner = self.lock();
            if inner.offline {
                return Err(StoreError::Unavailable("offline".into()));
            }
            let id = inner.next_listener_id;
            inner.next_listener_id += 1;
            let current = tree::get(&inner.root, &segments).cloned();
            inner.listeners.insert(
                id,
                Registered {
                    path: segments,
                    listener: listener.clone(),
                },
            );
            (id, current)
        };

        listener(current);
        drop(delivery);

        let weak = Arc::downgrade(&self.shared);
        Ok(Subscription::new(move || unregister(&weak, id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    type Seen = Arc<Mutex<Vec<Option<Value>>>>;

    fn recorder() -> (Seen, Listener) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: Listener = Arc::new(move |value| sink.lock().unwrap().push(value));
        (seen, listener)
    }

    // ===========================================
    // Basic Operations
    // ===========================================

    #[tokio::test]
    async fn write_then_read() {
        let store = MemoryStore::new();
        store.write("a/b", json!({"x": 1})).await.unwrap();

        assert_eq!(store.read("a/b").await.unwrap(), Some(json!({"x": 1})));
        assert_eq!(store.read("a/b/x").await.unwrap(), Some(json!(1)));
        assert_eq!(store.read("a/c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_absent_is_noop() {
        let store = MemoryStore::new();
        store.delete("nothing/here").await.unwrap();
        assert_eq!(store.snapshot(), json!({}));
    }

    #[tokio::test]
    async fn write_with_null_is_rejected() {
        let store = MemoryStore::new();
        let result = store.write("a", json!({"x": null})).await;
        assert!(matches!(result, Err(StoreError::MalformedWrite { .. })));
        assert_eq!(store.read("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_list_is_distinct_from_absent() {
        let store = MemoryStore::new();
        store.write("a", json!([])).await.unwrap();
        assert_eq!(store.read("a").await.unwrap(), Some(json!([])));
        store.delete("a").await.unwrap();
        assert_eq!(store.read("a").await.unwrap(), None);
    }

    // ===========================================
    // Subscriptions
    // ===========================================

    #[tokio::test]
    async fn subscribe_fires_immediately_with_current_value() {
        let store = MemoryStore::new();
        store.write("a", json!(1)).await.unwrap();

        let (seen, listener) = recorder();
        let _sub = store.subscribe("a", listener).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![Some(json!(1))]);
    }

    #[tokio::test]
    async fn listener_sees_full_value_on_child_write() {
        let store = MemoryStore::new();
        let (seen, listener) = recorder();
        let _sub = store.subscribe("s/events", listener).unwrap();

        store.write("s/events/c1", json!({"id": "c1"})).await.unwrap();
        store.write("s/events/c2", json!({"id": "c2"})).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], None);
        assert_eq!(
            seen[2],
            Some(json!({"c1": {"id": "c1"}, "c2": {"id": "c2"}}))
        );
    }

    #[tokio::test]
    async fn listener_sees_parent_overwrite() {
        let store = MemoryStore::new();
        store.write("s/ids", json!(["a"])).await.unwrap();
        let (seen, listener) = recorder();
        let _sub = store.subscribe("s/ids", listener).unwrap();

        store.write("s", json!({"ids": ["a", "b"]})).await.unwrap();

        assert_eq!(seen.lock().unwrap().last().unwrap(), &Some(json!(["a", "b"])));
    }

    #[tokio::test]
    async fn unrelated_and_unchanged_writes_do_not_notify() {
        let store = MemoryStore::new();
        store.write("a", json!(1)).await.unwrap();
        let (seen, listener) = recorder();
        let _sub = store.subscribe("a", listener).unwrap();

        store.write("b", json!(2)).await.unwrap();
        store.write("a", json!(1)).await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_notifies_with_absent() {
        let store = MemoryStore::new();
        store.write("a/b", json!(1)).await.unwrap();
        let (seen, listener) = recorder();
        let _sub = store.subscribe("a/b", listener).unwrap();

        store.delete("a").await.unwrap();

        assert_eq!(seen.lock().unwrap().last().unwrap(), &None);
    }

    #[tokio::test]
    async fn unsubscribe_stops_callbacks() {
        let store = MemoryStore::new();
        let (seen, listener) = recorder();
        let sub = store.subscribe("a", listener).unwrap();
        assert_eq!(store.listener_count(), 1);

        sub.unsubscribe();
        assert_eq!(store.listener_count(), 0);

        store.write("a", json!(1)).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_notify_in_order() {
        let store = MemoryStore::new();
        let (seen, listener) = recorder();
        let _sub = store.subscribe("x", listener).unwrap();

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = store.clone();
                tokio::spawn(async move {
                    for i in 0..200 {
                        store.write(&format!("x/w{w}"), json!(i)).await.unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.last().unwrap(), &store.snapshot().get("x").cloned());

        // Every writer's counter only moves forward across notifications.
        for w in 0..4 {
            let key = format!("w{w}");
            let counts: Vec<i64> = seen
                .iter()
                .filter_map(|value| value.as_ref()?.get(&key)?.as_i64())
                .collect();
            assert!(counts.windows(2).all(|pair| pair[0] <= pair[1]));
            assert_eq!(counts.last(), Some(&199));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn no_callback_after_unsubscribe_returns() {
        let store = MemoryStore::new();
        let closed = Arc::new(AtomicBool::new(false));
        let late = Arc::new(AtomicUsize::new(0));

        let listener: Listener = {
            let closed = closed.clone();
            let late = late.clone();
            Arc::new(move |_| {
                if closed.load(Ordering::SeqCst) {
                    late.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        let sub = store.subscribe("x", listener).unwrap();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..2000 {
                    store.write("x", json!(i)).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        sub.unsubscribe();
        closed.store(true, Ordering::SeqCst);
        writer.await.unwrap();

        assert_eq!(late.load(Ordering::SeqCst), 0);
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn listener_may_read_the_store() {
        let store = MemoryStore::new();
        let (seen, recorded) = recorder();
        let reader = store.clone();
        let listener: Listener = Arc::new(move |_| recorded(Some(reader.snapshot())));
        let _sub = store.subscribe("a", listener).unwrap();

        store.write("a", json!(1)).await.unwrap();

        assert_eq!(seen.lock().unwrap().last().unwrap(), &Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let device_a = MemoryStore::new();
        let device_b = device_a.clone();
        let (seen, listener) = recorder();
        let _sub = device_b.subscribe("x", listener).unwrap();

        device_a.write("x", json!("hi")).await.unwrap();

        assert_eq!(seen.lock().unwrap().last().unwrap(), &Some(json!("hi")));
    }

    #[tokio::test]
    async fn replace_root_notifies_changed_paths_only() {
        let store = MemoryStore::from_root(json!({"a": 1, "b": 2}));
        let (seen_a, listener_a) = recorder();
        let (seen_b, listener_b) = recorder();
        let _a = store.subscribe("a", listener_a).unwrap();
        let _b = store.subscribe("b", listener_b).unwrap();

        store.replace_root(json!({"a": 1, "b": 3}));

        assert_eq!(seen_a.lock().unwrap().len(), 1);
        assert_eq!(seen_b.lock().unwrap().last().unwrap(), &Some(json!(3)));
    }

    // ===========================================
    // Failure Injection
    // ===========================================

    #[tokio::test]
    async fn forced_write_failure_is_one_shot() {
        let store = MemoryStore::new();
        store.fail_next_write("quota");

        let result = store.write("a", json!(1)).await;
        assert!(matches!(result, Err(StoreError::WriteFailed { .. })));
        assert_eq!(store.read("a").await.unwrap(), None);

        store.write("a", json!(1)).await.unwrap();
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn forced_read_failure() {
        let store = MemoryStore::new();
        store.fail_next_read("timeout");
        assert!(matches!(
            store.read("a").await,
            Err(StoreError::ReadFailed { .. })
        ));
        assert!(store.read("a").await.is_ok());
    }

    #[tokio::test]
    async fn offline_store_refuses_everything() {
        let store = MemoryStore::new();
        store.set_offline(true);

        assert!(matches!(
            store.write("a", json!(1)).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.read("a").await.is_err());
        assert!(store.subscribe("a", Arc::new(|_| {})).is_err());

        store.set_offline(false);
        assert!(store.write("a", json!(1)).await.is_ok());
    }

    #[tokio::test]
    async fn invalid_path_is_rejected() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.write("", json!(1)).await,
            Err(StoreError::InvalidPath(_))
        ));
    }
}
