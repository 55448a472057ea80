//! Device-local persistence.
//!
//! A small key-value store provided by the host platform. [`DeviceStorage`]
//! layers the typed keys the façade needs on top of it:
//!
//! - `deviceId` - this device's identity, generated once
//! - `sessionCode` - the session to revalidate after a restart
//! - `wasPaired` - distinguishes "created a code nobody joined" from "paired"
//! - `events` - the local event collection, so pre-pairing history survives
//!
//! Malformed values are logged and treated as absent.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use sync_types::{DeviceId, Event, SessionCode};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const DEVICE_ID_KEY: &str = "deviceId";
const SESSION_CODE_KEY: &str = "sessionCode";
const WAS_PAIRED_KEY: &str = "wasPaired";
const EVENTS_KEY: &str = "events";

/// Local persistence errors.
#[derive(Debug, Error)]
pub enum LocalStoreError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file could not be parsed or encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Host key-value store.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Read a key.
    async fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError>;

    /// Write a key.
    async fn set(&self, key: &str, value: String) -> Result<(), LocalStoreError>;

    /// Remove a key. Absent keys are a no-op.
    async fn remove(&self, key: &str) -> Result<(), LocalStoreError>;
}

/// In-memory local store. Clones share state, which lets a test "restart"
/// a device by opening a new client over a clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocalStore {
    values: Arc<StdMutex<BTreeMap<String, String>>>,
}

impl MemoryLocalStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), LocalStoreError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), LocalStoreError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Local store backed by one JSON object file.
///
/// The whole file is rewritten on every change, through a temporary file
/// that is renamed into place, so readers never see a partial write. On
/// Unix it is created with mode 0600.
#[derive(Debug)]
pub struct FileLocalStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileLocalStore {
    /// Use the file at `path`. It is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, LocalStoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, values: &BTreeMap<String, String>) -> Result<(), LocalStoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&tmp, perms).await?;
        }

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl LocalStore for FileLocalStore {
    async fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), LocalStoreError> {
        let _guard = self.lock.lock().await;
        let mut values = self.load().await?;
        values.insert(key.to_string(), value);
        self.save(&values).await
    }

    async fn remove(&self, key: &str) -> Result<(), LocalStoreError> {
        let _guard = self.lock.lock().await;
        let mut values = self.load().await?;
        if values.remove(key).is_some() {
            self.save(&values).await?;
        }
        Ok(())
    }
}

/// Typed view over a [`LocalStore`].
#[derive(Debug)]
pub struct DeviceStorage<L: LocalStore> {
    store: L,
}

impl<L: LocalStore> DeviceStorage<L> {
    /// Wrap a store.
    pub fn new(store: L) -> Self {
        Self { store }
    }

    /// The persisted device id, if any.
    pub async fn device_id(&self) -> Result<Option<DeviceId>, LocalStoreError> {
        Ok(self.store.get(DEVICE_ID_KEY).await?.and_then(|raw| {
            DeviceId::parse(&raw)
                .map_err(|e| warn!(error = %e, "Ignoring malformed persisted device id"))
                .ok()
        }))
    }

    /// Persist the device id.
    pub async fn save_device_id(&self, device: &DeviceId) -> Result<(), LocalStoreError> {
        self.store
            .set(DEVICE_ID_KEY, device.as_str().to_string())
            .await
    }

    /// The persisted session code and "was paired" flag.
    pub async fn session(&self) -> Result<Option<(SessionCode, bool)>, LocalStoreError> {
        let Some(raw) = self.store.get(SESSION_CODE_KEY).await? else {
            return Ok(None);
        };
        let code = match SessionCode::parse(&raw) {
            Ok(code) => code,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed persisted session code");
                return Ok(None);
            }
        };
        let was_paired = self
            .store
            .get(WAS_PAIRED_KEY)
            .await?
            .is_some_and(|raw| raw == "true");
        Ok(Some((code, was_paired)))
    }

    /// Persist the session code.
    pub async fn save_session_code(&self, code: &SessionCode) -> Result<(), LocalStoreError> {
        self.store
            .set(SESSION_CODE_KEY, code.as_str().to_string())
            .await
    }

    /// Persist the "was paired" flag.
    pub async fn save_paired(&self, paired: bool) -> Result<(), LocalStoreError> {
        self.store.set(WAS_PAIRED_KEY, paired.to_string()).await
    }

    /// Forget the session code and paired flag. The device id is kept.
    pub async fn clear_session(&self) -> Result<(), LocalStoreError> {
        self.store.remove(SESSION_CODE_KEY).await?;
        self.store.remove(WAS_PAIRED_KEY).await
    }

    /// The local event collection. Missing or malformed data loads as empty.
    pub async fn events(&self) -> Result<Vec<Event>, LocalStoreError> {
        let Some(raw) = self.store.get(EVENTS_KEY).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<LocalEvent>>(&raw) {
            Ok(events) => {
                debug!(count = events.len(), "Loaded local events");
                Ok(events.into_iter().map(Event::from).collect())
            }
            Err(e) => {
                warn!(error = %e, "Ignoring malformed local events");
                Ok(Vec::new())
            }
        }
    }

    /// Replace the local event collection.
    pub async fn save_events(&self, events: &[Event]) -> Result<(), LocalStoreError> {
        let stored: Vec<LocalEvent> = events.iter().cloned().map(LocalEvent::from).collect();
        let raw = serde_json::to_string(&stored)?;
        self.store.set(EVENTS_KEY, raw).await
    }
}

/// Local copy of an event, keeping the `synced` flag the remote form omits.
#[derive(serde::Serialize, serde::Deserialize)]
struct LocalEvent {
    #[serde(flatten)]
    event: Event,
    #[serde(default)]
    synced: bool,
}

impl From<Event> for LocalEvent {
    fn from(event: Event) -> Self {
        let synced = event.synced;
        Self { event, synced }
    }
}

impl From<LocalEvent> for Event {
    fn from(local: LocalEvent) -> Self {
        let mut event = local.event;
        event.synced = local.synced;
        event
    }
}
