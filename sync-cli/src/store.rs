//! File-backed remote store.
//!
//! Keeps the whole store tree in one JSON file so two `laborsync`
//! processes with different data directories can pair through it. Every
//! operation first re-reads the file, so changes made by the other process
//! are picked up and pushed to local listeners.
//!
//! There is no cross-process locking: two processes writing at the same
//! instant race at file granularity and the last rename wins.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use sync_client::{Listener, MemoryStore, RemoteStore, StoreError, Subscription};
use tokio::sync::Mutex;
use tracing::debug;

/// Remote store persisted to a JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    tree: MemoryStore,
    lock: Mutex<()>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let root = load(&path).await?;
        Ok(Self {
            path,
            tree: MemoryStore::from_root(root),
            lock: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, notifying listeners of anything that changed.
    ///
    /// Returns true if the file differed from the in-memory tree.
    pub async fn refresh(&self) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        self.reload().await
    }

    async fn reload(&self) -> Result<bool, StoreError> {
        let root = load(&self.path).await?;
        if root == self.tree.snapshot() {
            return Ok(false);
        }
        debug!(path = %self.path.display(), "Store file changed");
        self.tree.replace_root(root);
        Ok(true)
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let failed = |e: std::io::Error| StoreError::WriteFailed {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(failed)?;
        }
        let content = serde_json::to_string_pretty(&self.tree.snapshot()).map_err(|e| {
            StoreError::WriteFailed {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await.map_err(failed)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(failed)?;
        Ok(())
    }
}

async fn load(path: &Path) -> Result<Value, StoreError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Value::Object(Map::new()))
        }
        Err(e) => return Err(StoreError::Unavailable(format!("{}: {e}", path.display()))),
    };
    if content.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(&content).map_err(|e| StoreError::ReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl RemoteStore for FileStore {
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.reload().await?;
        self.tree.write(path, value).await?;
        self.persist().await
    }

    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.lock.lock().await;
        self.reload().await?;
        self.tree.read(path).await
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.reload().await?;
        self.tree.delete(path).await?;
        self.persist().await
    }

    fn subscribe(&self, path: &str, listener: Listener) -> Result<Subscription, StoreError> {
        self.tree.subscribe(path, listener)
    }
}
