//! CLI command implementations.

pub mod events;
pub mod init;
pub mod session;
pub mod status;
pub mod watch;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use sync_client::{FileLocalStore, SyncClient, SyncConfig, SyncView};
use sync_types::Event;
use tracing::debug;

use crate::config::DEVICE_FILE;
use crate::store::FileStore;

/// The client type every command drives.
pub type Client = SyncClient<FileStore, FileLocalStore>;

/// How long a one-shot command waits for pushes to land before exiting.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

/// An opened device: the client plus the shared store it runs on.
pub struct Device {
    /// The sync façade.
    pub client: Client,
    /// The shared store, for refreshing from other processes.
    pub store: Arc<FileStore>,
}

/// Open the device in `data_dir` against the shared store at `store_path`.
pub async fn open(data_dir: &Path, store_path: &Path) -> Result<Device> {
    if !is_initialized(data_dir) {
        anyhow::bail!("Device not initialized. Run 'laborsync init' first.");
    }
    open_unchecked(data_dir, store_path).await
}

pub(crate) async fn open_unchecked(data_dir: &Path, store_path: &Path) -> Result<Device> {
    let store = Arc::new(
        FileStore::open(store_path)
            .await
            .with_context(|| format!("Failed to open store {}", store_path.display()))?,
    );
    let local = FileLocalStore::new(data_dir.join(DEVICE_FILE));
    let client = SyncClient::open(SyncConfig::default(), store.clone(), local)
        .await
        .context("Failed to open device")?;
    Ok(Device { client, store })
}

/// True once `init` has run in `data_dir`.
pub fn is_initialized(data_dir: &Path) -> bool {
    data_dir.join(DEVICE_FILE).exists()
}

impl Device {
    /// Wait until presence and the first snapshots have been processed, so a
    /// one-shot command does not exit mid-reconciliation.
    ///
    /// Gives up quietly after a short timeout (for example when a write was
    /// lost and nothing will ever be marked synced).
    pub async fn settle(&self) {
        if !self.client.state().is_attached() {
            return;
        }
        let mut rx = self.client.watch();
        let settled = rx.wait_for(|v| v.device_count > 0 && v.events.iter().all(|e| e.synced));
        if tokio::time::timeout(SETTLE_TIMEOUT, settled).await.is_err() {
            debug!("Gave up waiting for the store to settle");
        }
    }

    /// Release subscriptions before exiting.
    pub async fn close(self) {
        self.client.close().await;
    }
}

/// Print the event list as a table.
pub fn print_events(view: &SyncView) {
    if view.events.is_empty() {
        println!("No events.");
        return;
    }
    println!(
        "{:<36}  {:<22}  {:>8}  {:>8}  {:>8}  {}",
        "ID", "TYPE", "START", "DURATION", "END", "SYNCED"
    );
    for event in &view.events {
        println!("{}", format_event(event));
    }
}

/// One table row.
pub fn format_event(event: &Event) -> String {
    let duration = match event.duration {
        Some(secs) => format!("{secs}s"),
        None if event.is_in_progress() => "running".to_string(),
        None => "-".to_string(),
    };
    let end = event
        .end_time()
        .map(format_clock)
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:<36}  {:<22}  {:>8}  {:>8}  {:>8}  {}",
        event.id.as_str(),
        event.kind.as_str(),
        format_clock(event.start_time),
        duration,
        end,
        if event.synced { "yes" } else { "no" }
    )
}

/// Format epoch milliseconds as a UTC time of day.
pub fn format_clock(ms: i64) -> String {
    let secs = ms.div_euclid(1000).rem_euclid(86_400);
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::{EventId, EventType};
    use tempfile::tempdir;

    #[test]
    fn format_clock_is_utc_time_of_day() {
        assert_eq!(format_clock(0), "00:00:00");
        assert_eq!(format_clock(61_000), "00:01:01");
        assert_eq!(format_clock(86_400_000 + 3_600_000), "01:00:00");
    }

    #[test]
    fn format_event_shows_running_contractions() {
        let event = Event::new(EventId::parse("c1").unwrap(), 0, EventType::Contraction);
        let row = format_event(&event);
        assert!(row.contains("running"));
        assert!(row.contains("contraction"));

        let done = event.with_duration(60);
        assert!(format_event(&done).contains("00:01:00"));
    }

    #[tokio::test]
    async fn open_requires_init() {
        let dir = tempdir().unwrap();
        let result = open(dir.path(), &dir.path().join("remote.json")).await;
        assert!(result.is_err());
    }
}
