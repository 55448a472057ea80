//! Initialize device identity.

use anyhow::{Context, Result};
use std::path::Path;

use super::{is_initialized, open_unchecked};
use crate::config::{set_dir_permissions_0700, Config, CONFIG_FILE, DEVICE_FILE};

/// Run the init command.
pub async fn run(data_dir: &Path, store_path: &Path) -> Result<()> {
    // Check if already initialized
    if is_initialized(data_dir) {
        anyhow::bail!(
            "Device already initialized. Delete {} to reinitialize.",
            data_dir.join(DEVICE_FILE).display()
        );
    }

    tokio::fs::create_dir_all(data_dir)
        .await
        .context("Failed to create data directory")?;
    set_dir_permissions_0700(data_dir)
        .await
        .context("Failed to restrict data directory")?;

    if !data_dir.join(CONFIG_FILE).exists() {
        Config::default().save(data_dir).await?;
    }

    // Opening a fresh device generates and persists its id
    let device = open_unchecked(data_dir, store_path).await?;
    let device_id = device.client.device_id().clone();
    device.close().await;

    println!("Device initialized successfully!");
    println!();
    println!("  Device ID: {device_id}");
    println!("  Data dir:  {}", data_dir.display());
    println!("  Store:     {}", store_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Create a session: laborsync create");
    println!("  2. Or join your partner's session: laborsync join <code>");

    Ok(())
}
