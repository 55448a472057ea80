//! Show pairing status.

use anyhow::Result;
use std::path::Path;
use sync_client::SyncView;
use sync_core::PairingState;

use super::{is_initialized, open};

/// Run the status command.
pub async fn run(data_dir: &Path, store_path: &Path) -> Result<()> {
    println!("=== laborsync status ===");
    println!();

    if !is_initialized(data_dir) {
        println!("Device: NOT INITIALIZED");
        println!();
        println!("Run 'laborsync init' to initialize.");
        return Ok(());
    }

    let device = open(data_dir, store_path).await?;
    device.settle().await;
    let view = device.client.view();

    println!("Device:");
    println!("  ID:    {}", device.client.device_id());
    println!("  Store: {}", device.store.path().display());
    println!();
    print_session(&view);

    device.close().await;
    Ok(())
}

/// Print the session block for `view`.
pub fn print_session(view: &SyncView) {
    println!("Session:");
    println!("  State:   {}", state_label(&view.state));
    match &view.session_code {
        Some(code) => println!("  Code:    {code}"),
        None => println!("  Share:   {} (run 'laborsync create')", view.share_code),
    }
    println!("  Devices: {}", view.device_count);
    println!(
        "  Events:  {} ({} unsynced)",
        view.events.len(),
        view.events.iter().filter(|e| !e.synced).count()
    );
}

fn state_label(state: &PairingState) -> &'static str {
    match state {
        PairingState::Unpaired => "unpaired",
        PairingState::HasCode { .. } => "waiting for partner",
        PairingState::Paired { .. } => "paired",
        PairingState::Leaving { .. } => "leaving",
    }
}
