//! Follow the session live.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use super::{open, print_events};
use crate::commands::status::print_session;

/// Print the view every time it changes until Ctrl+C.
///
/// The shared store file is re-read every `interval` so writes from the
/// other device show up here.
pub async fn run(data_dir: &Path, store_path: &Path, interval: Duration) -> Result<()> {
    let device = open(data_dir, store_path).await?;
    let mut rx = device.client.watch();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    println!("Watching {}. Press Ctrl+C to stop.", store_path.display());
    println!();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut last = None;
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("Failed to listen for Ctrl+C")?;
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = device.store.refresh().await {
                    warn!(error = %e, "Failed to refresh store");
                }
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let view = rx.borrow_and_update().clone();
        if last.as_ref() != Some(&view) {
            print_session(&view);
            println!();
            print_events(&view);
            println!("---");
            last = Some(view);
        }
    }

    println!();
    println!("Shutting down...");
    device.close().await;
    println!("Done.");

    Ok(())
}
