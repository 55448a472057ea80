//! Record, edit and list labor events.

use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::Path;
use sync_types::{now_millis, Event, EventId, EventPatch, EventType};

use super::{open, print_events, Device};

/// Labor milestones that can be marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MarkKind {
    /// Membranes ruptured.
    WaterBroke,
    /// Early labor began.
    Early,
    /// Active labor began.
    Active,
    /// Transition began.
    Transition,
}

impl From<MarkKind> for EventType {
    fn from(kind: MarkKind) -> Self {
        match kind {
            MarkKind::WaterBroke => EventType::WaterBroke,
            MarkKind::Early => EventType::LaborPhaseEarly,
            MarkKind::Active => EventType::LaborPhaseActive,
            MarkKind::Transition => EventType::LaborPhaseTransition,
        }
    }
}

/// Start timing a contraction.
pub async fn start(data_dir: &Path, store_path: &Path) -> Result<()> {
    let device = open(data_dir, store_path).await?;
    if let Some(running) = in_progress(&device) {
        device.close().await;
        anyhow::bail!("Contraction {} is already in progress", running.id);
    }

    let event = Event::contraction(now_millis());
    let id = event.id.clone();
    device.client.sync_event(event).await;
    device.settle().await;

    println!("Contraction started: {id}");
    device.close().await;
    Ok(())
}

/// Stop the contraction in progress.
pub async fn stop(data_dir: &Path, store_path: &Path) -> Result<()> {
    let device = open(data_dir, store_path).await?;
    let Some(mut running) = in_progress(&device) else {
        device.close().await;
        anyhow::bail!("No contraction in progress");
    };

    running.finish(now_millis());
    let secs = running.duration.unwrap_or_default();
    device
        .client
        .update_event(&running.id, &EventPatch::duration(secs))
        .await;
    device.settle().await;

    println!("Contraction {} lasted {secs}s", running.id);
    device.close().await;
    Ok(())
}

/// Record a labor milestone.
pub async fn mark(data_dir: &Path, store_path: &Path, kind: MarkKind) -> Result<()> {
    let device = open(data_dir, store_path).await?;
    let event = Event::marker(kind.into(), now_millis());
    let id = event.id.clone();
    let label = event.kind;
    device.client.sync_event(event).await;
    device.settle().await;

    println!("Marked {label}: {id}");
    device.close().await;
    Ok(())
}

/// Correct the duration of a recorded contraction.
pub async fn edit(data_dir: &Path, store_path: &Path, id: &str, duration: u32) -> Result<()> {
    let device = open(data_dir, store_path).await?;
    let id = match find(&device, id) {
        Ok(id) => id,
        Err(e) => {
            device.close().await;
            return Err(e);
        }
    };

    device
        .client
        .update_event(&id, &EventPatch::duration(duration))
        .await;
    device.settle().await;

    println!("Updated {id}: {duration}s");
    device.close().await;
    Ok(())
}

/// Delete an event on every paired device.
pub async fn delete(data_dir: &Path, store_path: &Path, id: &str) -> Result<()> {
    let device = open(data_dir, store_path).await?;
    let id = match find(&device, id) {
        Ok(id) => id,
        Err(e) => {
            device.close().await;
            return Err(e);
        }
    };

    device.client.sync_delete(&id).await;
    device.settle().await;

    println!("Deleted {id}");
    device.close().await;
    Ok(())
}

/// Print the merged event list.
pub async fn list(data_dir: &Path, store_path: &Path) -> Result<()> {
    let device = open(data_dir, store_path).await?;
    device.settle().await;
    print_events(&device.client.view());
    device.close().await;
    Ok(())
}

/// Drop every event here and, when attached, in the shared session.
pub async fn reset(data_dir: &Path, store_path: &Path) -> Result<()> {
    let device = open(data_dir, store_path).await?;
    device.client.clear_all_events().await;
    device.settle().await;

    println!("All events cleared.");
    device.close().await;
    Ok(())
}

fn in_progress(device: &Device) -> Option<Event> {
    device
        .client
        .events()
        .into_iter()
        .find(Event::is_in_progress)
}

fn find(device: &Device, input: &str) -> Result<EventId> {
    let id = EventId::parse(input).with_context(|| format!("Invalid event id: {input}"))?;
    if !device.client.events().iter().any(|e| e.id == id) {
        anyhow::bail!("No event with id {id}");
    }
    Ok(id)
}
