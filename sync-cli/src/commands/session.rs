//! Create, join, leave and clear sessions.

use anyhow::{Context, Result};
use std::path::Path;

use super::open;

/// Create a session and print the code to share.
pub async fn create(data_dir: &Path, store_path: &Path) -> Result<()> {
    let device = open(data_dir, store_path).await?;
    let code = device
        .client
        .create_session()
        .await
        .context("Failed to create session")?;
    device.settle().await;

    println!("Session code: {code}");
    println!();
    println!("On the other device run: laborsync join {code}");

    device.close().await;
    Ok(())
}

/// Join a partner's session.
pub async fn join(data_dir: &Path, store_path: &Path, code: &str) -> Result<()> {
    let device = open(data_dir, store_path).await?;
    if !device.client.join_session(code).await {
        device.close().await;
        anyhow::bail!("Session not found or expired: {code}");
    }
    device.settle().await;

    let view = device.client.view();
    println!(
        "Joined session {} ({} devices, {} events)",
        code.trim().to_uppercase(),
        view.device_count,
        view.events.len()
    );

    device.close().await;
    Ok(())
}

/// Leave the current session, keeping local events.
pub async fn leave(data_dir: &Path, store_path: &Path) -> Result<()> {
    let device = open(data_dir, store_path).await?;
    let Some(code) = device.client.session_code() else {
        println!("Not in a session.");
        device.close().await;
        return Ok(());
    };

    device.client.leave_session().await;
    println!("Left session {code}. Local events kept.");

    device.close().await;
    Ok(())
}

/// Leave the current session and wipe its shared history.
pub async fn clear(data_dir: &Path, store_path: &Path) -> Result<()> {
    let device = open(data_dir, store_path).await?;
    let code = device.client.session_code();

    device.client.clear_session().await;
    match code {
        Some(code) => println!("Cleared session {code}."),
        None => println!("Cleared local events."),
    }

    device.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::init;
    use tempfile::{tempdir, TempDir};

    struct Pair {
        _root: TempDir,
        a: std::path::PathBuf,
        b: std::path::PathBuf,
        store: std::path::PathBuf,
    }

    async fn two_devices() -> Pair {
        let root = tempdir().unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        let store = root.path().join("shared.json");
        init::run(&a, &store).await.unwrap();
        init::run(&b, &store).await.unwrap();
        Pair {
            _root: root,
            a,
            b,
            store,
        }
    }

    #[tokio::test]
    async fn create_then_join_pairs_both_devices() {
        let pair = two_devices().await;
        create(&pair.a, &pair.store).await.unwrap();

        let code = open(&pair.a, &pair.store)
            .await
            .unwrap()
            .client
            .session_code()
            .unwrap();

        join(&pair.b, &pair.store, code.as_str()).await.unwrap();

        let b = open(&pair.b, &pair.store).await.unwrap();
        assert!(b.client.is_paired());
        assert_eq!(b.client.session_code(), Some(code));
    }

    #[tokio::test]
    async fn join_unknown_code_fails() {
        let pair = two_devices().await;
        let result = join(&pair.b, &pair.store, "ZZZZZZ").await;
        assert!(result.is_err());

        let b = open(&pair.b, &pair.store).await.unwrap();
        assert!(b.client.session_code().is_none());
    }

    #[tokio::test]
    async fn leave_forgets_the_session() {
        let pair = two_devices().await;
        create(&pair.a, &pair.store).await.unwrap();
        leave(&pair.a, &pair.store).await.unwrap();

        let a = open(&pair.a, &pair.store).await.unwrap();
        assert!(a.client.session_code().is_none());
    }

    #[tokio::test]
    async fn leave_without_session_is_ok() {
        let pair = two_devices().await;
        leave(&pair.a, &pair.store).await.unwrap();
        clear(&pair.a, &pair.store).await.unwrap();
    }
}
