//! # laborsync
//!
//! CLI tool for trying out LaborSync pairing between two devices.
//!
//! Each device keeps its identity and events in its own data directory.
//! Two devices pair by pointing `--store` at the same file.
//!
//! ## Commands
//!
//! - `init`: Initialize device identity
//! - `create` / `join`: Create or join a session
//! - `leave` / `clear`: Leave a session, optionally wiping its history
//! - `start` / `stop` / `mark`: Record events
//! - `edit` / `delete` / `list` / `reset`: Manage events
//! - `status` / `watch`: Show the session
//!
//! ## Example
//!
//! ```bash
//! # Two devices sharing one store file
//! laborsync --data-dir /tmp/mom --store /tmp/shared.json init
//! laborsync --data-dir /tmp/partner --store /tmp/shared.json init
//!
//! # Create a session and share the code
//! laborsync --data-dir /tmp/mom --store /tmp/shared.json create
//!
//! # On the other device, join it
//! laborsync --data-dir /tmp/partner --store /tmp/shared.json join AB12CD
//!
//! # Time a contraction, then list from the other device
//! laborsync --data-dir /tmp/mom --store /tmp/shared.json start
//! laborsync --data-dir /tmp/mom --store /tmp/shared.json stop
//! laborsync --data-dir /tmp/partner --store /tmp/shared.json list
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod store;

use commands::events::MarkKind;
use commands::{events, init, session, status, watch};
use config::Config;

/// CLI tool for trying out LaborSync pairing.
#[derive(Parser, Debug)]
#[command(name = "laborsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for storing device identity and events
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Shared store file (overrides `store_path` in config.toml)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize device identity
    Init,

    /// Show pairing status
    Status,

    /// Create a session and display its code
    Create,

    /// Join a partner's session
    Join {
        /// Six-character session code
        code: String,
    },

    /// Leave the current session, keeping local events
    Leave,

    /// Leave the current session and delete its shared history
    Clear,

    /// Start timing a contraction
    Start,

    /// Stop the contraction in progress
    Stop,

    /// Record a labor milestone
    Mark {
        /// Milestone to record
        #[arg(value_enum)]
        kind: MarkKind,
    },

    /// Correct the duration of a contraction
    Edit {
        /// Event id (see `list`)
        id: String,

        /// New duration in seconds
        #[arg(long, short)]
        duration: u32,
    },

    /// Delete an event
    Delete {
        /// Event id (see `list`)
        id: String,
    },

    /// List events, newest first
    List,

    /// Delete every event on all paired devices
    Reset,

    /// Follow the session until Ctrl+C
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    let config = Config::load_or_default(&data_dir)?;
    init_tracing(&config);

    let store_path = match cli.store {
        Some(path) => path,
        None => config.store_path(&data_dir),
    };

    match cli.command {
        Commands::Init => init::run(&data_dir, &store_path).await?,
        Commands::Status => status::run(&data_dir, &store_path).await?,
        Commands::Create => session::create(&data_dir, &store_path).await?,
        Commands::Join { code } => session::join(&data_dir, &store_path, &code).await?,
        Commands::Leave => session::leave(&data_dir, &store_path).await?,
        Commands::Clear => session::clear(&data_dir, &store_path).await?,
        Commands::Start => events::start(&data_dir, &store_path).await?,
        Commands::Stop => events::stop(&data_dir, &store_path).await?,
        Commands::Mark { kind } => events::mark(&data_dir, &store_path, kind).await?,
        Commands::Edit { id, duration } => {
            events::edit(&data_dir, &store_path, &id, duration).await?
        }
        Commands::Delete { id } => events::delete(&data_dir, &store_path, &id).await?,
        Commands::List => events::list(&data_dir, &store_path).await?,
        Commands::Reset => events::reset(&data_dir, &store_path).await?,
        Commands::Watch => {
            let interval = Duration::from_millis(config.watch_interval_ms.max(50));
            watch::run(&data_dir, &store_path, interval).await?
        }
    }

    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` or the configured default.
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory for laborsync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("org", "laborsync", "laborsync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
