//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `library`: Playlist, track and history listings
//! - `lifecycle`: Retry, subscription, deletion and stuck-track sweeps
//! - `jobs`: Queue inspection

mod jobs;
mod library;
mod lifecycle;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::watch;

use crate::config::{self, Config};
use crate::db;
use crate::events::NullNotifier;
use crate::pipeline::Pipeline;
use crate::queue::JobQueue;

pub use jobs::cmd_jobs;
pub use library::{cmd_history, cmd_playlists, cmd_tracks};
pub use lifecycle::{cmd_delete_playlist, cmd_rescue, cmd_retry, cmd_retry_playlist, cmd_subscribe};

/// Trackline CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Database path
    #[arg(long, global = true, env = "TRACKLINE_DB")]
    pub db: Option<PathBuf>,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// List playlists with their aggregate status
    Playlists,
    /// List tracks
    Tracks {
        /// Only tracks of this playlist
        #[arg(short, long)]
        playlist: Option<i64>,
        /// Only tracks in this status (new, searching, queued, downloading, completed, error)
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Reset a track to `new` and submit it for search again
    Retry {
        /// Track ID
        id: i64,
    },
    /// Retry every failed track of a playlist
    RetryPlaylist {
        /// Playlist ID
        id: i64,
    },
    /// Enable periodic synchronization for a playlist
    Subscribe {
        /// Playlist ID
        id: i64,
    },
    /// Disable periodic synchronization for a playlist
    Unsubscribe {
        /// Playlist ID
        id: i64,
    },
    /// Delete a playlist and its tracks (history is kept)
    DeletePlaylist {
        /// Playlist ID
        id: i64,
    },
    /// Show download history grouped by playlist
    History {
        /// Number of recent history rows to consider
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Flag tracks stuck in a pipeline stage as errors
    Rescue {
        /// Also resubmit stuck tracks instead of flagging them
        #[arg(long)]
        resubmit: bool,
    },
    /// Show pending job counts and failed jobs
    Jobs,
}

/// Run a CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;

    let config = match &cli.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    };
    let db_url = db::db_url(cli.db.as_deref());

    rt.block_on(async {
        let pipeline = open_pipeline(&db_url, config).await?;

        match &cli.command {
            Commands::Playlists => cmd_playlists(&pipeline).await,
            Commands::Tracks { playlist, status } => {
                cmd_tracks(&pipeline, *playlist, status.as_deref()).await
            }
            Commands::Retry { id } => cmd_retry(&pipeline, *id).await,
            Commands::RetryPlaylist { id } => cmd_retry_playlist(&pipeline, *id).await,
            Commands::Subscribe { id } => cmd_subscribe(&pipeline, *id, true).await,
            Commands::Unsubscribe { id } => cmd_subscribe(&pipeline, *id, false).await,
            Commands::DeletePlaylist { id } => cmd_delete_playlist(&pipeline, *id).await,
            Commands::History { limit } => cmd_history(&pipeline, *limit).await,
            Commands::Rescue { resubmit } => cmd_rescue(&pipeline, *resubmit).await,
            Commands::Jobs => cmd_jobs(&pipeline).await,
        }
    })
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Open the database and build a pipeline that broadcasts nowhere.
///
/// The config channel's sender is dropped right away; one-shot commands only
/// read the snapshot.
pub(crate) async fn open_pipeline(db_url: &str, config: Config) -> anyhow::Result<Pipeline> {
    let pool = db::init_db(db_url).await?;
    tracing::debug!(target: "cli", db = db_url, "Database opened");
    let (_tx, rx) = watch::channel(config);
    Ok(Pipeline::new(
        pool.clone(),
        JobQueue::new(pool),
        Arc::new(NullNotifier),
        rx,
    ))
}
