//! Stuck-track rescue.
//!
//! A track is stuck when it sits in `Searching`, `Queued` or `Downloading`
//! and was created longer ago than the configured timeout.
//!
//! - At startup, before workers run, stuck tracks are reset and
//!   resubmitted even though a stage nominally owns them
//!   ([`rescue_on_startup`]).
//! - While running, a periodic sweep only flags them as failed
//!   ([`flag_stuck_tracks`]); a person decides whether to retry.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::events::Event;
use crate::model::TrackStatus;
use crate::pipeline::Pipeline;

/// Error text put on tracks flagged by the periodic sweep.
pub fn stall_message(status: TrackStatus, timeout: Duration) -> String {
    format!(
        "Stalled while {} for more than {} minutes",
        status,
        timeout.as_secs() / 60
    )
}

/// Creation time before which an active track counts as stuck.
///
/// A timeout reaching past the representable range means nothing is old
/// enough, so the Unix epoch is returned.
fn cutoff(timeout: Duration) -> chrono::DateTime<chrono::Utc> {
    chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|timeout| db::now().checked_sub_signed(timeout))
        .unwrap_or(chrono::DateTime::UNIX_EPOCH)
}

/// Resubmit every stuck track. Returns how many were rescued.
///
/// Per-track failures are logged and skipped.
pub async fn rescue_on_startup(pipeline: &Pipeline, timeout: Duration) -> Result<usize> {
    let stuck = db::get_stuck_tracks(pipeline.pool(), &TrackStatus::ACTIVE, cutoff(timeout)).await?;
    let mut rescued = 0;

    for track in &stuck {
        match pipeline.rescue_track(track.id).await {
            Ok(_) => rescued += 1,
            Err(e) => {
                tracing::warn!(target: "rescuer", track_id = track.id, "Failed to rescue track: {}", e);
            }
        }
    }

    if !stuck.is_empty() {
        tracing::info!(target: "rescuer", rescued, found = stuck.len(), "Rescued stuck tracks on startup");
    }
    Ok(rescued)
}

/// Mark every stuck track as failed. Returns how many were flagged.
pub async fn flag_stuck_tracks(pipeline: &Pipeline, timeout: Duration) -> Result<usize> {
    let pool = pipeline.pool();
    let stuck = db::get_stuck_tracks(pool, &TrackStatus::ACTIVE, cutoff(timeout)).await?;
    let mut flagged = 0;

    for mut track in stuck {
        let message = stall_message(track.status(), timeout);
        let result = match track.mark_error(message) {
            Ok(()) => db::update_track_lifecycle(pool, &track).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => flagged += 1,
            Err(e) => {
                tracing::warn!(target: "rescuer", track_id = track.id, "Failed to flag stuck track: {}", e);
            }
        }
    }

    if flagged > 0 {
        tracing::info!(target: "rescuer", flagged, "Flagged stuck tracks");
        pipeline.notify(Event::PlaylistsUpdated);
    }
    Ok(flagged)
}

/// Commands that can be sent to the rescuer.
#[derive(Debug)]
pub enum RescuerCommand {
    /// Sweep now instead of waiting for the interval
    SweepNow,
    /// Stop the rescuer
    Stop,
}

/// Periodic stuck-track sweep.
pub struct Rescuer {
    pipeline: Pipeline,
    command_tx: mpsc::Sender<RescuerCommand>,
    command_rx: mpsc::Receiver<RescuerCommand>,
}

impl Rescuer {
    pub fn new(pipeline: Pipeline) -> Self {
        let (command_tx, command_rx) = mpsc::channel(8);
        Self {
            pipeline,
            command_tx,
            command_rx,
        }
    }

    /// Get a sender for commands.
    pub fn command_sender(&self) -> mpsc::Sender<RescuerCommand> {
        self.command_tx.clone()
    }

    /// Start the background task.
    ///
    /// Interval and timeout are re-read from the config on every cycle.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut config: watch::Receiver<Config> = self.pipeline.config_receiver();
        let mut watching = true;

        tracing::info!(target: "rescuer", "Rescuer started");

        loop {
            let interval = config.borrow_and_update().rescuer.interval();

            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(RescuerCommand::SweepNow) => self.sweep().await,
                    Some(RescuerCommand::Stop) | None => break,
                },
                changed = config.changed(), if watching => {
                    // Restart the wait with the new interval
                    if changed.is_err() {
                        watching = false;
                    }
                }
                _ = tokio::time::sleep(interval) => self.sweep().await,
            }
        }

        tracing::info!(target: "rescuer", "Rescuer stopped");
    }

    async fn sweep(&self) {
        let timeout = self.pipeline.config().rescuer.stuck_timeout();
        if let Err(e) = flag_stuck_tracks(&self.pipeline, timeout).await {
            tracing::warn!(target: "rescuer", "Stuck-track sweep failed: {}", e);
        }
    }
}
