//! Search -> download pipeline.
//!
//! [`Pipeline`] is the shared entry point: ingestion, synchronization, the
//! rescuer and manual retries all submit work through it. The stage handlers
//! in [`search`] and [`download`] run inside queue workers.
//!
//! Every step reloads the track, applies one state machine transition,
//! persists it and broadcasts `playlists-updated`.

pub mod download;
pub mod search;

pub use download::DownloadStage;
pub use search::SearchStage;

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::watch;

use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::events::{Event, Notifier};
use crate::model::Track;
use crate::queue::{
    JobKind, JobOptions, JobQueue, TrackSnapshot, download_job_id, search_job_id,
};

/// Attempts for a search job. Search failures are recorded on the track, so
/// only infrastructure errors (database, I/O) use these.
pub const SEARCH_ATTEMPTS: u32 = 3;

/// Shared handles for submitting and running pipeline work. Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    pool: SqlitePool,
    queue: JobQueue,
    notifier: Arc<dyn Notifier>,
    config: watch::Receiver<Config>,
}

impl Pipeline {
    pub fn new(
        pool: SqlitePool,
        queue: JobQueue,
        notifier: Arc<dyn Notifier>,
        config: watch::Receiver<Config>,
    ) -> Self {
        Self {
            pool,
            queue,
            notifier,
            config,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Latest published configuration.
    pub fn config(&self) -> Config {
        self.config.borrow().clone()
    }

    pub fn config_receiver(&self) -> watch::Receiver<Config> {
        self.config.clone()
    }

    /// Fire-and-forget event broadcast.
    pub fn notify(&self, event: Event) {
        self.notifier.broadcast(event);
    }

    /// Submit a track to the search stage.
    ///
    /// Returns false when a search job for the track is already waiting or
    /// running.
    pub async fn submit_search(&self, track: &Track) -> Result<bool> {
        let backoff = self.config.borrow().queue.retry_backoff();
        self.queue
            .enqueue(
                JobKind::Search,
                &search_job_id(track.id),
                &TrackSnapshot::from(track),
                JobOptions::new(SEARCH_ATTEMPTS, backoff),
            )
            .await
    }

    /// Submit a track to the download stage.
    ///
    /// Returns the job id, or None when automatic download submission is
    /// disabled (`download_attempts = 0`) or nothing was written.
    pub async fn submit_download(&self, track: &Track) -> Result<Option<String>> {
        self.enqueue_download(track, chrono::Utc::now()).await
    }

    async fn enqueue_download(
        &self,
        track: &Track,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<String>> {
        let (attempts, backoff) = {
            let config = self.config.borrow();
            (
                config.queue.download_attempts(),
                config.queue.retry_backoff(),
            )
        };
        let Some(attempts) = attempts else {
            tracing::debug!(
                target: "pipeline",
                track_id = track.id,
                "Download submission disabled, leaving track queued"
            );
            return Ok(None);
        };

        let id = download_job_id(track.id, at);
        let written = self
            .queue
            .enqueue(
                JobKind::Download,
                &id,
                &TrackSnapshot::from(track),
                JobOptions::new(attempts, backoff),
            )
            .await?;
        if !written {
            tracing::debug!(
                target: "pipeline",
                track_id = track.id,
                job_id = %id,
                "Download job already pending, nothing submitted"
            );
            return Ok(None);
        }
        Ok(Some(id))
    }

    /// Reset a finished track to `New` and send it back through search.
    ///
    /// Fails with `InvalidTransition` while a stage still owns the track.
    pub async fn retry_track(&self, track_id: i64) -> Result<Track> {
        let mut track = db::require_track(&self.pool, track_id).await?;
        track.retry_finished()?;
        self.resubmit(track).await
    }

    /// Reset a track to `New` whatever its status and send it back through
    /// search. Used to recover tracks left behind by a previous process.
    pub async fn rescue_track(&self, track_id: i64) -> Result<Track> {
        let mut track = db::require_track(&self.pool, track_id).await?;
        track.retry();
        self.resubmit(track).await
    }

    async fn resubmit(&self, track: Track) -> Result<Track> {
        db::update_track_lifecycle(&self.pool, &track).await?;
        self.submit_search(&track).await?;
        self.notify(Event::PlaylistsUpdated);

        tracing::debug!(target: "pipeline", track_id = track.id, "Track resubmitted");
        Ok(track)
    }
}
