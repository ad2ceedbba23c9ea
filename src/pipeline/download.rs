//! Download stage: retrieve and tag the file, then record history.

use std::sync::Arc;

use async_trait::async_trait;

use super::Pipeline;
use crate::db;
use crate::error::{Error, Result, ResultExt};
use crate::events::Event;
use crate::external::{PlaylistIndexWriter, Retriever, TrackLayout};
use crate::model::{NewHistoryEntry, Playlist, PlaylistKind, Track, TrackStatus};
use crate::queue::{Job, JobHandler};

/// Handler for `download` jobs.
pub struct DownloadStage {
    pipeline: Pipeline,
    retriever: Arc<dyn Retriever>,
    index_writer: Arc<dyn PlaylistIndexWriter>,
    layout: Arc<dyn TrackLayout>,
}

impl DownloadStage {
    pub fn new(
        pipeline: Pipeline,
        retriever: Arc<dyn Retriever>,
        index_writer: Arc<dyn PlaylistIndexWriter>,
        layout: Arc<dyn TrackLayout>,
    ) -> Self {
        Self {
            pipeline,
            retriever,
            index_writer,
            layout,
        }
    }

    async fn run(&self, job: &Job) -> Result<()> {
        let pool = self.pipeline.pool();
        let mut track = db::require_track(pool, job.track_id()).await?;

        if track.name.trim().is_empty() || track.artist.trim().is_empty() {
            let message = "Track is missing its title or artist";
            tracing::warn!(target: "pipeline::download", track_id = track.id, "{}", message);
            if track.status().can_transition_to(TrackStatus::Error) {
                track.mark_error(message)?;
                db::update_track_lifecycle(pool, &track).await?;
            }
            return Err(Error::validation(message));
        }

        track.mark_downloading()?;
        db::update_track_lifecycle(pool, &track).await?;
        self.pipeline.notify(Event::PlaylistsUpdated);

        let playlist = match track.playlist_id {
            Some(id) => db::get_playlist(pool, id)
                .await
                .with_context(format!("loading playlist {id} for track {}", track.id))?,
            None => None,
        };
        let destination = self.layout.track_path(&track, playlist.as_ref());

        tracing::debug!(
            target: "pipeline::download",
            track_id = track.id,
            attempt = job.attempts_made,
            "Downloading to {}",
            destination.display()
        );

        if let Err(e) = self.retriever.fetch_and_tag(&track, &destination).await {
            tracing::warn!(
                target: "pipeline::download",
                track_id = track.id,
                attempt = job.attempts_made,
                "Download failed for {} - {}: {}",
                track.artist,
                track.name,
                e
            );
            track.mark_error(e.to_string())?;
            db::update_track_lifecycle(pool, &track).await?;
            return Err(e.into());
        }

        track.mark_completed()?;
        db::update_track_lifecycle(pool, &track).await?;
        tracing::info!(
            target: "pipeline::download",
            track_id = track.id,
            "Downloaded {} - {}",
            track.artist,
            track.name
        );

        if let Some(playlist) = playlist {
            self.after_completion(&track, &playlist).await;
        }
        Ok(())
    }

    /// History and index upkeep. Failures are logged; the file is already
    /// on disk, so they must not fail the job.
    async fn after_completion(&self, track: &Track, playlist: &Playlist) {
        let pool = self.pipeline.pool();

        if let Some(entry) = NewHistoryEntry::from_completed(track, playlist) {
            match db::insert_history(pool, &entry).await {
                Ok(_) => self.pipeline.notify(Event::DownloadHistoryUpdated),
                Err(e) => tracing::warn!(
                    target: "pipeline::download",
                    track_id = track.id,
                    "Failed to record history: {}",
                    e
                ),
            }
        }

        if playlist.kind != PlaylistKind::Playlist {
            return;
        }

        let completed: Vec<Track> = match db::get_playlist_tracks(pool, playlist.id).await {
            Ok(tracks) => tracks
                .into_iter()
                .filter(|t| t.status() == TrackStatus::Completed)
                .collect(),
            Err(e) => {
                tracing::warn!(target: "pipeline::download", playlist_id = playlist.id, "Failed to load playlist tracks: {}", e);
                return;
            }
        };
        if completed.is_empty() {
            return;
        }
        if let Err(e) = self.index_writer.write_index(playlist, &completed).await {
            tracing::warn!(
                target: "pipeline::download",
                playlist_id = playlist.id,
                "Failed to write playlist index: {}",
                e
            );
        }
    }
}

#[async_trait]
impl JobHandler for DownloadStage {
    async fn handle(&self, job: &Job) -> Result<()> {
        let result = self.run(job).await;
        self.pipeline.notify(Event::PlaylistsUpdated);
        result
    }
}
