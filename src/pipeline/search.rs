//! Search stage: resolve a downloadable source for a track.

use std::sync::Arc;

use async_trait::async_trait;

use super::Pipeline;
use crate::db;
use crate::error::Result;
use crate::events::Event;
use crate::external::SourceFinder;
use crate::queue::{Job, JobHandler};

/// Handler for `search` jobs.
pub struct SearchStage {
    pipeline: Pipeline,
    finder: Arc<dyn SourceFinder>,
}

impl SearchStage {
    pub fn new(pipeline: Pipeline, finder: Arc<dyn SourceFinder>) -> Self {
        Self { pipeline, finder }
    }
}

#[async_trait]
impl JobHandler for SearchStage {
    async fn handle(&self, job: &Job) -> Result<()> {
        let pool = self.pipeline.pool();
        let mut track = db::require_track(pool, job.track_id()).await?;

        track.mark_searching()?;
        db::update_track_lifecycle(pool, &track).await?;
        self.pipeline.notify(Event::PlaylistsUpdated);

        tracing::debug!(
            target: "pipeline::search",
            track_id = track.id,
            "Searching for {} - {}",
            track.artist,
            track.name
        );

        match self.finder.find_source(&track.artist, &track.name).await {
            Ok(source_url) => {
                track.mark_queued(source_url)?;
                db::update_track_lifecycle(pool, &track).await?;
                tracing::debug!(target: "pipeline::search", track_id = track.id, "Source found");
                if let Err(e) = self.pipeline.submit_download(&track).await {
                    tracing::warn!(
                        target: "pipeline::search",
                        track_id = track.id,
                        "Failed to submit download: {}",
                        e
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    target: "pipeline::search",
                    track_id = track.id,
                    "Search failed for {} - {}: {}",
                    track.artist,
                    track.name,
                    e
                );
                track.mark_error(e.to_string())?;
                db::update_track_lifecycle(pool, &track).await?;
            }
        }

        self.pipeline.notify(Event::PlaylistsUpdated);
        Ok(())
    }
}
