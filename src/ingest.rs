//! Playlist ingestion and manual playlist operations.

use std::collections::HashSet;

use crate::db;
use crate::error::{Error, Result};
use crate::events::Event;
use crate::external::CatalogResolver;
use crate::model::{NewPlaylist, Playlist, PlaylistKind, TrackStatus};
use crate::pipeline::Pipeline;
use crate::sync::{create_missing_tracks, sync_playlist};

/// Result of [`add_from_url`].
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    pub playlist: Playlist,
    /// Tracks created by this call
    pub created: usize,
    /// Whether the playlist already existed
    pub existing: bool,
}

/// Create a playlist from a catalog URL and send its tracks down the
/// pipeline.
///
/// A URL that was ingested before reuses the stored playlist and syncs it
/// instead of creating a duplicate.
pub async fn add_from_url(
    pipeline: &Pipeline,
    catalog: &dyn CatalogResolver,
    url: &str,
    subscribe: bool,
) -> Result<Ingested> {
    let pool = pipeline.pool();
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::validation("URL is empty"));
    }

    if let Some(mut playlist) = db::get_playlist_by_url(pool, url).await? {
        if subscribe && !playlist.subscribed {
            db::set_playlist_subscribed(pool, playlist.id, true).await?;
            playlist.subscribed = true;
        }
        let created = sync_playlist(pipeline, catalog, &playlist).await?;
        tracing::info!(target: "ingest", playlist_id = playlist.id, created, "Playlist already known, synced");
        return Ok(Ingested {
            playlist,
            created,
            existing: true,
        });
    }

    let listing = catalog.resolve(url).await?;
    let playlist = db::insert_playlist(
        pool,
        NewPlaylist {
            name: listing.name.clone(),
            kind: PlaylistKind::from_url(url).unwrap_or(listing.kind),
            origin_url: url.to_string(),
            cover_url: listing.cover_url.clone(),
            subscribed: subscribe,
        },
    )
    .await?;

    let mut known = HashSet::new();
    let created = create_missing_tracks(pipeline, &playlist, &listing.tracks, &mut known).await?;
    pipeline.notify(Event::PlaylistsUpdated);

    tracing::info!(
        target: "ingest",
        playlist_id = playlist.id,
        kind = %playlist.kind,
        created,
        "Added {}",
        playlist.name
    );
    Ok(Ingested {
        playlist,
        created,
        existing: false,
    })
}

/// Retry every failed track of a playlist. Returns how many were retried.
pub async fn retry_playlist(pipeline: &Pipeline, playlist_id: i64) -> Result<usize> {
    db::require_playlist(pipeline.pool(), playlist_id).await?;

    let failed: Vec<i64> = db::get_playlist_tracks(pipeline.pool(), playlist_id)
        .await?
        .into_iter()
        .filter(|t| t.status() == TrackStatus::Error)
        .map(|t| t.id)
        .collect();

    let mut retried = 0;
    for track_id in failed {
        match pipeline.retry_track(track_id).await {
            Ok(_) => retried += 1,
            Err(e) => tracing::warn!(target: "ingest", track_id, "Failed to retry track: {}", e),
        }
    }
    Ok(retried)
}

/// Turn subscription synchronization on or off for a playlist.
pub async fn set_subscribed(pipeline: &Pipeline, playlist_id: i64, subscribed: bool) -> Result<()> {
    db::set_playlist_subscribed(pipeline.pool(), playlist_id, subscribed).await?;
    pipeline.notify(Event::PlaylistsUpdated);
    Ok(())
}

/// Delete a playlist and its tracks. History is kept.
pub async fn delete_playlist(pipeline: &Pipeline, playlist_id: i64) -> Result<()> {
    if !db::delete_playlist(pipeline.pool(), playlist_id).await? {
        return Err(Error::playlist_not_found(playlist_id));
    }
    pipeline.notify(Event::PlaylistsUpdated);
    Ok(())
}
