//! Subscription synchronization.
//!
//! Each pass fetches the current listing of every subscribed playlist and
//! creates only the tracks not seen before. Identity is the
//! `artist|name|preview` key, so a pass over an unchanged listing creates
//! nothing and two identical passes are idempotent.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::events::Event;
use crate::external::{CatalogResolver, CatalogTrack, identity_key};
use crate::model::{NewTrack, Playlist, PlaylistKind};
use crate::pipeline::Pipeline;

/// Album name used for tracks that come from track or artist origins.
pub const SINGLES: &str = "Singles";

/// Build the stored form of a catalog track for `playlist`.
///
/// `index` is the track's position in the fetched listing.
pub fn track_for_playlist(playlist: &Playlist, index: usize, track: &CatalogTrack) -> NewTrack {
    let origin = PlaylistKind::from_url(&playlist.origin_url).unwrap_or(playlist.kind);
    let listing_position = index as i64 + 1;

    let album = track
        .album
        .as_deref()
        .filter(|a| !a.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| match origin {
            PlaylistKind::Album | PlaylistKind::Playlist => playlist.name.clone(),
            PlaylistKind::Track | PlaylistKind::Artist => SINGLES.to_string(),
        });
    let playlist_index = match origin {
        PlaylistKind::Album => track.track_number.or(Some(listing_position)),
        _ => Some(listing_position),
    };

    NewTrack {
        playlist_id: Some(playlist.id),
        artist: track.artist.clone(),
        name: track.name.clone(),
        album,
        album_year: track.album_year,
        track_number: track.track_number,
        playlist_index,
        origin_url: track.url.clone(),
        preview_url: track.preview_url.clone(),
    }
}

/// Create and submit every track of `listing` whose key is not in `known`.
///
/// Keys are added to `known` as tracks are created, so duplicates inside
/// one listing are only created once. Returns the number of new tracks.
pub(crate) async fn create_missing_tracks(
    pipeline: &Pipeline,
    playlist: &Playlist,
    listing: &[CatalogTrack],
    known: &mut HashSet<String>,
) -> Result<usize> {
    let mut created = 0;

    for (index, remote) in listing.iter().enumerate() {
        if !known.insert(remote.identity_key()) {
            continue;
        }
        let track = db::insert_track(pipeline.pool(), track_for_playlist(playlist, index, remote)).await?;
        created += 1;
        if let Err(e) = pipeline.submit_search(&track).await {
            tracing::warn!(target: "sync", track_id = track.id, "Failed to submit new track: {}", e);
        }
    }

    Ok(created)
}

/// Bring one playlist up to date with its origin.
///
/// On a catalog failure the error is recorded on the playlist and returned.
/// Returns the number of tracks created.
pub async fn sync_playlist(
    pipeline: &Pipeline,
    catalog: &dyn CatalogResolver,
    playlist: &Playlist,
) -> Result<usize> {
    let pool = pipeline.pool();

    let listing = match catalog.fetch_tracks(&playlist.origin_url).await {
        Ok(listing) => listing,
        Err(e) => {
            tracing::warn!(
                target: "sync",
                playlist_id = playlist.id,
                "Failed to fetch {}: {}",
                playlist.origin_url,
                e
            );
            db::set_playlist_last_error(pool, playlist.id, Some(&e.to_string())).await?;
            return Err(e.into());
        }
    };
    if playlist.last_error.is_some() {
        db::set_playlist_last_error(pool, playlist.id, None).await?;
    }

    let mut known: HashSet<String> = db::get_playlist_tracks(pool, playlist.id)
        .await?
        .iter()
        .map(|t| identity_key(&t.artist, &t.name, t.preview_url.as_deref()))
        .collect();

    let created = create_missing_tracks(pipeline, playlist, &listing, &mut known).await?;
    if created > 0 {
        tracing::info!(target: "sync", playlist_id = playlist.id, created, "New tracks synced for {}", playlist.name);
        pipeline.notify(Event::PlaylistsUpdated);
    }
    Ok(created)
}

/// Outcome of a pass over all subscribed playlists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub playlists: usize,
    pub created: usize,
    pub failed: usize,
}

/// Sync every subscribed playlist. One playlist failing does not stop the
/// others.
pub async fn sync_subscriptions(
    pipeline: &Pipeline,
    catalog: &dyn CatalogResolver,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    for playlist in db::list_subscribed_playlists(pipeline.pool()).await? {
        report.playlists += 1;
        match sync_playlist(pipeline, catalog, &playlist).await {
            Ok(created) => report.created += created,
            Err(_) => report.failed += 1,
        }
    }

    tracing::debug!(
        target: "sync",
        playlists = report.playlists,
        created = report.created,
        failed = report.failed,
        "Subscription pass finished"
    );
    Ok(report)
}

/// Commands that can be sent to the synchronizer.
#[derive(Debug)]
pub enum SyncCommand {
    /// Run a pass now instead of waiting for the interval
    SyncNow,
    /// Stop the synchronizer
    Stop,
}

/// Periodic subscription synchronization.
pub struct Synchronizer {
    pipeline: Pipeline,
    catalog: Arc<dyn CatalogResolver>,
    command_tx: mpsc::Sender<SyncCommand>,
    command_rx: mpsc::Receiver<SyncCommand>,
}

impl Synchronizer {
    pub fn new(pipeline: Pipeline, catalog: Arc<dyn CatalogResolver>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(8);
        Self {
            pipeline,
            catalog,
            command_tx,
            command_rx,
        }
    }

    /// Get a sender for commands.
    pub fn command_sender(&self) -> mpsc::Sender<SyncCommand> {
        self.command_tx.clone()
    }

    /// Start the background task. The first pass runs after one interval.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut config: watch::Receiver<Config> = self.pipeline.config_receiver();
        let mut watching = true;

        tracing::info!(target: "sync", "Synchronizer started");

        loop {
            let interval = config.borrow_and_update().subscriptions.interval();

            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(SyncCommand::SyncNow) => self.pass().await,
                    Some(SyncCommand::Stop) | None => break,
                },
                changed = config.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                    }
                }
                _ = tokio::time::sleep(interval) => self.pass().await,
            }
        }

        tracing::info!(target: "sync", "Synchronizer stopped");
    }

    async fn pass(&self) {
        if let Err(e) = sync_subscriptions(&self.pipeline, self.catalog.as_ref()).await {
            tracing::warn!(target: "sync", "Subscription pass failed: {}", e);
        }
    }
}
