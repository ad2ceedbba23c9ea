//! Playlist, track and history listings.

use crate::db;
use crate::history;
use crate::model::{Track, TrackStatus, aggregate_status};
use crate::pipeline::Pipeline;

/// List playlists with their aggregate status
pub async fn cmd_playlists(pipeline: &Pipeline) -> anyhow::Result<()> {
    let pool = pipeline.pool();
    let playlists = db::list_playlists(pool).await?;
    if playlists.is_empty() {
        println!("No playlists.");
        return Ok(());
    }

    for playlist in playlists {
        let tracks = db::get_playlist_tracks(pool, playlist.id).await?;
        let completed = tracks
            .iter()
            .filter(|t| t.status() == TrackStatus::Completed)
            .count();
        let status = aggregate_status(tracks.iter().map(Track::status));

        println!(
            "{:>5}  {:<11} {:<8} {:>4}/{:<4} {}{}",
            playlist.id,
            status.as_str(),
            playlist.kind.as_str(),
            completed,
            tracks.len(),
            playlist.name,
            if playlist.subscribed { "  [subscribed]" } else { "" }
        );
        if let Some(err) = &playlist.last_error {
            println!("       last sync error: {}", err);
        }
    }
    Ok(())
}

/// Tracks to show for the given filters.
async fn select_tracks(
    pipeline: &Pipeline,
    playlist: Option<i64>,
    status: Option<TrackStatus>,
) -> anyhow::Result<Vec<Track>> {
    let pool = pipeline.pool();
    let tracks = match (playlist, status) {
        (Some(id), _) => db::get_playlist_tracks(pool, id).await?,
        (None, Some(status)) => db::get_tracks_by_status(pool, &[status]).await?,
        (None, None) => db::list_tracks(pool).await?,
    };
    Ok(tracks
        .into_iter()
        .filter(|t| status.is_none_or(|s| t.status() == s))
        .collect())
}

/// List tracks, optionally filtered by playlist and status
pub async fn cmd_tracks(
    pipeline: &Pipeline,
    playlist: Option<i64>,
    status: Option<&str>,
) -> anyhow::Result<()> {
    let status = status.map(str::parse::<TrackStatus>).transpose()?;
    let tracks = select_tracks(pipeline, playlist, status).await?;

    for track in &tracks {
        println!(
            "{:>6}  {:<11} {} - {} ({})",
            track.id,
            track.status().as_str(),
            track.artist,
            track.name,
            track.album
        );
        if let Some(err) = track.error() {
            println!("        error: {}", err);
        }
    }
    println!("{} track(s).", tracks.len());
    Ok(())
}

/// Show download history grouped by playlist
pub async fn cmd_history(pipeline: &Pipeline, limit: Option<u32>) -> anyhow::Result<()> {
    let limit = limit.unwrap_or(pipeline.config().history.page_limit);
    let summaries = history::history_view(pipeline.pool(), limit).await?;
    if summaries.is_empty() {
        println!("No downloads yet.");
        return Ok(());
    }

    for summary in summaries {
        println!(
            "{}  {:>4} track(s)  {}",
            summary.last_completed_at.format("%Y-%m-%d %H:%M"),
            summary.track_count,
            summary.playlist_name
        );
        if let Some(url) = &summary.playlist_url {
            println!("                    {}", url);
        }
    }
    Ok(())
}
