//! Manual lifecycle operations.

use crate::ingest;
use crate::pipeline::Pipeline;
use crate::rescuer;

/// Reset a track and submit it for search again
pub async fn cmd_retry(pipeline: &Pipeline, track_id: i64) -> anyhow::Result<()> {
    let track = pipeline.retry_track(track_id).await?;
    println!("Retrying {} - {}", track.artist, track.name);
    Ok(())
}

/// Retry every failed track of a playlist
pub async fn cmd_retry_playlist(pipeline: &Pipeline, playlist_id: i64) -> anyhow::Result<()> {
    let retried = ingest::retry_playlist(pipeline, playlist_id).await?;
    println!("Retried {} failed track(s).", retried);
    Ok(())
}

/// Turn subscription synchronization on or off
pub async fn cmd_subscribe(
    pipeline: &Pipeline,
    playlist_id: i64,
    subscribed: bool,
) -> anyhow::Result<()> {
    ingest::set_subscribed(pipeline, playlist_id, subscribed).await?;
    println!(
        "Playlist {} {}.",
        playlist_id,
        if subscribed { "subscribed" } else { "unsubscribed" }
    );
    Ok(())
}

/// Delete a playlist and its tracks
pub async fn cmd_delete_playlist(pipeline: &Pipeline, playlist_id: i64) -> anyhow::Result<()> {
    ingest::delete_playlist(pipeline, playlist_id).await?;
    println!("Deleted playlist {}.", playlist_id);
    Ok(())
}

/// Flag or resubmit tracks stuck in a pipeline stage
pub async fn cmd_rescue(pipeline: &Pipeline, resubmit: bool) -> anyhow::Result<()> {
    let timeout = pipeline.config().rescuer.stuck_timeout();
    if resubmit {
        let rescued = rescuer::rescue_on_startup(pipeline, timeout).await?;
        println!("Resubmitted {} stuck track(s).", rescued);
    } else {
        let flagged = rescuer::flag_stuck_tracks(pipeline, timeout).await?;
        println!("Flagged {} stuck track(s).", flagged);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::tests::test_pipeline;
    use crate::db;
    use crate::model::TrackStatus;
    use crate::queue::JobKind;
    use crate::test_utils::{new_playlist, new_track, set_created_at};

    #[tokio::test]
    async fn test_retry_resets_and_submits() {
        let (pipeline, _dir) = test_pipeline().await;
        let pool = pipeline.pool();
        let mut track = db::insert_track(pool, new_track("A", "B")).await.unwrap();
        track.mark_searching().unwrap();
        track.mark_error("no match").unwrap();
        db::update_track_lifecycle(pool, &track).await.unwrap();

        cmd_retry(&pipeline, track.id).await.unwrap();

        let track = db::require_track(pool, track.id).await.unwrap();
        assert_eq!(track.status(), TrackStatus::New);
        assert_eq!(track.error(), None);
        assert_eq!(pipeline.queue().pending_count(JobKind::Search).await.unwrap(), 1);
        assert!(cmd_retry(&pipeline, 999).await.is_err());
    }

    #[tokio::test]
    async fn test_subscribe_and_delete() {
        let (pipeline, _dir) = test_pipeline().await;
        let pool = pipeline.pool();
        let playlist = db::insert_playlist(pool, new_playlist("https://cat/playlist/1"))
            .await
            .unwrap();

        cmd_subscribe(&pipeline, playlist.id, true).await.unwrap();
        assert!(db::require_playlist(pool, playlist.id).await.unwrap().subscribed);
        cmd_subscribe(&pipeline, playlist.id, false).await.unwrap();
        assert!(!db::require_playlist(pool, playlist.id).await.unwrap().subscribed);

        cmd_delete_playlist(&pipeline, playlist.id).await.unwrap();
        assert!(cmd_delete_playlist(&pipeline, playlist.id).await.is_err());
        assert!(cmd_subscribe(&pipeline, playlist.id, true).await.is_err());
    }

    #[tokio::test]
    async fn test_rescue_flags_stuck_tracks() {
        let (pipeline, _dir) = test_pipeline().await;
        let pool = pipeline.pool();
        let mut stuck = db::insert_track(pool, new_track("A", "Stuck")).await.unwrap();
        stuck.mark_searching().unwrap();
        db::update_track_lifecycle(pool, &stuck).await.unwrap();
        set_created_at(pool, stuck.id, db::now() - chrono::Duration::hours(2)).await;

        cmd_rescue(&pipeline, false).await.unwrap();

        let stuck = db::require_track(pool, stuck.id).await.unwrap();
        assert_eq!(stuck.status(), TrackStatus::Error);
        assert!(stuck.error().unwrap().starts_with("Stalled while searching"));
    }
}
