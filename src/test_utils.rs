//! Test utilities and fixtures for trackline tests.
//!
//! This module provides common test helpers, fixture factories, and
//! database utilities to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use trackline::test_utils::{temp_db, new_track};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (pool, _dir) = temp_db().await;
//!     let track = db::insert_track(&pool, new_track("Artist", "Song")).await.unwrap();
//!     // ... test logic
//! }
//! ```

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

use crate::model::{NewHistoryEntry, NewPlaylist, NewTrack, PlaylistKind};

/// Creates a temporary database for testing.
///
/// The database is created in a temporary directory that is automatically
/// cleaned up when the returned `TempDir` is dropped. Migrations are run
/// automatically.
///
/// # Returns
///
/// A tuple of (connection pool, temp directory handle).
/// Keep the TempDir alive for the duration of your test.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// A standalone track with the given artist and title.
///
/// Customize using struct update syntax:
///
/// ```ignore
/// let data = NewTrack { playlist_id: Some(1), ..new_track("A", "B") };
/// ```
pub fn new_track(artist: &str, name: &str) -> NewTrack {
    NewTrack {
        artist: artist.to_string(),
        name: name.to_string(),
        album: "Test Album".to_string(),
        ..Default::default()
    }
}

/// An unsubscribed playlist named "Test Playlist"; the kind follows the URL.
pub fn new_playlist(origin_url: &str) -> NewPlaylist {
    NewPlaylist {
        name: "Test Playlist".to_string(),
        kind: PlaylistKind::from_url(origin_url).unwrap_or(PlaylistKind::Playlist),
        origin_url: origin_url.to_string(),
        cover_url: None,
        subscribed: false,
    }
}

/// A history record completed `minute` minutes after a fixed base time.
pub fn history_entry(
    playlist_id: Option<i64>,
    playlist_name: &str,
    track_id: i64,
    minute: i64,
) -> NewHistoryEntry {
    let base: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    NewHistoryEntry {
        playlist_id,
        playlist_name: playlist_name.to_string(),
        playlist_url: None,
        track_id,
        track_name: format!("Track {track_id}"),
        artist: "Test Artist".to_string(),
        album: "Test Album".to_string(),
        track_url: None,
        completed_at: base + chrono::Duration::minutes(minute),
    }
}

/// Backdate a track, e.g. to make it look stuck.
pub async fn set_created_at(pool: &SqlitePool, track_id: i64, created_at: DateTime<Utc>) {
    sqlx::query("UPDATE tracks SET created_at = ? WHERE id = ?")
        .bind(crate::db::format_ts(created_at))
        .bind(track_id)
        .execute(pool)
        .await
        .expect("Failed to backdate track");
}

/// Poll an async condition until it holds, panicking after ten seconds.
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(10);
    while !check().await {
        assert!(Instant::now() < deadline, "Timed out waiting for condition");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (pool, _dir) = temp_db().await;

        // Should be able to query
        let tracks = db::list_tracks(&pool).await.unwrap();
        assert!(tracks.is_empty());
    }

    #[tokio::test]
    async fn test_set_created_at() {
        let (pool, _dir) = temp_db().await;
        let track = db::insert_track(&pool, new_track("A", "B")).await.unwrap();
        let past = db::now() - chrono::Duration::days(1);

        set_created_at(&pool, track.id, past).await;
        assert_eq!(db::require_track(&pool, track.id).await.unwrap().created_at(), past);
    }

    #[test]
    fn test_new_playlist_kind_follows_url() {
        assert_eq!(new_playlist("https://cat/album/1").kind, PlaylistKind::Album);
        assert_eq!(new_playlist("https://cat/whatever").kind, PlaylistKind::Playlist);
    }
}
