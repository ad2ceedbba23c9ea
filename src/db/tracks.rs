//! Track rows.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;

use super::{format_ts, now, parse_ts, placeholders};
use crate::error::{Error, Result};
use crate::model::{Lifecycle, NewTrack, Track, TrackStatus};

/// Database row for the tracks table.
#[derive(Debug, sqlx::FromRow)]
struct TrackRow {
    id: i64,
    playlist_id: Option<i64>,
    artist: String,
    name: String,
    album: String,
    album_year: Option<i32>,
    track_number: Option<i64>,
    playlist_index: Option<i64>,
    origin_url: Option<String>,
    preview_url: Option<String>,
    source_url: Option<String>,
    status: String,
    error: Option<String>,
    created_at: String,
    completed_at: Option<String>,
}

impl TryFrom<TrackRow> for Track {
    type Error = Error;

    fn try_from(row: TrackRow) -> Result<Self> {
        let lifecycle = Lifecycle {
            status: row.status.parse()?,
            error: row.error,
            source_url: row.source_url,
            created_at: parse_ts(&row.created_at)?,
            completed_at: row.completed_at.as_deref().map(parse_ts).transpose()?,
        };
        let data = NewTrack {
            playlist_id: row.playlist_id,
            artist: row.artist,
            name: row.name,
            album: row.album,
            album_year: row.album_year,
            track_number: row.track_number,
            playlist_index: row.playlist_index,
            origin_url: row.origin_url,
            preview_url: row.preview_url,
        };
        Ok(Track::restore(row.id, data, lifecycle))
    }
}

fn convert(rows: Vec<TrackRow>) -> Result<Vec<Track>> {
    rows.into_iter().map(Track::try_from).collect()
}

/// Insert a new track in the `New` state.
pub async fn insert_track(pool: &SqlitePool, data: NewTrack) -> Result<Track> {
    let created_at = now();

    let result = sqlx::query(
        r#"
        INSERT INTO tracks (
            playlist_id, artist, name, album, album_year, track_number,
            playlist_index, origin_url, preview_url, status, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(data.playlist_id)
    .bind(&data.artist)
    .bind(&data.name)
    .bind(&data.album)
    .bind(data.album_year)
    .bind(data.track_number)
    .bind(data.playlist_index)
    .bind(&data.origin_url)
    .bind(&data.preview_url)
    .bind(TrackStatus::New.as_str())
    .bind(format_ts(created_at))
    .execute(pool)
    .await?;

    Ok(Track::new(result.last_insert_rowid(), data, created_at))
}

/// Get a track by ID.
pub async fn get_track(pool: &SqlitePool, id: i64) -> Result<Option<Track>> {
    let row: Option<TrackRow> = sqlx::query_as("SELECT * FROM tracks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(Track::try_from).transpose()
}

/// Get a track by ID, failing with `NotFound` when it doesn't exist.
pub async fn require_track(pool: &SqlitePool, id: i64) -> Result<Track> {
    get_track(pool, id)
        .await?
        .ok_or_else(|| Error::track_not_found(id))
}

/// All tracks whose status is in `statuses`, oldest first.
pub async fn get_tracks_by_status(
    pool: &SqlitePool,
    statuses: &[TrackStatus],
) -> Result<Vec<Track>> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT * FROM tracks WHERE status IN ({}) ORDER BY created_at, id",
        placeholders(statuses.len())
    );
    let mut query = sqlx::query_as::<_, TrackRow>(&sql);
    for status in statuses {
        query = query.bind(status.as_str());
    }

    convert(query.fetch_all(pool).await?)
}

/// Tracks in one of `statuses` that were created before `cutoff`.
pub async fn get_stuck_tracks(
    pool: &SqlitePool,
    statuses: &[TrackStatus],
    cutoff: DateTime<Utc>,
) -> Result<Vec<Track>> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT * FROM tracks WHERE status IN ({}) AND created_at < ? ORDER BY created_at, id",
        placeholders(statuses.len())
    );
    let mut query = sqlx::query_as::<_, TrackRow>(&sql);
    for status in statuses {
        query = query.bind(status.as_str());
    }
    query = query.bind(format_ts(cutoff));

    convert(query.fetch_all(pool).await?)
}

/// Tracks owned by a playlist, in playlist order.
pub async fn get_playlist_tracks(pool: &SqlitePool, playlist_id: i64) -> Result<Vec<Track>> {
    let rows: Vec<TrackRow> = sqlx::query_as(
        r#"
        SELECT * FROM tracks
        WHERE playlist_id = ?
        ORDER BY playlist_index IS NULL, playlist_index, id
        "#,
    )
    .bind(playlist_id)
    .fetch_all(pool)
    .await?;

    convert(rows)
}

/// All tracks, newest first.
pub async fn list_tracks(pool: &SqlitePool) -> Result<Vec<Track>> {
    let rows: Vec<TrackRow> = sqlx::query_as("SELECT * FROM tracks ORDER BY created_at DESC, id DESC")
        .fetch_all(pool)
        .await?;

    convert(rows)
}

/// Persist the lifecycle fields of a track.
///
/// Descriptive fields are never rewritten after insertion.
pub async fn update_track_lifecycle(pool: &SqlitePool, track: &Track) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE tracks
        SET status = ?, error = ?, source_url = ?, completed_at = ?
        WHERE id = ?
        "#,
    )
    .bind(track.status().as_str())
    .bind(track.error())
    .bind(track.source_url())
    .bind(track.completed_at().map(format_ts))
    .bind(track.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::track_not_found(track.id));
    }
    Ok(())
}

/// Delete a track. Returns whether a row was removed.
pub async fn delete_track(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tracks WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{new_track, set_created_at, temp_db};

    #[tokio::test]
    async fn test_insert_and_get() {
        let (pool, _dir) = temp_db().await;

        let inserted = insert_track(&pool, new_track("Artist", "Song")).await.unwrap();
        let loaded = get_track(&pool, inserted.id).await.unwrap().unwrap();

        assert_eq!(loaded, inserted);
        assert_eq!(loaded.status(), TrackStatus::New);
        assert!(get_track(&pool, 9999).await.unwrap().is_none());
        assert!(matches!(
            require_track(&pool, 9999).await,
            Err(Error::NotFound { entity: "Track", id: 9999 })
        ));
    }

    #[tokio::test]
    async fn test_lifecycle_persists() {
        let (pool, _dir) = temp_db().await;
        let mut track = insert_track(&pool, new_track("A", "B")).await.unwrap();

        track.mark_searching().unwrap();
        track.mark_queued("https://source/1").unwrap();
        track.mark_downloading().unwrap();
        track.mark_completed().unwrap();
        update_track_lifecycle(&pool, &track).await.unwrap();

        let loaded = require_track(&pool, track.id).await.unwrap();
        assert_eq!(loaded.status(), TrackStatus::Completed);
        assert_eq!(loaded.source_url(), Some("https://source/1"));
        assert!(loaded.completed_at().is_some());
    }

    #[tokio::test]
    async fn test_update_missing_track_is_not_found() {
        let (pool, _dir) = temp_db().await;
        let mut track = insert_track(&pool, new_track("A", "B")).await.unwrap();
        assert!(delete_track(&pool, track.id).await.unwrap());

        track.mark_searching().unwrap();
        assert!(matches!(
            update_track_lifecycle(&pool, &track).await,
            Err(Error::NotFound { .. })
        ));
        assert!(!delete_track(&pool, track.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_by_status_and_stuck() {
        let (pool, _dir) = temp_db().await;

        let mut old = insert_track(&pool, new_track("A", "old")).await.unwrap();
        old.mark_searching().unwrap();
        update_track_lifecycle(&pool, &old).await.unwrap();
        set_created_at(&pool, old.id, now() - chrono::Duration::minutes(30)).await;

        let mut fresh = insert_track(&pool, new_track("A", "fresh")).await.unwrap();
        fresh.mark_searching().unwrap();
        update_track_lifecycle(&pool, &fresh).await.unwrap();

        insert_track(&pool, new_track("A", "idle")).await.unwrap();

        let searching = get_tracks_by_status(&pool, &[TrackStatus::Searching])
            .await
            .unwrap();
        assert_eq!(searching.len(), 2);

        let cutoff = now() - chrono::Duration::minutes(10);
        let stuck = get_stuck_tracks(&pool, &TrackStatus::ACTIVE, cutoff)
            .await
            .unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].id, old.id);

        assert!(get_tracks_by_status(&pool, &[]).await.unwrap().is_empty());
    }
}
