//! Completion history rows. Insert-only.

use sqlx::sqlite::SqlitePool;

use super::{format_ts, parse_ts};
use crate::error::{Error, Result};
use crate::model::{HistoryEntry, NewHistoryEntry};

/// Database row for the history table.
#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    playlist_id: Option<i64>,
    playlist_name: String,
    playlist_url: Option<String>,
    track_id: i64,
    track_name: String,
    artist: String,
    album: String,
    track_url: Option<String>,
    completed_at: String,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = Error;

    fn try_from(row: HistoryRow) -> Result<Self> {
        Ok(HistoryEntry {
            id: row.id,
            playlist_id: row.playlist_id,
            playlist_name: row.playlist_name,
            playlist_url: row.playlist_url,
            track_id: row.track_id,
            track_name: row.track_name,
            artist: row.artist,
            album: row.album,
            track_url: row.track_url,
            completed_at: parse_ts(&row.completed_at)?,
        })
    }
}

/// Record a completed track.
pub async fn insert_history(pool: &SqlitePool, entry: &NewHistoryEntry) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO history (
            playlist_id, playlist_name, playlist_url, track_id,
            track_name, artist, album, track_url, completed_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.playlist_id)
    .bind(&entry.playlist_name)
    .bind(&entry.playlist_url)
    .bind(entry.track_id)
    .bind(&entry.track_name)
    .bind(&entry.artist)
    .bind(&entry.album)
    .bind(&entry.track_url)
    .bind(format_ts(entry.completed_at))
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// The `limit` most recent entries, newest first.
pub async fn recent_history(pool: &SqlitePool, limit: u32) -> Result<Vec<HistoryEntry>> {
    let rows: Vec<HistoryRow> =
        sqlx::query_as("SELECT * FROM history ORDER BY completed_at DESC, id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(pool)
            .await?;

    rows.into_iter().map(HistoryEntry::try_from).collect()
}
