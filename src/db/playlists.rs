//! Playlist rows.

use sqlx::sqlite::SqlitePool;

use super::{format_ts, now, parse_ts};
use crate::error::{Error, Result};
use crate::model::{NewPlaylist, Playlist};

/// Database row for the playlists table.
#[derive(Debug, sqlx::FromRow)]
struct PlaylistRow {
    id: i64,
    name: String,
    kind: String,
    origin_url: String,
    cover_url: Option<String>,
    subscribed: bool,
    last_error: Option<String>,
    created_at: String,
}

impl TryFrom<PlaylistRow> for Playlist {
    type Error = Error;

    fn try_from(row: PlaylistRow) -> Result<Self> {
        Ok(Playlist {
            id: row.id,
            name: row.name,
            kind: row.kind.parse()?,
            origin_url: row.origin_url,
            cover_url: row.cover_url,
            subscribed: row.subscribed,
            last_error: row.last_error,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

fn convert(rows: Vec<PlaylistRow>) -> Result<Vec<Playlist>> {
    rows.into_iter().map(Playlist::try_from).collect()
}

/// Insert a new playlist.
pub async fn insert_playlist(pool: &SqlitePool, data: NewPlaylist) -> Result<Playlist> {
    let created_at = now();

    let result = sqlx::query(
        r#"
        INSERT INTO playlists (name, kind, origin_url, cover_url, subscribed, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&data.name)
    .bind(data.kind.as_str())
    .bind(&data.origin_url)
    .bind(&data.cover_url)
    .bind(data.subscribed)
    .bind(format_ts(created_at))
    .execute(pool)
    .await?;

    Ok(Playlist {
        id: result.last_insert_rowid(),
        name: data.name,
        kind: data.kind,
        origin_url: data.origin_url,
        cover_url: data.cover_url,
        subscribed: data.subscribed,
        last_error: None,
        created_at,
    })
}

/// Get a playlist by ID.
pub async fn get_playlist(pool: &SqlitePool, id: i64) -> Result<Option<Playlist>> {
    let row: Option<PlaylistRow> = sqlx::query_as("SELECT * FROM playlists WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(Playlist::try_from).transpose()
}

/// Get a playlist by ID, failing with `NotFound` when it doesn't exist.
pub async fn require_playlist(pool: &SqlitePool, id: i64) -> Result<Playlist> {
    get_playlist(pool, id)
        .await?
        .ok_or_else(|| Error::playlist_not_found(id))
}

/// Get the playlist created from `origin_url`, if any.
pub async fn get_playlist_by_url(pool: &SqlitePool, origin_url: &str) -> Result<Option<Playlist>> {
    let row: Option<PlaylistRow> =
        sqlx::query_as("SELECT * FROM playlists WHERE origin_url = ?")
            .bind(origin_url)
            .fetch_optional(pool)
            .await?;

    row.map(Playlist::try_from).transpose()
}

/// All playlists, newest first.
pub async fn list_playlists(pool: &SqlitePool) -> Result<Vec<Playlist>> {
    let rows: Vec<PlaylistRow> =
        sqlx::query_as("SELECT * FROM playlists ORDER BY created_at DESC, id DESC")
            .fetch_all(pool)
            .await?;

    convert(rows)
}

/// Playlists the synchronizer should revisit, oldest first.
pub async fn list_subscribed_playlists(pool: &SqlitePool) -> Result<Vec<Playlist>> {
    let rows: Vec<PlaylistRow> =
        sqlx::query_as("SELECT * FROM playlists WHERE subscribed = 1 ORDER BY id")
            .fetch_all(pool)
            .await?;

    convert(rows)
}

/// Turn the subscription flag on or off.
pub async fn set_playlist_subscribed(pool: &SqlitePool, id: i64, subscribed: bool) -> Result<()> {
    let result = sqlx::query("UPDATE playlists SET subscribed = ? WHERE id = ?")
        .bind(subscribed)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::playlist_not_found(id));
    }
    Ok(())
}

/// Record (or clear, with `None`) the last synchronization failure.
pub async fn set_playlist_last_error(
    pool: &SqlitePool,
    id: i64,
    error: Option<&str>,
) -> Result<()> {
    sqlx::query("UPDATE playlists SET last_error = ? WHERE id = ?")
        .bind(error)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a playlist and, through the foreign key, all of its tracks.
///
/// Returns whether a row was removed.
pub async fn delete_playlist(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM playlists WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
