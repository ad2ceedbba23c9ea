//! Database module for playlist, track and history persistence.
//!
//! Uses SQLx with SQLite for lightweight, embedded database storage.
//! Every pipeline step reloads the row it works on, mutates it through the
//! track state machine and writes the lifecycle back, so the database is the
//! only state shared between workers and sweeps.
//!
//! The durable job queue lives in the same database (see `queue::store`).
//!
//! # Example
//!
//! ```ignore
//! use trackline::db::{init_db, db_url, get_track};
//!
//! let pool = init_db(&db_url(None)).await?;
//! let track = get_track(&pool, 42).await?;
//! ```

mod history;
mod playlists;
mod tracks;

pub use history::*;
pub use playlists::*;
pub use tracks::*;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::{Error, Result};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "trackline.db";

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist, establishes a connection
/// pool with up to 5 connections, and runs all pending migrations.
///
/// # Errors
///
/// Returns an error if:
/// - Database creation fails
/// - Connection cannot be established
/// - Migration fails
pub async fn init_db(db_url: &str) -> std::result::Result<SqlitePool, sqlx::Error> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Current time at the precision timestamps are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Format a timestamp for storage.
///
/// Fixed-width UTC with millisecond precision, so string order matches
/// time order in SQL comparisons.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp.
pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::validation(format!("invalid timestamp '{raw}': {e}")))
}

/// `?, ?, ?` for an `IN (...)` clause with `n` bound values.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
