//! Application-wide error types.
//!
//! This module provides a unified error hierarchy for the engine.
//! Library modules use specific error types via `thiserror`, while
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level engine error enum
//! - Capability errors ([`ExternalError`]) for failures reported by
//!   catalog, source-finder and retriever implementations
//! - [`Error::is_retryable`] decides whether the job queue reschedules a
//!   failed job or parks it as permanently failed
//!
//! # Example
//!
//! ```ignore
//! use trackline::error::{Error, Result};
//!
//! async fn load(pool: &SqlitePool, id: i64) -> Result<Track> {
//!     db::get_track(pool, id).await?.ok_or_else(|| Error::track_not_found(id))
//! }
//! ```

use crate::external::ExternalError;
use crate::model::TrackStatus;

/// Engine-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level engine error.
///
/// Aggregates errors from all subsystems for unified handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Job payload (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Referenced track or playlist does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Required track fields are missing
    #[error("Validation failed: {0}")]
    Validation(String),

    /// An external capability call failed
    #[error("External error: {0}")]
    External(#[from] ExternalError),

    /// A lifecycle transition that the state machine does not allow
    #[error("Cannot move track from {from} to {to}")]
    InvalidTransition {
        from: TrackStatus,
        to: TrackStatus,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a not-found error for a track.
    pub fn track_not_found(id: i64) -> Self {
        Self::NotFound { entity: "Track", id }
    }

    /// Create a not-found error for a playlist.
    pub fn playlist_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "Playlist",
            id,
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// Whether a job that failed with this error should be attempted again.
    ///
    /// Missing records, validation failures and rejected transitions will
    /// fail identically on every attempt, so they are parked immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Io(_) | Error::Database(_) => true,
            Error::External(e) => e.is_transient(),
            Error::WithContext { source, .. } => source.is_retryable(),
            Error::Serialization(_)
            | Error::NotFound { .. }
            | Error::Validation(_)
            | Error::InvalidTransition { .. }
            | Error::Config(_) => false,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}
