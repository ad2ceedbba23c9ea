//! Track lifecycle state machine.
//!
//! A [`Track`] carries public descriptive fields (artist, title, album...)
//! and private lifecycle fields (status, error, resolved source, timestamps).
//! The lifecycle can only change through the named transitions:
//!
//! ```text
//! New         --mark_searching-->   Searching
//! Searching   --mark_queued-->      Queued
//! Searching   --mark_error-->       Error
//! Queued      --mark_downloading--> Downloading
//! Downloading --mark_completed-->   Completed
//! Downloading --mark_error-->       Error
//! any         --retry-->            New
//! ```
//!
//! Jobs are delivered at least once, so a stage may re-enter its own state
//! (`Searching -> Searching`, `Downloading -> Downloading`), and a download
//! job's backoff attempt starts from `Error`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Lifecycle state of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackStatus {
    /// Created, waiting for the search stage
    New,
    /// Source lookup in progress
    Searching,
    /// Source found, waiting for the download stage
    Queued,
    /// Retrieval and tagging in progress
    Downloading,
    /// File written and tagged
    Completed,
    /// Last stage failed; see the track's error text
    Error,
}

impl TrackStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [TrackStatus; 6] = [
        TrackStatus::New,
        TrackStatus::Searching,
        TrackStatus::Queued,
        TrackStatus::Downloading,
        TrackStatus::Completed,
        TrackStatus::Error,
    ];

    /// Statuses in which a pipeline stage owns the track.
    pub const ACTIVE: [TrackStatus; 3] = [
        TrackStatus::Searching,
        TrackStatus::Queued,
        TrackStatus::Downloading,
    ];

    /// Convert to string representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::New => "new",
            TrackStatus::Searching => "searching",
            TrackStatus::Queued => "queued",
            TrackStatus::Downloading => "downloading",
            TrackStatus::Completed => "completed",
            TrackStatus::Error => "error",
        }
    }

    /// Whether the track has left the pipeline, successfully or not.
    pub fn is_finished(&self) -> bool {
        matches!(self, TrackStatus::Completed | TrackStatus::Error)
    }

    /// Whether a pipeline stage currently owns the track.
    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// Whether `self -> to` is a sanctioned transition.
    ///
    /// `New` is reachable from every state through [`Track::retry`].
    pub fn can_transition_to(&self, to: TrackStatus) -> bool {
        use TrackStatus::*;
        match (self, to) {
            (_, New) => true,
            (New | Searching, Searching) => true,
            (Searching, Queued) => true,
            (Queued | Downloading | Error, Downloading) => true,
            (Downloading, Completed) => true,
            (Searching | Queued | Downloading | Error, Error) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "new" => TrackStatus::New,
            "searching" => TrackStatus::Searching,
            "queued" => TrackStatus::Queued,
            "downloading" => TrackStatus::Downloading,
            "completed" => TrackStatus::Completed,
            "error" => TrackStatus::Error,
            other => return Err(Error::validation(format!("unknown track status '{other}'"))),
        })
    }
}

/// Descriptive data for a track that has not been stored yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTrack {
    /// Owning playlist (None for standalone tracks)
    pub playlist_id: Option<i64>,
    pub artist: String,
    /// Track title
    pub name: String,
    pub album: String,
    pub album_year: Option<i32>,
    /// Track number on its album
    pub track_number: Option<i64>,
    /// Position inside the owning playlist
    pub playlist_index: Option<i64>,
    /// Catalog page for this track
    pub origin_url: Option<String>,
    /// Catalog preview clip; part of the sync identity key
    pub preview_url: Option<String>,
}

/// Lifecycle fields as stored by the persistence layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Lifecycle {
    pub status: TrackStatus,
    pub error: Option<String>,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A unit of work: one track moving through search and download.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Database ID
    pub id: i64,
    pub playlist_id: Option<i64>,
    pub artist: String,
    pub name: String,
    pub album: String,
    pub album_year: Option<i32>,
    pub track_number: Option<i64>,
    pub playlist_index: Option<i64>,
    pub origin_url: Option<String>,
    pub preview_url: Option<String>,
    source_url: Option<String>,
    status: TrackStatus,
    error: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Track {
    /// A freshly created track in the `New` state.
    pub fn new(id: i64, data: NewTrack, created_at: DateTime<Utc>) -> Self {
        Self::restore(
            id,
            data,
            Lifecycle {
                status: TrackStatus::New,
                error: None,
                source_url: None,
                created_at,
                completed_at: None,
            },
        )
    }

    /// Rebuild a track from stored fields.
    pub fn restore(id: i64, data: NewTrack, lifecycle: Lifecycle) -> Self {
        Self {
            id,
            playlist_id: data.playlist_id,
            artist: data.artist,
            name: data.name,
            album: data.album,
            album_year: data.album_year,
            track_number: data.track_number,
            playlist_index: data.playlist_index,
            origin_url: data.origin_url,
            preview_url: data.preview_url,
            source_url: lifecycle.source_url,
            status: lifecycle.status,
            error: lifecycle.error,
            created_at: lifecycle.created_at,
            completed_at: lifecycle.completed_at,
        }
    }

    /// Snapshot of the lifecycle fields for persisting.
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle {
            status: self.status,
            error: self.error.clone(),
            source_url: self.source_url.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }

    pub fn status(&self) -> TrackStatus {
        self.status
    }

    /// Failure detail; only present in `Error`.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Resolved download source (set once search succeeds).
    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Search stage picked the track up.
    pub fn mark_searching(&mut self) -> Result<()> {
        self.enter(TrackStatus::Searching)
    }

    /// Search stage found a source.
    pub fn mark_queued(&mut self, source_url: impl Into<String>) -> Result<()> {
        self.enter(TrackStatus::Queued)?;
        self.source_url = Some(source_url.into());
        Ok(())
    }

    /// Download stage picked the track up.
    pub fn mark_downloading(&mut self) -> Result<()> {
        self.enter(TrackStatus::Downloading)
    }

    /// Download stage wrote the file. Stamps the completion time.
    pub fn mark_completed(&mut self) -> Result<()> {
        self.enter(TrackStatus::Completed)?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// A stage failed. Completion time is left as it is.
    pub fn mark_error(&mut self, message: impl Into<String>) -> Result<()> {
        self.enter(TrackStatus::Error)?;
        self.error = Some(message.into());
        Ok(())
    }

    /// User-requested retry. Only finished tracks (`Completed` or `Error`)
    /// can be reset; a track a stage still owns is left alone.
    pub fn retry_finished(&mut self) -> Result<()> {
        if !self.status.is_finished() {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: TrackStatus::New,
            });
        }
        self.retry();
        Ok(())
    }

    /// Reset to `New` so the track re-enters the pipeline at the search
    /// stage. The resolved source is kept for reference but is looked up
    /// again before any download.
    pub fn retry(&mut self) {
        self.status = TrackStatus::New;
        self.error = None;
        self.completed_at = None;
    }

    fn enter(&mut self, to: TrackStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to,
            });
        }
        if self.status == TrackStatus::Error && to != TrackStatus::Error {
            self.error = None;
        }
        if to != TrackStatus::Completed {
            self.completed_at = None;
        }
        self.status = to;
        Ok(())
    }
}
