//! Playlists and their derived status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::TrackStatus;
use crate::error::{Error, Result};

/// What a playlist's origin URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaylistKind {
    Playlist,
    Album,
    Track,
    Artist,
}

impl PlaylistKind {
    /// Convert to string representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaylistKind::Playlist => "playlist",
            PlaylistKind::Album => "album",
            PlaylistKind::Track => "track",
            PlaylistKind::Artist => "artist",
        }
    }

    /// Detect the kind from a catalog URL or URI.
    ///
    /// Works for web URLs (`https://host/intl-de/album/ID`) and colon URIs
    /// (`catalog:album:ID`); the first recognised segment wins.
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        path.split(['/', ':'])
            .find_map(|segment| segment.parse::<PlaylistKind>().ok())
    }
}

impl fmt::Display for PlaylistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaylistKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "playlist" => PlaylistKind::Playlist,
            "album" => PlaylistKind::Album,
            "track" => PlaylistKind::Track,
            "artist" => PlaylistKind::Artist,
            other => return Err(Error::validation(format!("unknown playlist kind '{other}'"))),
        })
    }
}

/// A stored collection of tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    /// Database ID
    pub id: i64,
    /// Display name
    pub name: String,
    pub kind: PlaylistKind,
    /// Catalog URL the playlist was created from
    pub origin_url: String,
    pub cover_url: Option<String>,
    /// Whether the subscription synchronizer should revisit this playlist
    pub subscribed: bool,
    /// Last catalog failure seen by the synchronizer
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Data for a playlist that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPlaylist {
    pub name: String,
    pub kind: PlaylistKind,
    pub origin_url: String,
    pub cover_url: Option<String>,
    pub subscribed: bool,
}

/// Aggregate state of a playlist, derived from its tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistStatus {
    /// No tracks
    Empty,
    /// Tracks exist but none is being worked on or finished
    Pending,
    /// At least one track is owned by a pipeline stage
    InProgress,
    /// Every track completed
    Completed,
    /// Nothing in progress and at least one track failed
    Error,
}

impl PlaylistStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaylistStatus::Empty => "empty",
            PlaylistStatus::Pending => "pending",
            PlaylistStatus::InProgress => "in_progress",
            PlaylistStatus::Completed => "completed",
            PlaylistStatus::Error => "error",
        }
    }
}

impl fmt::Display for PlaylistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive a playlist's status from its tracks' statuses.
pub fn aggregate_status(statuses: impl IntoIterator<Item = TrackStatus>) -> PlaylistStatus {
    let mut total = 0usize;
    let mut completed = 0usize;
    let mut failed = false;
    let mut active = false;

    for status in statuses {
        total += 1;
        match status {
            TrackStatus::Completed => completed += 1,
            TrackStatus::Error => failed = true,
            s if s.is_active() => active = true,
            _ => {}
        }
    }

    if total == 0 {
        PlaylistStatus::Empty
    } else if active {
        PlaylistStatus::InProgress
    } else if completed == total {
        PlaylistStatus::Completed
    } else if failed {
        PlaylistStatus::Error
    } else {
        PlaylistStatus::Pending
    }
}
