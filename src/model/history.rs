//! Completion history records.

use chrono::{DateTime, Utc};

use super::{Playlist, Track};

/// Immutable snapshot written once per completed track of a playlist.
///
/// The playlist fields are denormalized so history survives renames and
/// deletion of the playlist itself.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Database ID
    pub id: i64,
    pub playlist_id: Option<i64>,
    pub playlist_name: String,
    pub playlist_url: Option<String>,
    pub track_id: i64,
    pub track_name: String,
    pub artist: String,
    pub album: String,
    pub track_url: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// A history record that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
    pub playlist_id: Option<i64>,
    pub playlist_name: String,
    pub playlist_url: Option<String>,
    pub track_id: i64,
    pub track_name: String,
    pub artist: String,
    pub album: String,
    pub track_url: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl NewHistoryEntry {
    /// Snapshot a completed track and its owning playlist.
    ///
    /// Returns None unless the track is completed.
    pub fn from_completed(track: &Track, playlist: &Playlist) -> Option<Self> {
        let completed_at = track.completed_at()?;
        Some(Self {
            playlist_id: Some(playlist.id),
            playlist_name: playlist.name.clone(),
            playlist_url: Some(playlist.origin_url.clone()),
            track_id: track.id,
            track_name: track.name.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            track_url: track.origin_url.clone(),
            completed_at,
        })
    }
}
