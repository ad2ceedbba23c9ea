//! Core data models for the download engine.
//!
//! Defines the primary entities: [`Track`], [`Playlist`], and
//! [`HistoryEntry`].
//!
//! # Database Schema
//!
//! The models map to the following tables:
//! - `playlists` - Collections (playlist, album, track or artist origins)
//! - `tracks` - Units of work, optionally owned by a playlist
//! - `history` - Immutable completion snapshots

mod history;
mod playlist;
mod track;

pub use history::{HistoryEntry, NewHistoryEntry};
pub use playlist::{NewPlaylist, Playlist, PlaylistKind, PlaylistStatus, aggregate_status};
pub use track::{Lifecycle, NewTrack, Track, TrackStatus};
