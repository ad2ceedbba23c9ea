//! Pattern-based on-disk layout for downloaded tracks.
//!
//! Pattern variables: `{Playlist}`, `{Artist}`, `{Album}`, `{TrackNum}`,
//! `{Title}`. Example: `"{Artist}/{Album}/{TrackNum} - {Title}.mp3"`.

use std::path::PathBuf;

use tokio::sync::watch;

use super::traits::TrackLayout;
use crate::config::{Config, LibraryConfig};
use crate::model::{Playlist, Track};

/// Default layout pattern.
pub const DEFAULT_PATTERN: &str = "{Playlist}/{Artist} - {Title}.mp3";

/// Lays tracks out under a root directory following a pattern.
#[derive(Debug, Clone)]
pub struct PatternLayout {
    root: PathBuf,
    pattern: String,
}

impl PatternLayout {
    pub fn new(root: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            pattern: pattern.into(),
        }
    }

    /// Layout for the `[library]` config section.
    pub fn from_config(library: &LibraryConfig) -> Self {
        let pattern = if library.pattern.trim().is_empty() {
            DEFAULT_PATTERN
        } else {
            library.pattern.as_str()
        };
        Self::new(&library.download_dir, pattern)
    }
}

/// Layout that follows the live `[library]` settings, so a changed download
/// directory or pattern applies to the next download.
#[derive(Debug, Clone)]
pub struct ConfiguredLayout {
    config: watch::Receiver<Config>,
}

impl ConfiguredLayout {
    pub fn new(config: watch::Receiver<Config>) -> Self {
        Self { config }
    }
}

impl TrackLayout for ConfiguredLayout {
    fn track_path(&self, track: &Track, playlist: Option<&Playlist>) -> PathBuf {
        let layout = PatternLayout::from_config(&self.config.borrow().library);
        layout.track_path(track, playlist)
    }
}

impl TrackLayout for PatternLayout {
    fn track_path(&self, track: &Track, playlist: Option<&Playlist>) -> PathBuf {
        let track_num = track
            .playlist_index
            .or(track.track_number)
            .map(|n| format!("{:02}", n))
            .unwrap_or_else(|| "00".to_string());
        let playlist_name = playlist
            .map(|p| p.name.as_str())
            .unwrap_or("Singles");

        let relative = self
            .pattern
            .replace("{Playlist}", &sanitize_filename(playlist_name))
            .replace("{Artist}", &sanitize_filename(&track.artist))
            .replace("{Album}", &sanitize_filename(&track.album))
            .replace("{Title}", &sanitize_filename(&track.name))
            .replace("{TrackNum}", &track_num);

        self.root.join(relative)
    }
}

/// Replace characters that are invalid in file names on common platforms.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}
