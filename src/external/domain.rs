//! Types exchanged with external capabilities.
//!
//! These types are OUR types - they don't change when a catalog or source
//! provider changes its API. Capability implementations convert their
//! responses into these shapes.

use crate::model::PlaylistKind;

/// One track as listed by the catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogTrack {
    /// Track title
    pub name: String,
    /// Primary artist name
    pub artist: String,
    /// Album title, when the catalog knows it
    pub album: Option<String>,
    pub album_year: Option<i32>,
    /// Track number on its album
    pub track_number: Option<i64>,
    /// Catalog page for the track
    pub url: Option<String>,
    /// Short preview clip
    pub preview_url: Option<String>,
}

impl CatalogTrack {
    /// Composite identity used to de-duplicate during subscription sync.
    ///
    /// The same artist/title pair can legitimately reappear with another
    /// preview, so the preview URL is part of the key.
    pub fn identity_key(&self) -> String {
        identity_key(&self.artist, &self.name, self.preview_url.as_deref())
    }
}

/// Build an `artist|name|preview` identity key.
///
/// A missing preview is spelled `undefined` so keys stay comparable with
/// rows written before preview URLs were tracked.
pub fn identity_key(artist: &str, name: &str, preview_url: Option<&str>) -> String {
    format!("{}|{}|{}", artist, name, preview_url.unwrap_or("undefined"))
}

/// A resolved catalog reference: the collection plus its tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogListing {
    /// Display name (playlist/album/artist/track title)
    pub name: String,
    pub cover_url: Option<String>,
    pub kind: PlaylistKind,
    pub tracks: Vec<CatalogTrack>,
}

/// Errors reported by external capabilities.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExternalError {
    #[error("No match found: {0}")]
    NotFound(String),

    #[error("Temporary failure: {0}")]
    Transient(String),

    #[error("Permanent failure: {0}")]
    Permanent(String),

    #[error("Rate limited - try again later")]
    RateLimited,
}

impl ExternalError {
    /// Whether trying again later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExternalError::Transient(_) | ExternalError::RateLimited)
    }
}
