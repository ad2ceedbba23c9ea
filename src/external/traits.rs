//! Trait definitions for external capabilities.
//!
//! These traits enable dependency injection and mocking for tests.
//! Production code plugs in real catalog, source and retrieval clients,
//! while tests substitute the mock implementations below.
//!
//! # Example
//!
//! ```ignore
//! use trackline::external::SourceFinder;
//!
//! async fn resolve<F: SourceFinder + ?Sized>(finder: &F, track: &Track) -> Result<String> {
//!     Ok(finder.find_source(&track.artist, &track.name).await?)
//! }
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::domain::{CatalogListing, CatalogTrack, ExternalError};
use crate::model::{Playlist, Track};

/// Catalog lookups for playlists, albums, tracks and artists.
#[async_trait]
pub trait CatalogResolver: Send + Sync {
    /// Resolve a catalog URL into its name, cover, kind and tracks.
    async fn resolve(&self, url: &str) -> Result<CatalogListing, ExternalError>;

    /// Fetch only the current track listing of a catalog URL.
    async fn fetch_tracks(&self, url: &str) -> Result<Vec<CatalogTrack>, ExternalError>;
}

/// Finds a downloadable source for an artist/title pair.
#[async_trait]
pub trait SourceFinder: Send + Sync {
    /// Return the source URL, or [`ExternalError::NotFound`] when nothing matches.
    async fn find_source(&self, artist: &str, title: &str) -> Result<String, ExternalError>;
}

/// Retrieves audio from a resolved source and writes tags.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn fetch_and_tag(&self, track: &Track, destination: &Path) -> Result<(), ExternalError>;
}

/// Writes the index file (e.g. an M3U) of a playlist.
#[async_trait]
pub trait PlaylistIndexWriter: Send + Sync {
    async fn write_index(
        &self,
        playlist: &Playlist,
        completed: &[Track],
    ) -> Result<(), ExternalError>;
}

/// On-disk naming convention for downloaded tracks.
pub trait TrackLayout: Send + Sync {
    fn track_path(&self, track: &Track, playlist: Option<&Playlist>) -> PathBuf;
}

/// Mock capabilities for testing.
///
/// Return configurable responses and record how they were called.
#[cfg(test)]
pub mod mocks {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Mock catalog keyed by URL.
    #[derive(Default)]
    pub struct MockCatalog {
        listings: Mutex<HashMap<String, CatalogListing>>,
        /// Error to return (takes precedence over listings)
        pub error: Mutex<Option<ExternalError>>,
        pub fetch_calls: AtomicUsize,
    }

    impl MockCatalog {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register (or replace) the listing served for a URL.
        pub fn set_listing(&self, url: &str, listing: CatalogListing) {
            self.listings.lock().insert(url.to_string(), listing);
        }

        /// Replace only the tracks served for a URL.
        pub fn set_tracks(&self, url: &str, tracks: Vec<CatalogTrack>) {
            if let Some(listing) = self.listings.lock().get_mut(url) {
                listing.tracks = tracks;
            }
        }

        pub fn fail_with(&self, error: ExternalError) {
            *self.error.lock() = Some(error);
        }

        pub fn clear_error(&self) {
            *self.error.lock() = None;
        }
    }

    #[async_trait]
    impl CatalogResolver for MockCatalog {
        async fn resolve(&self, url: &str) -> Result<CatalogListing, ExternalError> {
            if let Some(ref err) = *self.error.lock() {
                return Err(err.clone());
            }
            self.listings
                .lock()
                .get(url)
                .cloned()
                .ok_or_else(|| ExternalError::NotFound(url.to_string()))
        }

        async fn fetch_tracks(&self, url: &str) -> Result<Vec<CatalogTrack>, ExternalError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            self.resolve(url).await.map(|listing| listing.tracks)
        }
    }

    /// Mock source finder returning a fixed result.
    pub struct MockSourceFinder {
        result: Result<String, ExternalError>,
        /// Simulated lookup latency
        pub delay: Duration,
        pub calls: AtomicUsize,
    }

    impl MockSourceFinder {
        /// Create a mock that always finds `url`.
        pub fn found(url: &str) -> Self {
            Self {
                result: Ok(url.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        /// Create a mock that never finds anything.
        pub fn not_found(reason: &str) -> Self {
            Self {
                result: Err(ExternalError::NotFound(reason.to_string())),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceFinder for MockSourceFinder {
        async fn find_source(&self, _artist: &str, _title: &str) -> Result<String, ExternalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.result.clone()
        }
    }

    /// Mock retriever that records destinations.
    #[derive(Default)]
    pub struct MockRetriever {
        /// Error to return instead of succeeding
        pub error: Option<ExternalError>,
        pub destinations: Mutex<Vec<PathBuf>>,
    }

    impl MockRetriever {
        pub fn ok() -> Self {
            Self::default()
        }

        pub fn failing(error: ExternalError) -> Self {
            Self {
                error: Some(error),
                ..Default::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.destinations.lock().len()
        }
    }

    #[async_trait]
    impl Retriever for MockRetriever {
        async fn fetch_and_tag(
            &self,
            _track: &Track,
            destination: &Path,
        ) -> Result<(), ExternalError> {
            self.destinations.lock().push(destination.to_path_buf());
            match self.error {
                Some(ref err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    /// Mock index writer recording (playlist id, completed track count).
    #[derive(Default)]
    pub struct MockIndexWriter {
        pub writes: Mutex<Vec<(i64, usize)>>,
    }

    #[async_trait]
    impl PlaylistIndexWriter for MockIndexWriter {
        async fn write_index(
            &self,
            playlist: &Playlist,
            completed: &[Track],
        ) -> Result<(), ExternalError> {
            self.writes.lock().push((playlist.id, completed.len()));
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::model::PlaylistKind;

        #[tokio::test]
        async fn test_mock_catalog_serves_registered_listing() {
            let catalog = MockCatalog::new();
            catalog.set_listing(
                "u",
                CatalogListing {
                    name: "Mix".into(),
                    cover_url: None,
                    kind: PlaylistKind::Playlist,
                    tracks: vec![CatalogTrack::default()],
                },
            );
            assert_eq!(catalog.fetch_tracks("u").await.unwrap().len(), 1);
            assert!(matches!(
                catalog.resolve("other").await,
                Err(ExternalError::NotFound(_))
            ));
        }

        #[tokio::test]
        async fn test_mock_source_finder_counts_calls() {
            let finder = MockSourceFinder::not_found("no match");
            assert!(finder.find_source("a", "b").await.is_err());
            assert_eq!(finder.call_count(), 1);
        }
    }
}
