//! Expiring response cache for capability wrappers.
//!
//! [`TtlCache`] is a thin, cloneable wrapper over `moka`'s async cache with a
//! single time-to-live. [`CachedCatalog`] uses it to avoid hitting the catalog
//! for the same URL repeatedly (ingestion followed by the first sync, CLI
//! refreshes, ...).

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache as MokaCache;

use super::domain::{CatalogListing, CatalogTrack, ExternalError};
use super::traits::CatalogResolver;

/// Default number of entries kept per cache.
pub const DEFAULT_CAPACITY: u64 = 1_000;

/// Generic key/value cache where every entry expires after the same TTL.
#[derive(Clone)]
pub struct TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: MokaCache<K, V>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            inner: MokaCache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: K, value: V) {
        self.inner.insert(key, value).await;
    }

    pub async fn invalidate(&self, key: &K) {
        self.inner.invalidate(key).await;
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// Errors are not cached.
    pub async fn get_or_try_insert<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.inner.get(&key).await {
            return Ok(hit);
        }
        let value = fetch().await?;
        self.inner.insert(key, value.clone()).await;
        Ok(value)
    }
}

/// Catalog wrapper caching `resolve` and `fetch_tracks` by URL.
pub struct CachedCatalog<C: CatalogResolver + ?Sized> {
    inner: Arc<C>,
    listings: TtlCache<String, CatalogListing>,
    tracks: TtlCache<String, Vec<CatalogTrack>>,
}

impl<C: CatalogResolver + ?Sized> CachedCatalog<C> {
    pub fn new(inner: Arc<C>, ttl: Duration) -> Self {
        Self {
            inner,
            listings: TtlCache::new(ttl),
            tracks: TtlCache::new(ttl),
        }
    }

    /// Drop cached responses for a URL.
    pub async fn invalidate(&self, url: &str) {
        let key = url.to_string();
        self.listings.invalidate(&key).await;
        self.tracks.invalidate(&key).await;
    }
}

#[async_trait]
impl<C: CatalogResolver + ?Sized + 'static> CatalogResolver for CachedCatalog<C> {
    async fn resolve(&self, url: &str) -> Result<CatalogListing, ExternalError> {
        let listing = self
            .listings
            .get_or_try_insert(url.to_string(), || self.inner.resolve(url))
            .await?;
        self.tracks
            .insert(url.to_string(), listing.tracks.clone())
            .await;
        Ok(listing)
    }

    async fn fetch_tracks(&self, url: &str) -> Result<Vec<CatalogTrack>, ExternalError> {
        self.tracks
            .get_or_try_insert(url.to_string(), || self.inner.fetch_tracks(url))
            .await
    }
}
