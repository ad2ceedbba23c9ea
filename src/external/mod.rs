//! External capabilities consumed by the engine.
//!
//! # Architecture
//!
//! The engine never talks to a catalog API, a source search or a downloader
//! directly. It consumes them through the traits in [`traits`]:
//! - **Domain types** (`domain.rs`) - what the capabilities exchange with us
//! - **Traits** (`traits.rs`) - `CatalogResolver`, `SourceFinder`,
//!   `Retriever`, `PlaylistIndexWriter`, `TrackLayout`
//! - **Cache** (`cache.rs`) - expiring cache and a caching catalog wrapper
//! - **Layout** (`layout.rs`) - pattern-based default for on-disk naming
//!
//! Implementations are constructed by the embedding application and injected
//! as `Arc<dyn Trait>`; there are no process-wide client singletons.

pub mod cache;
pub mod domain;
pub mod layout;
pub mod traits;

pub use cache::{CachedCatalog, TtlCache};
pub use domain::{CatalogListing, CatalogTrack, ExternalError, identity_key};
pub use layout::{ConfiguredLayout, PatternLayout};
pub use traits::{CatalogResolver, PlaylistIndexWriter, Retriever, SourceFinder, TrackLayout};
