//! Trackline - track lifecycle and download orchestration.
//!
//! Playlists are resolved from a music catalog into tracks. Each track moves
//! through a search stage (find a downloadable source) and a download stage
//! (fetch it into the library) driven by a durable SQLite job queue. A
//! rescuer flags tracks that stall, subscribed playlists are re-synced
//! periodically, and completed downloads are recorded in a history that is
//! summarized per playlist.
//!
//! Catalog lookups, source search and retrieval are capabilities supplied by
//! the caller through the traits in [`external`]; [`engine::Engine`] wires
//! them together.

pub mod cli;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod events;
pub mod external;
pub mod history;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod queue;
pub mod rescuer;
pub mod sync;
#[cfg(test)]
pub mod test_utils;

pub use engine::{Capabilities, Engine};
pub use error::{Error, Result};
