//! Command-line interface for trackline.
//!
//! This module provides CLI commands for inspecting playlists, tracks, jobs
//! and history, and for the manual lifecycle operations (retry, subscribe,
//! delete, rescue) without running the engine.

mod commands;

pub use commands::{Cli, Commands, run_command};
