//! Trackline command-line entry point.
//!
//! Inspects and repairs the track database shared with a running engine.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use trackline::cli;

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("trackline=info".parse()?))
        .init();

    cli::run_command(&args)
}
