//! # cellar
//!
//! Launches a single command in an isolated container: private mount,
//! PID and UTS namespaces, an `OverlayFS` root over a read-only image,
//! and optionally a memory ceiling and a bridged network link.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::panic))]

mod commands;
mod output;

use std::process::ExitCode;

use cellar_common::constants::APP_NAME;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!(app = APP_NAME, version = env!("CARGO_PKG_VERSION"), "starting");
    commands::execute(cli)
}

/// Logs go to stderr so the container's stdout stays clean.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
