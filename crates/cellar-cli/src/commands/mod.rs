//! CLI command definitions and dispatch.

pub mod launch;
pub mod nsexec;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use cellar_common::config::CellarConfig;
use cellar_common::constants::{BIN_NAME, CONFIG_ENV};

/// cellar: run one command in an isolated container.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Log launch stages at debug level (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON file overriding the built-in host configuration.
    #[arg(long, global = true, env = CONFIG_ENV, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Launch a container from an image and wait for it to exit.
    Launch(launch::LaunchArgs),
    /// Run a host command in fresh namespaces, without an image.
    Nsexec(nsexec::NsexecArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the
/// command fails before the container exits.
pub fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = CellarConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let code = match cli.command {
        Command::Launch(args) => launch::execute(args, &config)?,
        Command::Nsexec(args) => nsexec::execute(args, &config)?,
    };
    Ok(exit_code(code))
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(status_byte(code))
}

/// Statuses outside `0..=255` cannot be passed through and become `1`.
fn status_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
