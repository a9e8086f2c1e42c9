//! `cellar nsexec`: run a host command in fresh namespaces.

use anyhow::Context;
use clap::Args;

use cellar_common::config::CellarConfig;
use cellar_runtime::nsexec::NsExecRequest;

/// Arguments for the `nsexec` command.
#[derive(Args, Debug)]
pub struct NsexecArgs {
    /// Give the command its own network namespace (loopback only).
    #[arg(short, long)]
    pub net: bool,

    /// Give the command its own PID namespace; it runs as PID 1.
    #[arg(short, long)]
    pub pid: bool,

    /// Give the command its own UTS namespace with this hostname.
    #[arg(short, long, value_name = "HOSTNAME")]
    pub uts: Option<String>,

    /// Command and arguments, passed verbatim.
    #[arg(
        value_name = "CMD",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

/// Executes the `nsexec` command and returns the command's exit status.
///
/// # Errors
///
/// Returns an error if the arguments are rejected or the child cannot be
/// created or waited for.
pub fn execute(args: NsexecArgs, config: &CellarConfig) -> anyhow::Result<i32> {
    let request = NsExecRequest::new(args.command, args.net, args.pid, args.uts, config.stack_size)?;
    let report = request.run().context("running command in new namespaces")?;
    Ok(report.code)
}
