//! `cellar launch`: run a command in a container built from an image.

use std::net::Ipv4Addr;

use anyhow::Context;
use clap::Args;

use cellar_common::config::CellarConfig;
use cellar_common::types::{ContainerId, ImageName};
use cellar_core::network::IpRoute2;
use cellar_runtime::descriptor::ContainerDescriptor;
use cellar_runtime::orchestrator::{CloneLauncher, HostOrchestrator};

use crate::output::format_memory_limit;

/// Arguments for the `launch` command.
#[derive(Args, Debug)]
#[command(after_help = "\
The image is read from ./images/<IMAGE> and never modified; writes land in
./containers/<NAME>/upper and are kept after exit. NAME must be unique among
running containers: it names the hostname, the veth pair and the cgroup.")]
pub struct LaunchArgs {
    /// Container address; must lie in the bridge subnet (default
    /// 172.16.0.0/24, gateway .1). Enables a private network namespace.
    #[arg(short, long, value_name = "ADDR")]
    pub ip: Option<Ipv4Addr>,

    /// Memory ceiling in megabytes, swap disabled; 0 means unlimited.
    #[arg(short, long, value_name = "MB", default_value_t = 0)]
    pub mem: u64,

    /// Container name (up to 11 of `[A-Za-z0-9_-]`), also its hostname.
    #[arg(value_parser = ContainerId::parse)]
    pub name: ContainerId,

    /// Image directory name under `images/`.
    #[arg(value_parser = ImageName::parse)]
    pub image: ImageName,

    /// Command and arguments, passed verbatim.
    #[arg(
        value_name = "CMD",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

/// Executes the `launch` command and returns the container's exit status.
///
/// # Errors
///
/// Returns an error if the arguments are rejected or the host side of the
/// launch fails.
pub fn execute(args: LaunchArgs, config: &CellarConfig) -> anyhow::Result<i32> {
    let mut descriptor = ContainerDescriptor::new(config, args.name, args.image, args.command)?
        .with_memory_limit_mb(args.mem);
    if let Some(ip) = args.ip {
        descriptor = descriptor.with_network_address(ip, &config.network)?;
    }

    tracing::info!(
        container = %descriptor.id,
        image = %descriptor.image,
        address = ?descriptor.network_address,
        memory = %format_memory_limit(descriptor.memory_limit_bytes()?),
        "launching container"
    );

    let network = IpRoute2::default();
    let launcher = CloneLauncher::new(config, &network);
    let report = HostOrchestrator::new(config, &network, &launcher)
        .run(&descriptor)
        .with_context(|| format!("launching container {}", descriptor.id))?;
    Ok(report.code)
}
