//! [`NetworkControl`] backed by the iproute2 `ip` tool.
//!
//! The binary is looked up on `PATH` at every call, so inside the child
//! (after the root switch) the container image's own `ip` is used.

use std::ffi::OsStr;
use std::net::Ipv4Addr;
use std::process::Command;

use cellar_common::error::{CellarError, Result};

use super::NetworkControl;

/// Runs `ip` subcommands and maps a non-zero exit to an error.
#[derive(Debug, Clone)]
pub struct IpRoute2 {
    program: String,
}

impl Default for IpRoute2 {
    fn default() -> Self {
        Self {
            program: "ip".into(),
        }
    }
}

impl IpRoute2 {
    /// Uses `program` instead of `ip`.
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run<I, S>(&self, operation: &'static str, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args
            .into_iter()
            .map(|a| a.as_ref().to_os_string())
            .collect();
        let command_line = format!(
            "{} {}",
            self.program,
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let binary = which::which(&self.program).map_err(|e| CellarError::Network {
            operation,
            message: format!("{} not found: {e}", self.program),
        })?;

        tracing::debug!(command = %command_line, "running network command");
        let output = Command::new(binary)
            .args(&args)
            .output()
            .map_err(|e| CellarError::Network {
                operation,
                message: format!("`{command_line}` could not be started: {e}"),
            })?;

        if !output.status.success() {
            return Err(CellarError::Network {
                operation,
                message: format!(
                    "`{command_line}` exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

impl NetworkControl for IpRoute2 {
    fn create_link(&self, host: &str, peer: &str) -> Result<()> {
        self.run(
            "create_link",
            ["link", "add", host, "type", "veth", "peer", "name", peer],
        )
    }

    fn set_link_up(&self, link: &str) -> Result<()> {
        self.run("set_link_up", ["link", "set", link, "up"])
    }

    fn attach_to_bridge(&self, link: &str, bridge: &str) -> Result<()> {
        self.run("attach_to_bridge", ["link", "set", link, "master", bridge])
    }

    fn move_to_namespace(&self, link: &str, pid: i32) -> Result<()> {
        let pid = pid.to_string();
        self.run("move_to_namespace", ["link", "set", link, "netns", pid.as_str()])
    }

    fn rename_link(&self, link: &str, new_name: &str) -> Result<()> {
        self.run("rename_link", ["link", "set", link, "name", new_name])
    }

    fn assign_address(&self, link: &str, address: Ipv4Addr, prefix_len: u8) -> Result<()> {
        let cidr = format!("{address}/{prefix_len}");
        self.run("assign_address", ["addr", "add", cidr.as_str(), "dev", link])
    }

    fn add_default_route(&self, gateway: Ipv4Addr) -> Result<()> {
        let gateway = gateway.to_string();
        self.run(
            "add_default_route",
            ["route", "add", "default", "via", gateway.as_str()],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_a_network_error() {
        let ip = IpRoute2::with_program("cellar-no-such-ip-binary");
        let err = ip.set_link_up("eth0").unwrap_err();
        assert!(matches!(err, CellarError::Network { operation: "set_link_up", .. }));
    }

    #[test]
    fn non_zero_exit_is_reported_with_command_line() {
        let ip = IpRoute2::with_program("false");
        let err = ip.attach_to_bridge("vethweb1", "cellar0").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("attach_to_bridge"));
        assert!(text.contains("false link set vethweb1 master cellar0"));
    }

    #[test]
    fn zero_exit_is_success() {
        let ip = IpRoute2::with_program("true");
        ip.add_default_route(Ipv4Addr::new(172, 16, 0, 1)).unwrap();
    }
}
