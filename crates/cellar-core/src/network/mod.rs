//! Network attachment for containers with a private network namespace.
//!
//! The host half creates a veth pair, brings the host end up on the
//! bridge, and pushes the peer into the child's namespace. The child half
//! renames and activates the peer, assigns the address, and installs the
//! default route. Each step goes through [`NetworkControl`], is attempted
//! exactly once, and aborts the sequence on failure.

pub mod iproute2;

use std::net::Ipv4Addr;

use cellar_common::constants::MAX_IFNAME_LEN;
use cellar_common::error::{CellarError, Result};
use cellar_common::types::ContainerId;

pub use iproute2::IpRoute2;

/// Typed link, address, and route operations.
///
/// Implementations report every failure as a [`CellarError::Network`]; the
/// sequencing helpers in this module never interpret the failure further.
pub trait NetworkControl {
    /// Creates a veth pair named `host` and `peer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot be created.
    fn create_link(&self, host: &str, peer: &str) -> Result<()>;

    /// Sets a link administratively up.
    ///
    /// # Errors
    ///
    /// Returns an error if the link state cannot be changed.
    fn set_link_up(&self, link: &str) -> Result<()>;

    /// Enslaves a link to a bridge.
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot be attached.
    fn attach_to_bridge(&self, link: &str, bridge: &str) -> Result<()>;

    /// Moves a link into the network namespace of `pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot be moved.
    fn move_to_namespace(&self, link: &str, pid: i32) -> Result<()>;

    /// Renames a link.
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot be renamed.
    fn rename_link(&self, link: &str, new_name: &str) -> Result<()>;

    /// Assigns `address/prefix_len` to a link.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be assigned.
    fn assign_address(&self, link: &str, address: Ipv4Addr, prefix_len: u8) -> Result<()>;

    /// Installs the default route via `gateway`.
    ///
    /// # Errors
    ///
    /// Returns an error if the route cannot be added.
    fn add_default_route(&self, gateway: Ipv4Addr) -> Result<()>;
}

/// Interface names of a container's veth pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VethPair {
    /// End that stays on the host, attached to the bridge.
    pub host: String,
    /// End moved into the container's namespace.
    pub peer: String,
}

impl VethPair {
    /// Derives `veth<id>` and `vp<id>` from the container id.
    ///
    /// # Errors
    ///
    /// Returns a usage error if a derived name exceeds the kernel limit.
    pub fn for_container(id: &ContainerId) -> Result<Self> {
        let pair = Self {
            host: format!("veth{id}"),
            peer: format!("vp{id}"),
        };
        if pair.host.len() > MAX_IFNAME_LEN {
            return Err(CellarError::Usage {
                message: format!("interface name {} is too long", pair.host),
            });
        }
        Ok(pair)
    }
}

/// Address settings applied inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLink {
    /// Name the peer is renamed to.
    pub ifname: String,
    /// Container address.
    pub address: Ipv4Addr,
    /// Subnet prefix length.
    pub prefix_len: u8,
    /// Default gateway.
    pub gateway: Ipv4Addr,
}

/// Host half, before the child exists: create the pair, bring the host
/// end up, attach it to `bridge`.
///
/// # Errors
///
/// Returns the first failing step's error; later steps are not attempted.
pub fn attach_host_side(net: &dyn NetworkControl, pair: &VethPair, bridge: &str) -> Result<()> {
    net.create_link(&pair.host, &pair.peer)?;
    net.set_link_up(&pair.host)?;
    net.attach_to_bridge(&pair.host, bridge)?;
    tracing::info!(host = %pair.host, peer = %pair.peer, bridge, "veth pair attached");
    Ok(())
}

/// Host half, after the child exists: move the peer into its namespace.
///
/// # Errors
///
/// Returns an error if the move fails.
pub fn move_peer(net: &dyn NetworkControl, pair: &VethPair, pid: i32) -> Result<()> {
    net.move_to_namespace(&pair.peer, pid)?;
    tracing::info!(peer = %pair.peer, pid, "peer moved into container namespace");
    Ok(())
}

/// Child half: rename and activate the peer, assign the address, and
/// install the default route.
///
/// # Errors
///
/// Returns the first failing step's error; later steps are not attempted.
pub fn configure_container_side(
    net: &dyn NetworkControl,
    pair: &VethPair,
    link: &ContainerLink,
) -> Result<()> {
    if pair.peer != link.ifname {
        net.rename_link(&pair.peer, &link.ifname)?;
    }
    net.set_link_up(&link.ifname)?;
    net.assign_address(&link.ifname, link.address, link.prefix_len)?;
    net.add_default_route(link.gateway)?;
    tracing::info!(
        ifname = %link.ifname,
        address = %link.address,
        prefix_len = link.prefix_len,
        gateway = %link.gateway,
        "container network configured"
    );
    Ok(())
}
