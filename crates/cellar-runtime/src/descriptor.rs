//! The container descriptor handed from host to child.
//!
//! Built once on the host from parsed arguments. The child receives its
//! own copy through `clone(2)`; neither side mutates it afterwards.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use cellar_common::config::{CellarConfig, NetworkConfig};
use cellar_common::constants::{BYTES_PER_MB, MERGED_DIR, UPPER_DIR, WORK_DIR};
use cellar_common::error::{CellarError, Result};
use cellar_common::types::{ContainerId, ImageName};
use cellar_core::filesystem::OverlayConfig;
use cellar_core::namespace::NamespaceConfig;
use cellar_core::network::{ContainerLink, VethPair};

/// Host paths derived from the container id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingPaths {
    /// `containers/<id>`.
    pub root: PathBuf,
    /// Writable layer, kept after exit as the container's durable state.
    pub upper: PathBuf,
    /// `OverlayFS` scratch directory.
    pub work: PathBuf,
    /// Merge point exposing the assembled root.
    pub merged: PathBuf,
}

impl WorkingPaths {
    /// Derives the per-container directories under `containers_dir`.
    #[must_use]
    pub fn derive(containers_dir: &Path, id: &ContainerId) -> Self {
        let root = containers_dir.join(id.as_str());
        Self {
            upper: root.join(UPPER_DIR),
            work: root.join(WORK_DIR),
            merged: root.join(MERGED_DIR),
            root,
        }
    }
}

/// Everything the child needs to assemble and start the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescriptor {
    /// Container id: hostname, cgroup and veth names derive from it.
    pub id: ContainerId,
    /// Image name under the images directory.
    pub image: ImageName,
    /// Absolute path of the read-only image tree.
    pub image_dir: PathBuf,
    /// Program and arguments executed as the container's init.
    pub command: Vec<String>,
    /// Per-container host directories.
    pub paths: WorkingPaths,
    /// Container address; its presence enables network isolation.
    pub network_address: Option<Ipv4Addr>,
    /// Memory ceiling in megabytes; `None` means no explicit cap.
    pub memory_limit_mb: Option<u64>,
}

impl ContainerDescriptor {
    /// Builds a descriptor with no network and no memory limit.
    ///
    /// # Errors
    ///
    /// Returns a usage error if `command` is empty or any element
    /// contains a NUL byte.
    pub fn new(
        config: &CellarConfig,
        id: ContainerId,
        image: ImageName,
        command: Vec<String>,
    ) -> Result<Self> {
        if command.is_empty() {
            return Err(CellarError::Usage {
                message: "a command to run inside the container is required".into(),
            });
        }
        if command.iter().any(|arg| arg.contains('\0')) {
            return Err(CellarError::Usage {
                message: "command arguments must not contain NUL bytes".into(),
            });
        }
        Ok(Self {
            image_dir: config.images_dir().join(image.as_str()),
            paths: WorkingPaths::derive(&config.containers_dir(), &id),
            id,
            image,
            command,
            network_address: None,
            memory_limit_mb: None,
        })
    }

    /// Attaches the container to the bridge network with `address`.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the address is not a usable host address
    /// of the configured subnet.
    pub fn with_network_address(mut self, address: Ipv4Addr, network: &NetworkConfig) -> Result<Self> {
        network.check_address(address)?;
        self.network_address = Some(address);
        Ok(self)
    }

    /// Caps memory at `mb` megabytes; `0` leaves memory uncapped.
    #[must_use]
    pub const fn with_memory_limit_mb(mut self, mb: u64) -> Self {
        self.memory_limit_mb = if mb == 0 { None } else { Some(mb) };
        self
    }

    /// Memory ceiling in bytes, if any.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the byte count overflows `u64`.
    pub fn memory_limit_bytes(&self) -> Result<Option<u64>> {
        self.memory_limit_mb
            .map(|mb| {
                mb.checked_mul(BYTES_PER_MB).ok_or_else(|| CellarError::Usage {
                    message: format!("memory limit of {mb} MB is too large"),
                })
            })
            .transpose()
    }

    /// Namespaces the child is cloned into.
    #[must_use]
    pub fn namespaces(&self) -> NamespaceConfig {
        NamespaceConfig::default().with_network(self.network_address.is_some())
    }

    /// Union mount layout for this container.
    #[must_use]
    pub fn overlay(&self) -> OverlayConfig {
        OverlayConfig {
            lower_dir: self.image_dir.clone(),
            upper_dir: self.paths.upper.clone(),
            work_dir: self.paths.work.clone(),
            merged_dir: self.paths.merged.clone(),
        }
    }

    /// The veth pair, when the container is networked.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the derived interface names are too long.
    pub fn veth_pair(&self) -> Result<Option<VethPair>> {
        self.network_address
            .map(|_| VethPair::for_container(&self.id))
            .transpose()
    }

    /// Link settings applied inside the container, when networked.
    #[must_use]
    pub fn container_link(&self, network: &NetworkConfig) -> Option<ContainerLink> {
        self.network_address.map(|address| ContainerLink {
            ifname: network.container_ifname.clone(),
            address,
            prefix_len: network.prefix_len,
            gateway: network.gateway,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CellarConfig {
        CellarConfig {
            work_dir: PathBuf::from("/srv/cellar"),
            ..CellarConfig::default()
        }
    }

    fn descriptor() -> ContainerDescriptor {
        ContainerDescriptor::new(
            &config(),
            ContainerId::parse("web1").unwrap(),
            ImageName::parse("alpine").unwrap(),
            vec!["/bin/echo".into(), "hi".into()],
        )
        .unwrap()
    }

    #[test]
    fn working_paths_derive_from_id() {
        let d = descriptor();
        assert_eq!(d.paths.root, PathBuf::from("/srv/cellar/containers/web1"));
        assert_eq!(d.paths.upper, PathBuf::from("/srv/cellar/containers/web1/upper"));
        assert_eq!(d.paths.work, PathBuf::from("/srv/cellar/containers/web1/work"));
        assert_eq!(d.paths.merged, PathBuf::from("/srv/cellar/containers/web1/merged"));
        assert_eq!(d.image_dir, PathBuf::from("/srv/cellar/images/alpine"));
    }

    #[test]
    fn descriptor_without_address_has_no_network_namespace() {
        let d = descriptor();
        assert!(!d.namespaces().network);
        assert!(d.veth_pair().unwrap().is_none());
        assert!(d.container_link(&NetworkConfig::default()).is_none());
    }

    #[test]
    fn descriptor_with_address_isolates_network() {
        let net = NetworkConfig::default();
        let d = descriptor()
            .with_network_address(Ipv4Addr::new(172, 16, 0, 5), &net)
            .unwrap();
        assert!(d.namespaces().network);
        assert_eq!(d.veth_pair().unwrap().unwrap().host, "vethweb1");
        let link = d.container_link(&net).unwrap();
        assert_eq!(link.address, Ipv4Addr::new(172, 16, 0, 5));
        assert_eq!(link.prefix_len, 24);
        assert_eq!(link.gateway, Ipv4Addr::new(172, 16, 0, 1));
    }

    #[test]
    fn address_outside_subnet_is_rejected() {
        let err = descriptor()
            .with_network_address(Ipv4Addr::new(10, 0, 0, 5), &NetworkConfig::default())
            .unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn zero_memory_means_no_limit() {
        let d = descriptor().with_memory_limit_mb(0);
        assert_eq!(d.memory_limit_mb, None);
        assert_eq!(d.memory_limit_bytes().unwrap(), None);
    }

    #[test]
    fn memory_limit_converts_to_bytes() {
        let d = descriptor().with_memory_limit_mb(128);
        assert_eq!(d.memory_limit_bytes().unwrap(), Some(134_217_728));
    }

    #[test]
    fn memory_limit_overflow_is_a_usage_error() {
        let d = descriptor().with_memory_limit_mb(u64::MAX);
        assert!(d.memory_limit_bytes().unwrap_err().is_usage());
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = ContainerDescriptor::new(
            &config(),
            ContainerId::parse("web1").unwrap(),
            ImageName::parse("alpine").unwrap(),
            Vec::new(),
        )
        .unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn overlay_uses_image_as_lower_layer() {
        let overlay = descriptor().overlay();
        assert_eq!(overlay.lower_dir, PathBuf::from("/srv/cellar/images/alpine"));
        assert_eq!(overlay.merged_dir, PathBuf::from("/srv/cellar/containers/web1/merged"));
    }
}
