//! Host configuration model for the cellar launcher.
//!
//! Everything the launcher would otherwise hard-code (bridge name, subnet,
//! cgroup root, domain name) lives here so it can be injected by callers
//! and replaced in tests.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{CellarError, Result};

/// Root configuration for a launcher invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellarConfig {
    /// Base directory holding `images/` and `containers/`.
    pub work_dir: PathBuf,
    /// Host network settings for networked containers.
    pub network: NetworkConfig,
    /// Control-group settings for memory-limited containers.
    pub cgroup: CgroupConfig,
    /// Domain name set inside the container.
    pub domain_name: String,
    /// `PATH` installed before the container command runs.
    pub path_env: String,
    /// Files copied from the host root into the container root, relative to `/`.
    pub identity_files: Vec<PathBuf>,
    /// Stack size for the cloned child, in bytes.
    pub stack_size: usize,
}

impl Default for CellarConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            network: NetworkConfig::default(),
            cgroup: CgroupConfig::default(),
            domain_name: constants::DEFAULT_DOMAIN.into(),
            path_env: constants::DEFAULT_PATH_ENV.into(),
            identity_files: constants::DEFAULT_IDENTITY_FILES
                .iter()
                .map(PathBuf::from)
                .collect(),
            stack_size: constants::DEFAULT_STACK_SIZE,
        }
    }
}

impl CellarConfig {
    /// Loads the configuration, optionally overlaying a JSON file on the defaults.
    ///
    /// A relative `work_dir` is resolved against the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, the current
    /// directory cannot be determined, or a value fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| CellarError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                serde_json::from_str::<Self>(&raw)?
            }
            None => Self::default(),
        };

        if config.work_dir.is_relative() {
            let cwd = std::env::current_dir().map_err(|e| CellarError::Io {
                path: PathBuf::from("."),
                source: e,
            })?;
            config.work_dir = cwd.join(&config.work_dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks values that would otherwise only fail deep inside a launch.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        if self.domain_name.is_empty() {
            return Err(CellarError::Config {
                message: "domain_name must not be empty".into(),
            });
        }
        if self.stack_size < 64 * 1024 {
            return Err(CellarError::Config {
                message: format!("stack_size {} is below 64 KiB", self.stack_size),
            });
        }
        if self.identity_files.iter().any(|p| p.is_absolute()) {
            return Err(CellarError::Config {
                message: "identity_files must be relative to the root".into(),
            });
        }
        Ok(())
    }

    /// Directory holding the read-only image trees.
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.work_dir.join(constants::IMAGES_DIR)
    }

    /// Directory holding per-container state.
    #[must_use]
    pub fn containers_dir(&self) -> PathBuf {
        self.work_dir.join(constants::CONTAINERS_DIR)
    }
}

/// Host-side network settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Bridge the host end of every veth pair is attached to.
    pub bridge: String,
    /// Gateway address inside the container subnet, owned by the bridge.
    pub gateway: Ipv4Addr,
    /// Prefix length of the container subnet.
    pub prefix_len: u8,
    /// Name the peer link receives inside the container.
    pub container_ifname: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bridge: constants::DEFAULT_BRIDGE.into(),
            gateway: Ipv4Addr::from(constants::DEFAULT_GATEWAY),
            prefix_len: constants::DEFAULT_PREFIX_LEN,
            container_ifname: constants::DEFAULT_CONTAINER_IFNAME.into(),
        }
    }
}

impl NetworkConfig {
    fn validate(&self) -> Result<()> {
        if !(1..=30).contains(&self.prefix_len) {
            return Err(CellarError::Config {
                message: format!("prefix_len {} must be between 1 and 30", self.prefix_len),
            });
        }
        for name in [&self.bridge, &self.container_ifname] {
            if name.is_empty() || name.len() > constants::MAX_IFNAME_LEN {
                return Err(CellarError::Config {
                    message: format!("interface name {name:?} must be 1 to 15 bytes"),
                });
            }
        }
        Ok(())
    }

    /// Subnet mask derived from the prefix length.
    #[must_use]
    pub const fn netmask(&self) -> u32 {
        match self.prefix_len {
            0 => 0,
            n if n >= 32 => u32::MAX,
            n => u32::MAX << (32 - n),
        }
    }

    /// Checks that `address` is a usable host address in the gateway's subnet.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the address lies outside the subnet or is
    /// the gateway, network, or broadcast address.
    pub fn check_address(&self, address: Ipv4Addr) -> Result<()> {
        let mask = self.netmask();
        let addr = u32::from(address);
        let gateway = u32::from(self.gateway);
        let network = gateway & mask;

        if addr & mask != network {
            return Err(CellarError::Usage {
                message: format!(
                    "address {address} is outside {}/{}",
                    Ipv4Addr::from(network),
                    self.prefix_len
                ),
            });
        }
        if addr == gateway {
            return Err(CellarError::Usage {
                message: format!("address {address} is the gateway"),
            });
        }
        if addr == network || addr == network | !mask {
            return Err(CellarError::Usage {
                message: format!("address {address} is not a host address"),
            });
        }
        Ok(())
    }
}

/// How the per-invocation control group directory is named.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CgroupNaming {
    /// Named after the child's host pid.
    #[default]
    Pid,
    /// Named `cellar-<id>` after the container id.
    Container,
}

/// Control-group settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CgroupConfig {
    /// Mount point of the cgroup filesystem.
    pub root: PathBuf,
    /// Directory naming scheme.
    pub naming: CgroupNaming,
}

impl Default for CgroupConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(constants::CGROUP_ROOT),
            naming: CgroupNaming::default(),
        }
    }
}

impl CgroupConfig {
    /// Directory name for the group created for `pid` running container `id`.
    #[must_use]
    pub fn group_name(&self, id: &str, pid: i32) -> String {
        match self.naming {
            CgroupNaming::Pid => pid.to_string(),
            CgroupNaming::Container => format!("{}{id}", constants::CGROUP_PREFIX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        CellarConfig::default().validate().unwrap();
    }

    #[test]
    fn derived_directories_hang_off_work_dir() {
        let config = CellarConfig {
            work_dir: PathBuf::from("/srv/cellar"),
            ..CellarConfig::default()
        };
        assert_eq!(config.images_dir(), PathBuf::from("/srv/cellar/images"));
        assert_eq!(
            config.containers_dir(),
            PathBuf::from("/srv/cellar/containers")
        );
    }

    #[test]
    fn check_address_accepts_subnet_hosts() {
        let net = NetworkConfig::default();
        net.check_address(Ipv4Addr::new(172, 16, 0, 5)).unwrap();
        net.check_address(Ipv4Addr::new(172, 16, 0, 254)).unwrap();
    }

    #[test]
    fn check_address_rejects_gateway_and_foreign_addresses() {
        let net = NetworkConfig::default();
        assert!(net.check_address(Ipv4Addr::new(172, 16, 0, 1)).is_err());
        assert!(net.check_address(Ipv4Addr::new(172, 16, 1, 5)).is_err());
        assert!(net.check_address(Ipv4Addr::new(172, 16, 0, 0)).is_err());
        assert!(net.check_address(Ipv4Addr::new(172, 16, 0, 255)).is_err());
    }

    #[test]
    fn netmask_matches_prefix() {
        let net = NetworkConfig::default();
        assert_eq!(Ipv4Addr::from(net.netmask()), Ipv4Addr::new(255, 255, 255, 0));
    }

    #[test]
    fn cgroup_group_name_follows_naming() {
        let mut cg = CgroupConfig::default();
        assert_eq!(cg.group_name("web1", 4242), "4242");
        cg.naming = CgroupNaming::Container;
        assert_eq!(cg.group_name("web1", 4242), "cellar-web1");
    }

    #[test]
    fn load_overlays_json_on_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("cellar.json");
        std::fs::write(
            &file,
            r#"{ "work_dir": "/srv/cellar", "network": { "bridge": "br-test" }, "cgroup": { "naming": "container" } }"#,
        )
        .unwrap();

        let config = CellarConfig::load(Some(&file)).unwrap();
        assert_eq!(config.work_dir, PathBuf::from("/srv/cellar"));
        assert_eq!(config.network.bridge, "br-test");
        assert_eq!(config.network.prefix_len, constants::DEFAULT_PREFIX_LEN);
        assert_eq!(config.cgroup.naming, CgroupNaming::Container);
        assert_eq!(config.domain_name, constants::DEFAULT_DOMAIN);
    }

    #[test]
    fn load_resolves_relative_work_dir() {
        let config = CellarConfig::load(None).unwrap();
        assert!(config.work_dir.is_absolute());
    }

    #[test]
    fn load_rejects_oversized_bridge_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("cellar.json");
        std::fs::write(&file, r#"{ "network": { "bridge": "a-very-long-bridge-name" } }"#)
            .unwrap();
        assert!(CellarConfig::load(Some(&file)).is_err());
    }
}
