//! System-wide constants and default values.

/// Application name used in log output.
pub const APP_NAME: &str = "cellar";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "cellar";

/// Environment variable naming an optional JSON configuration file.
pub const CONFIG_ENV: &str = "CELLAR_CONFIG";

/// Directory (under the working directory) holding read-only image trees.
pub const IMAGES_DIR: &str = "images";

/// Directory (under the working directory) holding per-container state.
pub const CONTAINERS_DIR: &str = "containers";

/// Writable overlay layer, relative to a container directory.
pub const UPPER_DIR: &str = "upper";

/// OverlayFS bookkeeping directory, relative to a container directory.
pub const WORK_DIR: &str = "work";

/// Merge point exposing the assembled root, relative to a container directory.
pub const MERGED_DIR: &str = "merged";

/// Name of the directory receiving the old root during `pivot_root(2)`.
pub const OLD_ROOT_DIR: &str = ".pivot_root";

/// Maximum container id length.
///
/// `veth` plus the id must fit the kernel's 15-byte interface name limit.
pub const MAX_ID_LEN: usize = 11;

/// Maximum image name length.
pub const MAX_IMAGE_LEN: usize = 127;

/// Linux `IFNAMSIZ` minus the trailing NUL.
pub const MAX_IFNAME_LEN: usize = 15;

/// Default host bridge the container links are attached to.
pub const DEFAULT_BRIDGE: &str = "cellar0";

/// Default gateway address, owned by the bridge.
pub const DEFAULT_GATEWAY: [u8; 4] = [172, 16, 0, 1];

/// Default prefix length of the container subnet.
pub const DEFAULT_PREFIX_LEN: u8 = 24;

/// Name the peer link receives inside the container.
pub const DEFAULT_CONTAINER_IFNAME: &str = "eth0";

/// Domain name set inside every container.
pub const DEFAULT_DOMAIN: &str = "cellar";

/// `PATH` value installed before the container command runs.
pub const DEFAULT_PATH_ENV: &str = "/bin:/sbin:/usr/bin:/usr/local/sbin:/usr/local/bin";

/// Host files copied into the new root so name resolution keeps working.
pub const DEFAULT_IDENTITY_FILES: [&str; 2] = ["etc/resolv.conf", "etc/nsswitch.conf"];

/// Cgroup filesystem mount point.
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Prefix for container-scoped cgroup directory names.
pub const CGROUP_PREFIX: &str = "cellar-";

/// Size of the stack allocated for the cloned child.
pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

/// Bytes per megabyte as used for memory limits.
pub const BYTES_PER_MB: u64 = 1024 * 1024;
