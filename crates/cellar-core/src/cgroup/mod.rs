//! Cgroup resource management.
//!
//! Creates one control group per container invocation, caps its memory,
//! moves the container's init process into it, and removes it after the
//! container exits. Both the unified (v2) hierarchy and the v1 `memory`
//! controller are supported; the layout under the configured root decides.

pub mod memory;

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use cellar_common::error::{CellarError, Result};

/// Cgroup hierarchy flavour found under the cgroup root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupVersion {
    /// Legacy per-controller hierarchies (`<root>/memory/...`).
    V1,
    /// Unified hierarchy (`<root>/cgroup.controllers` exists).
    V2,
}

impl CgroupVersion {
    /// Detects the hierarchy mounted at `root`.
    #[must_use]
    pub fn detect(root: &Path) -> Self {
        if root.join("cgroup.controllers").exists() {
            Self::V2
        } else {
            Self::V1
        }
    }

    /// Directory under which new groups are created.
    #[must_use]
    pub fn parent_dir(self, root: &Path) -> PathBuf {
        match self {
            Self::V2 => root.to_path_buf(),
            Self::V1 => root.join("memory"),
        }
    }
}

/// Handle to a cgroup for a specific container.
#[derive(Debug)]
pub struct CgroupManager {
    /// Path to this container's cgroup directory.
    path: PathBuf,
    version: CgroupVersion,
}

impl CgroupManager {
    /// Creates the group `name` under the hierarchy mounted at `root`.
    ///
    /// An existing directory is reused. The hierarchy's parent directory
    /// itself is never created: if it is missing the cgroup filesystem is
    /// not available and the launch must abort.
    ///
    /// # Errors
    ///
    /// Returns a resource-limit error if the group directory cannot be created.
    pub fn create(root: &Path, name: &str) -> Result<Self> {
        let version = CgroupVersion::detect(root);
        let path = version.parent_dir(root).join(name);
        match std::fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!(path = %path.display(), "reusing existing cgroup");
            }
            Err(e) => {
                return Err(CellarError::ResourceLimit {
                    path,
                    message: format!("cannot create cgroup: {e}"),
                });
            }
        }
        tracing::info!(path = %path.display(), ?version, "cgroup created");
        Ok(Self { path, version })
    }

    /// Path of the group directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hierarchy the group lives in.
    #[must_use]
    pub const fn version(&self) -> CgroupVersion {
        self.version
    }

    /// Caps memory at `bytes` and disables swap.
    ///
    /// # Errors
    ///
    /// Returns an error if either control file write fails.
    pub fn apply_memory_limit(&self, bytes: u64) -> Result<()> {
        memory::set_memory_max(&self.path, self.version, bytes)?;
        memory::disable_swap(&self.path, self.version, bytes)
    }

    /// Adds a process to this cgroup by writing its PID.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `cgroup.procs` fails.
    pub fn add_process(&self, pid: i32) -> Result<()> {
        append_control(&self.path, "cgroup.procs", &pid.to_string())?;
        tracing::debug!(pid, "added process to cgroup");
        Ok(())
    }

    /// Removes the cgroup directory.
    ///
    /// Only an empty group can be removed, so this must run after every
    /// member has exited.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be removed.
    pub fn destroy(&self) -> Result<()> {
        std::fs::remove_dir(&self.path).map_err(|e| CellarError::ResourceLimit {
            path: self.path.clone(),
            message: format!("cannot remove cgroup: {e}"),
        })?;
        tracing::info!(path = %self.path.display(), "cgroup destroyed");
        Ok(())
    }
}

/// Writes `value` to the control file `name`, truncating.
pub(crate) fn write_control(dir: &Path, name: &str, value: &str) -> Result<()> {
    let path = dir.join(name);
    std::fs::write(&path, format!("{value}\n")).map_err(|e| CellarError::ResourceLimit {
        path,
        message: format!("write of {value:?} rejected: {e}"),
    })
}

fn append_control(dir: &Path, name: &str, value: &str) -> Result<()> {
    let path = dir.join(name);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| CellarError::ResourceLimit {
            path: path.clone(),
            message: format!("cannot open: {e}"),
        })?;
    write_line(&mut file, value).map_err(|e| CellarError::ResourceLimit {
        path,
        message: format!("write of {value:?} rejected: {e}"),
    })
}

/// Writes `value` and its newline in one `write(2)`.
///
/// Control files parse each write on its own; a separate newline-only
/// write is rejected with `EINVAL`.
fn write_line(out: &mut impl Write, value: &str) -> std::io::Result<()> {
    out.write_all(format!("{value}\n").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap().trim().to_string()
    }

    fn v2_root() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("cgroup.controllers"), "cpu memory pids\n").unwrap();
        root
    }

    #[test]
    fn detects_unified_hierarchy() {
        let root = v2_root();
        assert_eq!(CgroupVersion::detect(root.path()), CgroupVersion::V2);
        let legacy = tempfile::tempdir().unwrap();
        assert_eq!(CgroupVersion::detect(legacy.path()), CgroupVersion::V1);
    }

    #[test]
    fn v2_limit_writes_exact_bytes_and_zero_swap() {
        let root = v2_root();
        let cg = CgroupManager::create(root.path(), "4242").unwrap();
        cg.apply_memory_limit(128 * 1024 * 1024).unwrap();
        cg.add_process(4242).unwrap();

        assert_eq!(cg.path(), root.path().join("4242"));
        assert_eq!(read(&cg.path().join("memory.max")), "134217728");
        assert_eq!(read(&cg.path().join("memory.swap.max")), "0");
        assert_eq!(read(&cg.path().join("cgroup.procs")), "4242");
    }

    #[test]
    fn v1_limit_pins_memsw_to_ceiling() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("memory")).unwrap();
        let cg = CgroupManager::create(root.path(), "4242").unwrap();
        cg.apply_memory_limit(64 * 1024 * 1024).unwrap();

        assert_eq!(cg.version(), CgroupVersion::V1);
        assert_eq!(cg.path(), root.path().join("memory/4242"));
        assert_eq!(read(&cg.path().join("memory.limit_in_bytes")), "67108864");
        assert_eq!(
            read(&cg.path().join("memory.memsw.limit_in_bytes")),
            "67108864"
        );
    }

    #[test]
    fn create_fails_when_hierarchy_is_missing() {
        let root = tempfile::tempdir().unwrap();
        let err = CgroupManager::create(root.path(), "4242").unwrap_err();
        assert!(matches!(err, CellarError::ResourceLimit { .. }));
        assert!(!root.path().join("memory").exists());
    }

    /// Records every `write(2)`-sized chunk it is handed.
    #[derive(Default)]
    struct ChunkRecorder {
        chunks: Vec<Vec<u8>>,
    }

    impl Write for ChunkRecorder {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.chunks.push(buf.to_vec());
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn control_line_is_a_single_write() {
        let mut out = ChunkRecorder::default();
        write_line(&mut out, "4242").unwrap();
        assert_eq!(out.chunks, vec![b"4242\n".to_vec()]);
    }

    #[test]
    #[ignore = "requires root and a mounted cgroup hierarchy"]
    fn host_cgroup_accepts_a_member() {
        let root = Path::new(cellar_common::constants::CGROUP_ROOT);
        let mut child = std::process::Command::new("sleep").arg("5").spawn().unwrap();
        let pid = i32::try_from(child.id()).unwrap();
        let cg = CgroupManager::create(root, &format!("cellar-test-{pid}")).unwrap();

        let added = cg.add_process(pid);
        let members = std::fs::read_to_string(cg.path().join("cgroup.procs")).unwrap();
        child.kill().unwrap();
        let _status = child.wait().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(100));
        cg.destroy().unwrap();

        added.unwrap();
        assert!(members.lines().any(|line| line == pid.to_string()));
    }

    #[test]
    fn destroy_removes_empty_group() {
        let root = v2_root();
        let cg = CgroupManager::create(root.path(), "cellar-web1").unwrap();
        cg.destroy().unwrap();
        assert!(!root.path().join("cellar-web1").exists());
    }

    #[test]
    fn destroy_reports_non_empty_group() {
        let root = v2_root();
        let cg = CgroupManager::create(root.path(), "busy").unwrap();
        cg.add_process(1).unwrap();
        assert!(cg.destroy().is_err());
    }
}
