//! Per-container exclusive lock.
//!
//! Two invocations with the same id would share a writable layer, a
//! cgroup name, and veth names. Holding an advisory `flock(2)` on
//! `containers/<id>.lock` for the whole launch makes the second one fail
//! fast instead.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use cellar_common::error::{CellarError, Result};
use cellar_common::types::ContainerId;

/// Exclusive ownership of a container id, released on drop.
#[derive(Debug)]
pub struct IdLock {
    _lock: Flock<File>,
    path: PathBuf,
}

impl IdLock {
    /// Takes the lock for `id` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`CellarError::InUse`] if another process holds the lock,
    /// or an I/O error if the lock file cannot be opened.
    pub fn acquire(containers_dir: &Path, id: &ContainerId) -> Result<Self> {
        std::fs::create_dir_all(containers_dir).map_err(|e| CellarError::Io {
            path: containers_dir.to_path_buf(),
            source: e,
        })?;
        let path = containers_dir.join(format!("{id}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| CellarError::Io {
                path: path.clone(),
                source: e,
            })?;

        let lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((_, Errno::EWOULDBLOCK)) => {
                return Err(CellarError::InUse { id: id.to_string() });
            }
            Err((_, errno)) => {
                return Err(CellarError::Io {
                    path,
                    source: std::io::Error::from(errno),
                });
            }
        };
        tracing::debug!(path = %path.display(), "container id locked");
        Ok(Self { _lock: lock, path })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ContainerId {
        ContainerId::parse(s).unwrap()
    }

    #[test]
    fn second_acquire_reports_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let _held = IdLock::acquire(dir.path(), &id("web1")).unwrap();
        let err = IdLock::acquire(dir.path(), &id("web1")).unwrap_err();
        assert!(matches!(err, CellarError::InUse { id } if id == "web1"));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let first = IdLock::acquire(dir.path(), &id("web1")).unwrap();
        assert!(first.path().ends_with("web1.lock"));
        drop(first);
        let _again = IdLock::acquire(dir.path(), &id("web1")).unwrap();
    }

    #[test]
    fn distinct_ids_do_not_contend() {
        let dir = tempfile::tempdir().unwrap();
        let _a = IdLock::acquire(dir.path(), &id("a")).unwrap();
        let _b = IdLock::acquire(dir.path(), &id("b")).unwrap();
    }

    #[test]
    fn missing_containers_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("containers");
        let _lock = IdLock::acquire(&nested, &id("web1")).unwrap();
        assert!(nested.join("web1.lock").exists());
    }
}
