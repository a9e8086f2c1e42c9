//! Root filesystem switching via `pivot_root(2)`.
//!
//! More thorough than `chroot`: the old root is moved underneath the new
//! one and then detached, so the host tree is unreachable afterwards.

use std::io::ErrorKind;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use nix::mount::{MsFlags, mount};
use nix::unistd::chdir;

use cellar_common::constants::OLD_ROOT_DIR;
use cellar_common::error::{CellarError, Result};

use super::mount::{detach, mount_error};

/// Switches the process root to `new_root` and discards the old root.
///
/// Steps, in order: bind-mount `new_root` onto itself (`pivot_root`
/// needs a mount point), create `new_root/.pivot_root`, pivot, `chdir("/")`,
/// copy `identity_files` out of the old root, lazily detach the old root
/// and remove its directory.
///
/// # Errors
///
/// Returns a mount error if any step fails. There is no rollback.
pub fn switch_root(new_root: &Path, identity_files: &[PathBuf]) -> Result<()> {
    let new_root = new_root.canonicalize().map_err(|e| CellarError::Io {
        path: new_root.to_path_buf(),
        source: e,
    })?;
    let put_old = new_root.join(OLD_ROOT_DIR);
    tracing::debug!(new_root = %new_root.display(), put_old = %put_old.display(), "pivoting root");

    mount(
        Some(new_root.as_path()),
        new_root.as_path(),
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| mount_error(&new_root, "bind mount new root", e))?;

    match std::fs::DirBuilder::new().mode(0o700).create(&put_old) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
        Err(e) => {
            return Err(CellarError::Io {
                path: put_old,
                source: e,
            });
        }
    }

    nix::unistd::pivot_root(new_root.as_path(), put_old.as_path())
        .map_err(|e| mount_error(&new_root, "pivot_root", e))?;

    // Relative lookups must not resolve through the old root from here on.
    chdir("/").map_err(|e| mount_error(Path::new("/"), "chdir", e))?;

    let old_root = Path::new("/").join(OLD_ROOT_DIR);
    copy_identity_files(&old_root, Path::new("/"), identity_files)?;

    detach(&old_root)?;
    std::fs::remove_dir(&old_root).map_err(|e| CellarError::Io {
        path: old_root.clone(),
        source: e,
    })?;

    tracing::info!(root = %new_root.display(), "root switched");
    Ok(())
}

/// Copies each of `files` from `from_root` into `to_root`.
///
/// Paths in `files` are relative to both roots. A file missing under
/// `from_root` is skipped with a warning; any other failure is returned.
///
/// # Errors
///
/// Returns an I/O error if a destination directory cannot be created or
/// a copy fails.
pub fn copy_identity_files(from_root: &Path, to_root: &Path, files: &[PathBuf]) -> Result<()> {
    for file in files {
        let src = from_root.join(file);
        let dst = to_root.join(file);

        if !src.exists() {
            tracing::warn!(file = %src.display(), "identity file missing on host, skipped");
            continue;
        }
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CellarError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let bytes = std::fs::copy(&src, &dst).map_err(|e| CellarError::Io {
            path: dst.clone(),
            source: e,
        })?;
        tracing::debug!(file = %dst.display(), bytes, "identity file copied");
    }
    Ok(())
}
