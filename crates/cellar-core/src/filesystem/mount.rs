//! Mount utilities for container filesystem setup.
//!
//! Handles mount propagation and the `/proc` and `/dev` instances
//! inside the container's namespaces.

use std::path::Path;

use nix::mount::{MntFlags, MsFlags, mount, umount2};

use cellar_common::error::{CellarError, Result};

/// Recursively marks `/` as private in the current mount namespace.
///
/// Required before creating any mount in a fresh mount namespace: on
/// hosts where `/` is shared, mounts would otherwise propagate back.
///
/// # Errors
///
/// Returns a mount error if the `mount(2)` syscall fails.
pub fn make_root_private() -> Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| mount_error(Path::new("/"), "make private", e))?;
    tracing::debug!("root mount propagation set to private");
    Ok(())
}

/// Lazily detaches the mount at `target`.
///
/// `MNT_DETACH` lets in-flight references drain instead of failing with
/// `EBUSY`.
///
/// # Errors
///
/// Returns a mount error if `umount2(2)` fails.
pub fn detach(target: &Path) -> Result<()> {
    umount2(target, MntFlags::MNT_DETACH).map_err(|e| mount_error(target, "detach", e))?;
    tracing::debug!(target = %target.display(), "mount detached");
    Ok(())
}

/// Mounts a fresh `devtmpfs` at `target`, creating the directory if needed.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the mount fails.
pub fn mount_devtmpfs(target: &Path) -> Result<()> {
    ensure_dir(target)?;
    mount(
        Some("devtmpfs"),
        target,
        Some("devtmpfs"),
        MsFlags::MS_NOSUID | MsFlags::MS_RELATIME,
        None::<&str>,
    )
    .map_err(|e| mount_error(target, "mount devtmpfs", e))?;
    tracing::debug!(target = %target.display(), "devtmpfs mounted");
    Ok(())
}

/// Mounts a `proc` instance for the current PID namespace at `target`.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the mount fails.
pub fn mount_proc(target: &Path) -> Result<()> {
    ensure_dir(target)?;
    mount(
        Some("proc"),
        target,
        Some("proc"),
        MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC | MsFlags::MS_RELATIME,
        None::<&str>,
    )
    .map_err(|e| mount_error(target, "mount proc", e))?;
    tracing::debug!(target = %target.display(), "proc mounted");
    Ok(())
}

/// Mounts fresh `/dev` and `/proc` under `root`.
///
/// # Errors
///
/// Returns an error if either mount fails.
pub fn mount_dev_and_proc(root: &Path) -> Result<()> {
    mount_devtmpfs(&root.join("dev"))?;
    mount_proc(&root.join("proc"))
}

fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| CellarError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

pub(crate) fn mount_error(target: &Path, operation: &str, err: nix::Error) -> CellarError {
    CellarError::Mount {
        target: target.to_path_buf(),
        message: format!("{operation} failed: {err}"),
    }
}
