//! Filesystem management for container isolation.
//!
//! Provides `OverlayFS` layer assembly, `pivot_root` for switching the
//! process root onto the merged view, and mount utilities for the
//! pseudo-filesystems the container needs.

pub mod mount;
pub mod overlayfs;
pub mod pivot_root;

use std::path::{Path, PathBuf};

use cellar_common::error::Result;

pub use overlayfs::OverlayConfig;

/// Builds the union root and switches the calling process onto it.
///
/// The inherited `/proc` still describes the host's process tree, so it
/// is detached between the overlay mount and the switch. On return the
/// current directory is the new `/`, the identity files have been copied
/// in, and the old root is detached and removed.
///
/// # Errors
///
/// Returns a mount error if the overlay mount or any step of the root
/// switch fails. Nothing is rolled back.
pub fn assemble_root(overlay: &OverlayConfig, identity_files: &[PathBuf]) -> Result<()> {
    overlayfs::mount_overlay(overlay)?;
    mount::detach(Path::new("/proc"))?;
    pivot_root::switch_root(&overlay.merged_dir, identity_files)
}
