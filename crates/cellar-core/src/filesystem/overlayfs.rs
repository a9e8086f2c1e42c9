//! `OverlayFS` management for the container root.
//!
//! Stacks the read-only image under a per-container writable layer, so
//! every write and delete lands in the upper directory and the image
//! stays untouched.

use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use nix::mount::{MsFlags, mount};

use cellar_common::error::{CellarError, Result};

use super::mount::mount_error;

/// Configuration for an `OverlayFS` mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayConfig {
    /// Read-only lower layer (the image).
    pub lower_dir: PathBuf,
    /// Writable upper layer directory.
    pub upper_dir: PathBuf,
    /// Work directory required by `OverlayFS`.
    pub work_dir: PathBuf,
    /// Final merged mount point.
    pub merged_dir: PathBuf,
}

impl OverlayConfig {
    /// Renders the `lowerdir=…,upperdir=…,workdir=…` mount data.
    ///
    /// # Errors
    ///
    /// Returns a mount error if a path contains `,` or `:`, which the
    /// overlay option parser would misread.
    pub fn mount_options(&self) -> Result<String> {
        for dir in [&self.lower_dir, &self.upper_dir, &self.work_dir] {
            let text = dir.to_string_lossy();
            if text.contains(',') || text.contains(':') {
                return Err(CellarError::Mount {
                    target: self.merged_dir.clone(),
                    message: format!("overlay layer path {text:?} contains ',' or ':'"),
                });
            }
        }
        Ok(format!(
            "lowerdir={},upperdir={},workdir={}",
            self.lower_dir.display(),
            self.upper_dir.display(),
            self.work_dir.display()
        ))
    }

    /// Creates the upper, work, and merged directories (mode `0700`).
    ///
    /// Existing directories are reused: the upper layer is the container's
    /// durable state across runs.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a directory cannot be created.
    pub fn create_dirs(&self) -> Result<()> {
        for dir in [&self.upper_dir, &self.work_dir, &self.merged_dir] {
            create_private_dir(dir)?;
        }
        Ok(())
    }
}

/// Mounts an `OverlayFS` with the given configuration.
///
/// Creates the upper, work, and merged directories if they do not exist,
/// then issues the `mount(2)` syscall with overlay-specific options. A
/// missing lower directory surfaces as the mount failure.
///
/// # Errors
///
/// Returns an error if directory creation fails or if the mount syscall fails.
pub fn mount_overlay(config: &OverlayConfig) -> Result<()> {
    config.create_dirs()?;
    let opts = config.mount_options()?;
    tracing::debug!(opts = %opts, "overlay options");

    mount(
        Some("overlay"),
        config.merged_dir.as_path(),
        Some("overlay"),
        MsFlags::MS_RELATIME,
        Some(opts.as_str()),
    )
    .map_err(|e| mount_error(&config.merged_dir, "overlay mount", e))?;

    tracing::info!(merged = %config.merged_dir.display(), "overlayfs mounted");
    Ok(())
}

fn create_private_dir(path: &Path) -> Result<()> {
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
        .map_err(|e| CellarError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    fn config(base: &Path) -> OverlayConfig {
        OverlayConfig {
            lower_dir: base.join("images/alpine"),
            upper_dir: base.join("containers/web1/upper"),
            work_dir: base.join("containers/web1/work"),
            merged_dir: base.join("containers/web1/merged"),
        }
    }

    #[test]
    fn mount_options_list_all_layers() {
        let cfg = config(Path::new("/srv"));
        assert_eq!(
            cfg.mount_options().unwrap(),
            "lowerdir=/srv/images/alpine,upperdir=/srv/containers/web1/upper,workdir=/srv/containers/web1/work"
        );
    }

    #[test]
    fn mount_options_reject_separator_characters() {
        let mut cfg = config(Path::new("/srv"));
        cfg.lower_dir = PathBuf::from("/srv/images/a,b");
        assert!(cfg.mount_options().is_err());
    }

    #[test]
    fn create_dirs_makes_private_layer_directories() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        cfg.create_dirs().unwrap();

        for d in [&cfg.upper_dir, &cfg.work_dir, &cfg.merged_dir] {
            assert!(d.is_dir());
            let mode = std::fs::metadata(d).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
        assert!(!cfg.lower_dir.exists());
    }

    #[test]
    fn create_dirs_keeps_existing_upper_content() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        cfg.create_dirs().unwrap();
        std::fs::write(cfg.upper_dir.join("state"), "kept").unwrap();

        cfg.create_dirs().unwrap();
        assert_eq!(
            std::fs::read_to_string(cfg.upper_dir.join("state")).unwrap(),
            "kept"
        );
    }
}
