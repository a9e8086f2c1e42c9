//! Unified error types for the cellar workspace.
//!
//! Every launch step reports failure through one of the typed variants
//! below. Callers decide whether a failure terminates the process; the
//! library itself never exits.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum CellarError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A command-line argument was rejected before any kernel state changed.
    #[error("usage: {message}")]
    Usage {
        /// Description of the rejected argument.
        message: String,
    },

    /// Process creation, namespace setup, or the parent/child handshake failed.
    #[error("namespace error: {message}")]
    Namespace {
        /// Description of the failed operation.
        message: String,
    },

    /// A mount, unmount, or root switch failed.
    #[error("mount error at {target}: {message}")]
    Mount {
        /// Mount point the operation targeted.
        target: PathBuf,
        /// Description of the failed operation.
        message: String,
    },

    /// A control-group operation failed.
    #[error("resource limit error at {path}: {message}")]
    ResourceLimit {
        /// Control-group path involved.
        path: PathBuf,
        /// Description of the failed operation.
        message: String,
    },

    /// A network configuration step failed.
    #[error("network error during {operation}: {message}")]
    Network {
        /// Name of the typed network operation.
        operation: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// Replacing the process image with the container command failed.
    #[error("failed to execute {command}: {message}")]
    Exec {
        /// Program that could not be executed.
        command: String,
        /// Description of the failure.
        message: String,
    },

    /// Another invocation currently owns the container id.
    #[error("container {id} is already in use by another invocation")]
    InUse {
        /// The contested container id.
        id: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl CellarError {
    /// Returns `true` for errors detected before any kernel state was touched.
    #[must_use]
    pub const fn is_usage(&self) -> bool {
        matches!(self, Self::Usage { .. } | Self::Config { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CellarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_and_config_errors_are_usage() {
        assert!(CellarError::Usage { message: "x".into() }.is_usage());
        assert!(CellarError::Config { message: "x".into() }.is_usage());
        assert!(
            !CellarError::Namespace {
                message: "clone".into()
            }
            .is_usage()
        );
    }

    #[test]
    fn mount_error_names_target() {
        let err = CellarError::Mount {
            target: PathBuf::from("/containers/web1/merged"),
            message: "ENOENT".into(),
        };
        assert_eq!(
            err.to_string(),
            "mount error at /containers/web1/merged: ENOENT"
        );
    }
}
