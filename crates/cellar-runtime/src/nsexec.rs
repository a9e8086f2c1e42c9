//! Run a host command in fresh namespaces without an image.
//!
//! A lightweight companion to the full launch: the command keeps the
//! host's root filesystem but sees its own mount table, a `/proc` that
//! matches its PID namespace, and optionally its own hostname and network
//! stack. No overlay, cgroup, or link setup is done.

use std::convert::Infallible;
use std::path::Path;

use nix::unistd::Pid;

use cellar_common::error::{CellarError, Result};
use cellar_core::filesystem::mount;
use cellar_core::namespace::{self, NamespaceConfig, uts};
use cellar_core::sync::Barrier;

use crate::bootstrap;
use crate::orchestrator::ExitReport;

/// What to isolate and what to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsExecRequest {
    /// Namespaces the command runs in; always includes a mount namespace.
    pub namespaces: NamespaceConfig,
    /// Hostname inside a fresh UTS namespace, if one is requested.
    pub hostname: Option<String>,
    /// Program and arguments.
    pub command: Vec<String>,
    /// Stack size for the cloned child, in bytes.
    pub stack_size: usize,
}

impl NsExecRequest {
    /// Builds a request. A UTS namespace is created only when a hostname
    /// is given.
    ///
    /// # Errors
    ///
    /// Returns a usage error if `command` is empty or `hostname` is empty.
    pub fn new(
        command: Vec<String>,
        network: bool,
        pid: bool,
        hostname: Option<String>,
        stack_size: usize,
    ) -> Result<Self> {
        if command.is_empty() {
            return Err(CellarError::Usage {
                message: "a command to run is required".into(),
            });
        }
        if hostname.as_deref() == Some("") {
            return Err(CellarError::Usage {
                message: "hostname must not be empty".into(),
            });
        }
        let namespaces = NamespaceConfig {
            pid,
            uts: hostname.is_some(),
            ..NamespaceConfig::mount_only().with_network(network)
        };
        Ok(Self {
            namespaces,
            hostname,
            command,
            stack_size,
        })
    }

    /// Runs the command and waits for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the child cannot be created or waited for.
    /// Failures inside the child surface as its exit status.
    pub fn run(&self) -> Result<ExitReport> {
        let barrier = Barrier::new()?;
        let pid: Pid = namespace::spawn(&self.namespaces, self.stack_size, || {
            match self.child_main(&barrier) {
                Ok(never) => match never {},
                Err(e) => {
                    tracing::error!(error = %e, "nsexec child failed");
                    bootstrap::exit_status(&e)
                }
            }
        })?;
        barrier.release();
        let code = namespace::wait_for_exit(pid)?;
        tracing::info!(pid = pid.as_raw(), code, "nsexec command exited");
        Ok(ExitReport { pid, code })
    }

    fn child_main(&self, barrier: &Barrier) -> Result<Infallible> {
        barrier.wait_in_child()?;
        mount::make_root_private()?;
        let proc_dir = Path::new("/proc");
        mount::detach(proc_dir)?;
        mount::mount_proc(proc_dir)?;
        if let Some(hostname) = &self.hostname {
            uts::set_hostname(hostname)?;
        }
        bootstrap::exec_command(&self.command)
    }
}

#[cfg(test)]
mod tests {
    use cellar_common::constants::DEFAULT_STACK_SIZE;

    use super::*;

    fn cmd() -> Vec<String> {
        vec!["/bin/sh".into()]
    }

    #[test]
    fn defaults_to_mount_namespace_only() {
        let req = NsExecRequest::new(cmd(), false, false, None, DEFAULT_STACK_SIZE).unwrap();
        assert_eq!(req.namespaces, NamespaceConfig::mount_only());
    }

    #[test]
    fn hostname_implies_uts_namespace() {
        let req = NsExecRequest::new(cmd(), true, true, Some("box".into()), DEFAULT_STACK_SIZE)
            .unwrap();
        assert!(req.namespaces.mount);
        assert!(req.namespaces.pid);
        assert!(req.namespaces.uts);
        assert!(req.namespaces.network);
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = NsExecRequest::new(Vec::new(), false, false, None, DEFAULT_STACK_SIZE)
            .unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn empty_hostname_is_rejected() {
        let err = NsExecRequest::new(cmd(), false, false, Some(String::new()), DEFAULT_STACK_SIZE)
            .unwrap_err();
        assert!(err.is_usage());
    }
}
