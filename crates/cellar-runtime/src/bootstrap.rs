//! Child-side bootstrap, from the barrier to `execvp`.
//!
//! Runs inside the cloned process, which is PID 1 of its PID namespace
//! when one was requested. Stages run strictly in [`Stage`] order and the
//! first failure ends the child with a non-zero status; nothing here
//! returns control to the host.

use std::convert::Infallible;
use std::ffi::CString;
use std::fmt;
use std::path::Path;

use cellar_common::config::CellarConfig;
use cellar_common::error::{CellarError, Result};
use cellar_core::filesystem::{self, mount};
use cellar_core::namespace::uts;
use cellar_core::network::{self, NetworkControl};
use cellar_core::sync::Barrier;

use crate::descriptor::ContainerDescriptor;

/// Exit status when the command cannot be executed.
pub const EXIT_EXEC_FAILED: isize = 127;

/// Exit status for any other bootstrap failure.
pub const EXIT_SETUP_FAILED: isize = 1;

/// Child bootstrap stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Waiting for the host to finish network and cgroup setup.
    Blocked,
    /// Mount propagation made private.
    MountPrivate,
    /// Overlay mounted and root switched.
    RootAssembled,
    /// Fresh `/dev` and `/proc` mounted.
    DevProcMounted,
    /// Environment, hostname and domain name set.
    IdentitySet,
    /// Container link addressed and routed.
    NetworkConfigured,
    /// About to replace the process image.
    Exec,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Blocked => "blocked",
            Self::MountPrivate => "mount-private",
            Self::RootAssembled => "root-assembled",
            Self::DevProcMounted => "dev-proc-mounted",
            Self::IdentitySet => "identity-set",
            Self::NetworkConfigured => "network-configured",
            Self::Exec => "exec",
        };
        f.write_str(name)
    }
}

/// Child-side setup for one container.
pub struct Bootstrap<'a> {
    descriptor: &'a ContainerDescriptor,
    config: &'a CellarConfig,
    network: &'a dyn NetworkControl,
}

impl fmt::Debug for Bootstrap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrap")
            .field("descriptor", self.descriptor)
            .field("config", self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> Bootstrap<'a> {
    /// Prepares the bootstrap; nothing runs until [`Bootstrap::run`].
    #[must_use]
    pub fn new(
        descriptor: &'a ContainerDescriptor,
        config: &'a CellarConfig,
        network: &'a dyn NetworkControl,
    ) -> Self {
        Self {
            descriptor,
            config,
            network,
        }
    }

    /// Runs every stage and replaces the process image.
    ///
    /// Returns only on failure.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing stage.
    pub fn run(&self, barrier: &Barrier) -> Result<Infallible> {
        let id = self.descriptor.id.as_str();

        enter(Stage::Blocked, id);
        barrier.wait_in_child()?;

        enter(Stage::MountPrivate, id);
        mount::make_root_private()?;

        enter(Stage::RootAssembled, id);
        filesystem::assemble_root(&self.descriptor.overlay(), &self.config.identity_files)?;

        enter(Stage::DevProcMounted, id);
        mount::mount_dev_and_proc(Path::new("/"))?;

        enter(Stage::IdentitySet, id);
        apply_environment(&self.config.path_env);
        uts::set_hostname(id)?;
        uts::set_domainname(&self.config.domain_name)?;

        if let (Some(pair), Some(link)) = (
            self.descriptor.veth_pair()?,
            self.descriptor.container_link(&self.config.network),
        ) {
            enter(Stage::NetworkConfigured, id);
            network::configure_container_side(self.network, &pair, &link)?;
        }

        enter(Stage::Exec, id);
        exec_command(&self.descriptor.command)
    }

    /// Runs the bootstrap and turns its failure into an exit status.
    ///
    /// Used as the `clone(2)` entry point.
    pub fn entry(&self, barrier: &Barrier) -> isize {
        match self.run(barrier) {
            Ok(never) => match never {},
            Err(e) => {
                tracing::error!(container = %self.descriptor.id, error = %e, "container bootstrap failed");
                exit_status(&e)
            }
        }
    }
}

fn enter(stage: Stage, id: &str) {
    tracing::debug!(container = id, %stage, "bootstrap stage");
}

/// Exit status the child reports for `err`.
#[must_use]
pub const fn exit_status(err: &CellarError) -> isize {
    match err {
        CellarError::Exec { .. } => EXIT_EXEC_FAILED,
        _ => EXIT_SETUP_FAILED,
    }
}

/// Installs `PATH` and drops `LC_ALL` for the container command.
pub fn apply_environment(path_env: &str) {
    // SAFETY: called only in the freshly cloned child, which runs a single
    // thread; no other code can read the environment concurrently.
    unsafe {
        std::env::set_var("PATH", path_env);
        std::env::remove_var("LC_ALL");
    }
}

/// Replaces the process image with `command`, searching `PATH`.
///
/// # Errors
///
/// Returns an exec error if the command is empty, contains a NUL byte,
/// or `execvp(3)` fails.
pub fn exec_command(command: &[String]) -> Result<Infallible> {
    let program = command.first().ok_or_else(|| CellarError::Exec {
        command: String::new(),
        message: "empty command".into(),
    })?;
    let args = command
        .iter()
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| CellarError::Exec {
            command: program.clone(),
            message: format!("argument contains a NUL byte: {e}"),
        })?;

    tracing::info!(command = ?command, "executing container command");
    let err = match nix::unistd::execvp(&args[0], &args) {
        Ok(never) => match never {},
        Err(err) => err,
    };
    Err(CellarError::Exec {
        command: program.clone(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_shows_descriptor_and_config() {
        use cellar_common::types::{ContainerId, ImageName};
        use cellar_core::network::IpRoute2;

        let config = CellarConfig::default();
        let descriptor = ContainerDescriptor::new(
            &config,
            ContainerId::parse("web1").unwrap(),
            ImageName::parse("alpine").unwrap(),
            vec!["/bin/sh".into()],
        )
        .unwrap();
        let network = IpRoute2::default();
        let text = format!("{:?}", Bootstrap::new(&descriptor, &config, &network));
        assert!(text.starts_with("Bootstrap { descriptor: ContainerDescriptor"));
        assert!(text.contains("config: CellarConfig"));
        assert!(text.ends_with(", .. }"));
    }

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Blocked < Stage::MountPrivate);
        assert!(Stage::RootAssembled < Stage::DevProcMounted);
        assert!(Stage::NetworkConfigured < Stage::Exec);
        assert_eq!(Stage::RootAssembled.to_string(), "root-assembled");
    }

    #[test]
    fn exec_failure_maps_to_127() {
        let err = CellarError::Exec {
            command: "/bin/nope".into(),
            message: "ENOENT".into(),
        };
        assert_eq!(exit_status(&err), 127);
    }

    #[test]
    fn setup_failure_maps_to_1() {
        let err = CellarError::Mount {
            target: "/".into(),
            message: "EPERM".into(),
        };
        assert_eq!(exit_status(&err), 1);
    }

    #[test]
    fn empty_command_is_an_exec_error() {
        let err = exec_command(&[]).unwrap_err();
        assert!(matches!(err, CellarError::Exec { .. }));
    }

    #[test]
    fn nul_byte_is_rejected_before_exec() {
        let err = exec_command(&["ec\0ho".into()]).unwrap_err();
        assert!(matches!(err, CellarError::Exec { message, .. } if message.contains("NUL")));
    }

    #[test]
    fn missing_program_is_an_exec_error() {
        let err = exec_command(&["cellar-no-such-program".into()]).unwrap_err();
        assert_eq!(exit_status(&err), 127);
    }
}
