//! Host-side launch sequence.
//!
//! The host owns every step that must complete before the container
//! command may run: the host half of the veth pair, moving the peer into
//! the child's network namespace, and the memory cgroup. The child is
//! held at the [`Barrier`] until all of it is done, then the host waits
//! for it and tears the cgroup down.
//!
//! Any failure after the child exists kills and reaps it before the
//! error is returned, so an unconfigured container never runs.

use std::fmt;

use nix::unistd::Pid;

use cellar_common::config::CellarConfig;
use cellar_common::error::Result;
use cellar_core::cgroup::CgroupManager;
use cellar_core::namespace::{self, NamespaceConfig};
use cellar_core::network::{self, NetworkControl, VethPair};
use cellar_core::sync::Barrier;

use crate::bootstrap::Bootstrap;
use crate::descriptor::ContainerDescriptor;
use crate::lock::IdLock;

/// Creates, reaps and kills the container's init process.
pub trait Launcher {
    /// Starts the child in `namespaces`; it must block on `barrier`
    /// before doing anything observable.
    ///
    /// # Errors
    ///
    /// Returns an error if the child cannot be created.
    fn launch(
        &self,
        namespaces: &NamespaceConfig,
        descriptor: &ContainerDescriptor,
        barrier: &Barrier,
    ) -> Result<Pid>;

    /// Blocks until the child terminates and returns its exit status.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    fn wait(&self, pid: Pid) -> Result<i32>;

    /// Kills the child and reaps it.
    ///
    /// # Errors
    ///
    /// Returns an error if the child cannot be signalled or reaped.
    fn abort(&self, pid: Pid) -> Result<()>;
}

/// [`Launcher`] that clones a real child running [`Bootstrap`].
pub struct CloneLauncher<'a> {
    config: &'a CellarConfig,
    network: &'a dyn NetworkControl,
}

impl fmt::Debug for CloneLauncher<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloneLauncher")
            .field("config", self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> CloneLauncher<'a> {
    /// The child uses `network` for its half of the link setup.
    #[must_use]
    pub fn new(config: &'a CellarConfig, network: &'a dyn NetworkControl) -> Self {
        Self { config, network }
    }
}

impl Launcher for CloneLauncher<'_> {
    fn launch(
        &self,
        namespaces: &NamespaceConfig,
        descriptor: &ContainerDescriptor,
        barrier: &Barrier,
    ) -> Result<Pid> {
        let bootstrap = Bootstrap::new(descriptor, self.config, self.network);
        namespace::spawn(namespaces, self.config.stack_size, || {
            bootstrap.entry(barrier)
        })
    }

    fn wait(&self, pid: Pid) -> Result<i32> {
        namespace::wait_for_exit(pid)
    }

    fn abort(&self, pid: Pid) -> Result<()> {
        namespace::kill(pid)?;
        let code = namespace::wait_for_exit(pid)?;
        tracing::debug!(pid = pid.as_raw(), code, "aborted child reaped");
        Ok(())
    }
}

/// Outcome of a completed launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// Host PID of the container's init process.
    pub pid: Pid,
    /// Exit status; `128 + signo` if it was killed by a signal.
    pub code: i32,
}

/// Runs the host half of a launch.
pub struct HostOrchestrator<'a> {
    config: &'a CellarConfig,
    network: &'a dyn NetworkControl,
    launcher: &'a dyn Launcher,
}

impl fmt::Debug for HostOrchestrator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostOrchestrator")
            .field("config", self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> HostOrchestrator<'a> {
    /// Creates an orchestrator over injected network and launcher seams.
    #[must_use]
    pub fn new(
        config: &'a CellarConfig,
        network: &'a dyn NetworkControl,
        launcher: &'a dyn Launcher,
    ) -> Self {
        Self {
            config,
            network,
            launcher,
        }
    }

    /// Launches the container and blocks until it exits.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is in use, any host-side setup step
    /// fails, or the child cannot be waited for. Setup failures after the
    /// child exists abort the child first.
    pub fn run(&self, descriptor: &ContainerDescriptor) -> Result<ExitReport> {
        let memory_limit = descriptor.memory_limit_bytes()?;
        let veth = descriptor.veth_pair()?;
        let namespaces = descriptor.namespaces();

        let _lock = IdLock::acquire(&self.config.containers_dir(), &descriptor.id)?;

        if let Some(pair) = &veth {
            network::attach_host_side(self.network, pair, &self.config.network.bridge)?;
        }

        let barrier = Barrier::new()?;
        let pid = self.launcher.launch(&namespaces, descriptor, &barrier)?;
        tracing::info!(container = %descriptor.id, pid = pid.as_raw(), "container child started");

        let mut cgroup = None;
        if let Err(e) = self.prepare_child(descriptor, veth.as_ref(), memory_limit, pid, &mut cgroup) {
            tracing::error!(container = %descriptor.id, error = %e, "host setup failed, aborting child");
            if let Err(abort_err) = self.launcher.abort(pid) {
                tracing::warn!(error = %abort_err, "failed to abort child");
            }
            teardown(cgroup.as_ref());
            return Err(e);
        }

        barrier.release();
        let waited = self.launcher.wait(pid);
        teardown(cgroup.as_ref());
        let code = waited?;
        tracing::info!(container = %descriptor.id, pid = pid.as_raw(), code, "container exited");
        Ok(ExitReport { pid, code })
    }

    fn prepare_child(
        &self,
        descriptor: &ContainerDescriptor,
        veth: Option<&VethPair>,
        memory_limit: Option<u64>,
        pid: Pid,
        cgroup: &mut Option<CgroupManager>,
    ) -> Result<()> {
        if let Some(pair) = veth {
            network::move_peer(self.network, pair, pid.as_raw())?;
        }

        if let Some(bytes) = memory_limit {
            let name = self
                .config
                .cgroup
                .group_name(descriptor.id.as_str(), pid.as_raw());
            let group = cgroup.insert(CgroupManager::create(&self.config.cgroup.root, &name)?);
            group.apply_memory_limit(bytes)?;
            group.add_process(pid.as_raw())?;
            tracing::info!(container = %descriptor.id, bytes, "memory limit applied");
        }
        Ok(())
    }
}

fn teardown(cgroup: Option<&CgroupManager>) {
    let Some(group) = cgroup else { return };
    if let Err(e) = group.destroy() {
        tracing::warn!(path = %group.path().display(), error = %e, "cgroup left behind");
    }
}
