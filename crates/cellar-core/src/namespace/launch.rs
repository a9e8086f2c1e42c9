//! Child creation with `clone(2)` on a dedicated stack.
//!
//! The child gets a copy-on-write duplicate of the parent's address space
//! (no `CLONE_VM`), so everything the entry closure captures is a private
//! copy once the clone returns. Nothing is shared across the boundary.

use nix::errno::Errno;
use nix::sched::clone;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;

use cellar_common::error::{CellarError, Result};

use super::NamespaceConfig;

/// Launches `entry` in a new process inside the configured namespaces.
///
/// The entry's return value becomes the child's exit status. The stack is
/// allocated here; the parent's copy is released when this returns, the
/// child keeps its own.
///
/// # Errors
///
/// Returns a namespace error if `clone(2)` fails (for example `EPERM`
/// without `CAP_SYS_ADMIN`, or `ENOMEM`/`EAGAIN` on exhaustion).
pub fn spawn<F>(config: &NamespaceConfig, stack_size: usize, entry: F) -> Result<Pid>
where
    F: FnMut() -> isize,
{
    let mut stack = vec![0_u8; stack_size];
    let flags = config.clone_flags();

    // SAFETY: the flags never include CLONE_VM, so the child runs on a
    // private copy of `stack` and of everything `entry` borrows. The host
    // is single threaded when it launches, so no lock can be held across
    // the fork-like copy.
    let pid = unsafe { clone(Box::new(entry), &mut stack, flags, Some(libc::SIGCHLD)) }
        .map_err(|e| CellarError::Namespace {
            message: format!("clone with {flags:?} failed: {e}"),
        })?;

    tracing::info!(pid = pid.as_raw(), ?flags, "child cloned");
    Ok(pid)
}

/// Blocks until `pid` terminates and returns its exit status.
///
/// A child killed by a signal reports `128 + signo`, following the shell
/// convention. There is no timeout.
///
/// # Errors
///
/// Returns a namespace error if `waitpid(2)` fails for a reason other
/// than `EINTR`.
pub fn wait_for_exit(pid: Pid) -> Result<i32> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => {
                tracing::debug!(pid = pid.as_raw(), code, "child exited");
                return Ok(code);
            }
            Ok(WaitStatus::Signaled(_, sig, core_dumped)) => {
                tracing::warn!(pid = pid.as_raw(), ?sig, core_dumped, "child killed by signal");
                return Ok(128 + sig as i32);
            }
            Ok(other) => tracing::debug!(pid = pid.as_raw(), status = ?other, "ignoring wait status"),
            Err(Errno::EINTR) => {}
            Err(e) => {
                return Err(CellarError::Namespace {
                    message: format!("waitpid({pid}) failed: {e}"),
                });
            }
        }
    }
}

/// Sends `SIGKILL` to `pid`. A process that is already gone is not an error.
///
/// # Errors
///
/// Returns a namespace error if the signal cannot be delivered.
pub fn kill(pid: Pid) -> Result<()> {
    match signal::kill(pid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(CellarError::Namespace {
            message: format!("kill({pid}) failed: {e}"),
        }),
    }
}
