//! One-shot parent-to-child readiness barrier.
//!
//! A pipe carries no payload: the child blocks reading it until every
//! writer end is closed, and the parent closes its writer only once all
//! host-side setup is finished. Both ends are close-on-exec, so neither
//! leaks into the container command.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::{AsRawFd, RawFd};

use nix::fcntl::OFlag;
use nix::unistd::pipe2;

use cellar_common::error::{CellarError, Result};

/// Both ends of the barrier pipe, created before the child is cloned.
#[derive(Debug)]
pub struct Barrier {
    gate: BarrierGate,
    release: BarrierRelease,
}

/// Read end: the child blocks here until release.
#[derive(Debug)]
pub struct BarrierGate {
    reader: File,
}

/// Write end: dropping it opens the gate.
#[derive(Debug)]
pub struct BarrierRelease {
    writer: File,
}

impl Barrier {
    /// Creates the pipe.
    ///
    /// # Errors
    ///
    /// Returns a namespace error if `pipe2(2)` fails.
    pub fn new() -> Result<Self> {
        let (reader, writer) = pipe2(OFlag::O_CLOEXEC).map_err(|e| CellarError::Namespace {
            message: format!("barrier pipe creation failed: {e}"),
        })?;
        Ok(Self {
            gate: BarrierGate {
                reader: File::from(reader),
            },
            release: BarrierRelease {
                writer: File::from(writer),
            },
        })
    }

    /// Splits the barrier into its two ends.
    #[must_use]
    pub fn split(self) -> (BarrierGate, BarrierRelease) {
        (self.gate, self.release)
    }

    /// Child side: drops the inherited copy of the writer, then waits.
    ///
    /// Must only be called in the cloned child, which owns duplicates of
    /// both descriptors. Without closing its own writer the child would
    /// never observe EOF.
    ///
    /// # Errors
    ///
    /// Returns a namespace error if the inherited writer cannot be closed
    /// or the wait fails.
    pub fn wait_in_child(&self) -> Result<()> {
        close_inherited(self.release.writer.as_raw_fd())?;
        self.gate.wait()
    }

    /// Parent side: closes both of the parent's ends, opening the gate.
    pub fn release(self) {
        let (gate, release) = self.split();
        drop(gate);
        release.open();
    }
}

impl BarrierGate {
    /// Blocks until every writer end has been closed.
    ///
    /// # Errors
    ///
    /// Returns a namespace error if the read fails, or if a byte arrives:
    /// the barrier carries no payload, so data means a protocol violation.
    pub fn wait(&self) -> Result<()> {
        let mut buf = [0_u8; 1];
        loop {
            match (&self.reader).read(&mut buf) {
                Ok(0) => {
                    tracing::debug!("barrier released");
                    return Ok(());
                }
                Ok(_) => {
                    return Err(CellarError::Namespace {
                        message: "barrier received unexpected data".into(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(CellarError::Namespace {
                        message: format!("barrier read failed: {e}"),
                    });
                }
            }
        }
    }
}

impl BarrierRelease {
    /// Closes the writer end.
    pub fn open(self) {
        drop(self.writer);
        tracing::debug!("barrier writer closed");
    }
}

fn close_inherited(fd: RawFd) -> Result<()> {
    // SAFETY: `fd` is this process's duplicate of the writer, inherited
    // through clone(2). The owning `File` in this address space is never
    // dropped because the child either execs or exits without unwinding.
    let rc = unsafe { libc::close(fd) };
    if rc != 0 {
        return Err(CellarError::Namespace {
            message: format!(
                "closing inherited barrier writer failed: {}",
                std::io::Error::last_os_error()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn gate_blocks_until_release() {
        let (gate, release) = Barrier::new().unwrap().split();
        let (tx, rx) = mpsc::channel();

        let waiter = std::thread::spawn(move || {
            gate.wait().unwrap();
            tx.send(()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        release.open();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }

    #[test]
    fn state_written_before_release_is_visible_after_wait() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("cgroup.procs");
        let (gate, release) = Barrier::new().unwrap().split();

        let observed = {
            let marker = marker.clone();
            std::thread::spawn(move || {
                gate.wait().unwrap();
                std::fs::read_to_string(marker).unwrap()
            })
        };

        std::fs::write(&marker, "4242\n").unwrap();
        release.open();
        assert_eq!(observed.join().unwrap(), "4242\n");
    }

    #[test]
    fn payload_is_a_protocol_violation() {
        let (gate, release) = Barrier::new().unwrap().split();
        (&release.writer).write_all(b"x").unwrap();
        let err = gate.wait().unwrap_err();
        assert!(err.to_string().contains("unexpected data"));
    }

    #[test]
    fn pipe_ends_are_close_on_exec() {
        let barrier = Barrier::new().unwrap();
        for fd in [
            barrier.gate.reader.as_raw_fd(),
            barrier.release.writer.as_raw_fd(),
        ] {
            // SAFETY: F_GETFD on a descriptor owned by `barrier`.
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
            assert_ne!(flags & libc::FD_CLOEXEC, 0);
        }
    }
}
