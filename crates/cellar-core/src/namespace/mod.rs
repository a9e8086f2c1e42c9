//! Linux namespace management for container isolation.
//!
//! Selects the namespaces a child is cloned into, launches it on a
//! dedicated stack, and sets its UTS identity.

pub mod launch;
pub mod uts;

use nix::sched::CloneFlags;

pub use launch::{kill, spawn, wait_for_exit};

/// Which namespaces the child is created in.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Isolate the mount table.
    pub mount: bool,
    /// Isolate the PID space; the child becomes PID 1.
    pub pid: bool,
    /// Isolate hostname and domain name.
    pub uts: bool,
    /// Isolate the network stack.
    pub network: bool,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            mount: true,
            pid: true,
            uts: true,
            network: false,
        }
    }
}

impl NamespaceConfig {
    /// Only a fresh mount namespace, the baseline every launch gets.
    #[must_use]
    pub const fn mount_only() -> Self {
        Self {
            mount: true,
            pid: false,
            uts: false,
            network: false,
        }
    }

    /// Returns a copy with network isolation switched on or off.
    #[must_use]
    pub const fn with_network(mut self, network: bool) -> Self {
        self.network = network;
        self
    }

    /// Translates the selection into `clone(2)` flags.
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::empty();
        if self.mount {
            flags |= CloneFlags::CLONE_NEWNS;
        }
        if self.pid {
            flags |= CloneFlags::CLONE_NEWPID;
        }
        if self.uts {
            flags |= CloneFlags::CLONE_NEWUTS;
        }
        if self.network {
            flags |= CloneFlags::CLONE_NEWNET;
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_isolates_mount_pid_and_uts_only() {
        let flags = NamespaceConfig::default().clone_flags();
        assert!(flags.contains(CloneFlags::CLONE_NEWNS));
        assert!(flags.contains(CloneFlags::CLONE_NEWPID));
        assert!(flags.contains(CloneFlags::CLONE_NEWUTS));
        assert!(!flags.contains(CloneFlags::CLONE_NEWNET));
    }

    #[test]
    fn with_network_adds_newnet() {
        let flags = NamespaceConfig::default().with_network(true).clone_flags();
        assert!(flags.contains(CloneFlags::CLONE_NEWNET));
    }

    #[test]
    fn mount_only_sets_a_single_flag() {
        assert_eq!(
            NamespaceConfig::mount_only().clone_flags(),
            CloneFlags::CLONE_NEWNS
        );
    }

    #[test]
    fn clone_flags_never_share_address_space() {
        let flags = NamespaceConfig::default().with_network(true).clone_flags();
        assert!(!flags.contains(CloneFlags::CLONE_VM));
        assert!(!flags.contains(CloneFlags::CLONE_FILES));
    }
}
