//! # cellar-core
//!
//! Low-level Linux isolation primitives for the cellar launcher.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: launching a child with `clone(2)` into fresh mount,
//!   PID, UTS and network namespaces, and setting its UTS identity.
//! - **Synchronization**: a one-shot pipe barrier from parent to child.
//! - **Filesystem**: `OverlayFS` assembly, `pivot_root`, and `/proc`/`/dev`.
//! - **Cgroups**: memory ceilings with swap disabled, v1 or v2.
//! - **Network**: veth pair wiring behind the [`network::NetworkControl`] trait.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! proper error handling and `// SAFETY:` documentation.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

#[cfg(not(target_os = "linux"))]
compile_error!("cellar-core requires Linux namespaces, cgroups and OverlayFS");

pub mod cgroup;
pub mod filesystem;
pub mod namespace;
pub mod network;
pub mod sync;
