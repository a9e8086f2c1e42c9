//! Container launch orchestration for the cellar launcher.
//!
//! The host side ([`orchestrator`]) builds on a [`descriptor`], clones
//! the child, performs network and cgroup setup while the child waits at
//! the barrier, then waits for it. The child side ([`bootstrap`]) walks
//! a fixed sequence of stages from the barrier to `execvp`.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod bootstrap;
pub mod descriptor;
pub mod lock;
pub mod nsexec;
pub mod orchestrator;
