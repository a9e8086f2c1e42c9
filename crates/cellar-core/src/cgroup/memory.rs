//! Memory resource control.
//!
//! Writes the memory ceiling and turns swap off for a group, using the
//! control files of whichever hierarchy the group lives in.

use std::path::Path;

use cellar_common::error::Result;

use super::{CgroupVersion, write_control};

/// Sets the hard memory limit for a cgroup.
///
/// # Errors
///
/// Returns an error if writing to `memory.max` (v2) or
/// `memory.limit_in_bytes` (v1) fails.
pub fn set_memory_max(cgroup_path: &Path, version: CgroupVersion, bytes: u64) -> Result<()> {
    let file = match version {
        CgroupVersion::V2 => "memory.max",
        CgroupVersion::V1 => "memory.limit_in_bytes",
    };
    write_control(cgroup_path, file, &bytes.to_string())?;
    tracing::debug!(bytes, file, "memory max set");
    Ok(())
}

/// Disables swap for a cgroup whose memory ceiling is `bytes`.
///
/// On v2 `memory.swap.max` is set to zero. v1 has no swap-only knob:
/// `memory.memsw.limit_in_bytes` bounds memory plus swap and the kernel
/// rejects values below the memory ceiling, so it is pinned to `bytes`.
///
/// # Errors
///
/// Returns an error if the swap control file is missing (swap accounting
/// compiled out) or the kernel rejects the write.
pub fn disable_swap(cgroup_path: &Path, version: CgroupVersion, bytes: u64) -> Result<()> {
    match version {
        CgroupVersion::V2 => write_control(cgroup_path, "memory.swap.max", "0")?,
        CgroupVersion::V1 => {
            write_control(cgroup_path, "memory.memsw.limit_in_bytes", &bytes.to_string())?;
        }
    }
    tracing::debug!(?version, "swap disabled");
    Ok(())
}
