//! UTS namespace identity.
//!
//! Sets the hostname and NIS domain name seen inside the container.

use cellar_common::error::{CellarError, Result};

/// Sets the hostname inside the UTS namespace.
///
/// # Errors
///
/// Returns an error if `sethostname(2)` fails.
pub fn set_hostname(hostname: &str) -> Result<()> {
    nix::unistd::sethostname(hostname).map_err(|e| CellarError::Namespace {
        message: format!("sethostname({hostname}) failed: {e}"),
    })?;
    tracing::debug!(hostname, "hostname set");
    Ok(())
}

/// Sets the domain name inside the UTS namespace.
///
/// # Errors
///
/// Returns an error if `setdomainname(2)` fails.
pub fn set_domainname(domain: &str) -> Result<()> {
    // SAFETY: the pointer and length describe the live `domain` slice;
    // the kernel copies the bytes and does not require NUL termination.
    let rc = unsafe { libc::setdomainname(domain.as_ptr().cast(), domain.len()) };
    if rc != 0 {
        return Err(CellarError::Namespace {
            message: format!(
                "setdomainname({domain}) failed: {}",
                std::io::Error::last_os_error()
            ),
        });
    }
    tracing::debug!(domain, "domain name set");
    Ok(())
}
