//! Domain primitive types used across the cellar workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_ID_LEN, MAX_IMAGE_LEN};
use crate::error::{CellarError, Result};

/// Unique identifier for a container instance.
///
/// The id names the hostname, the cgroup and the veth pair, so it is
/// restricted to characters valid in all three.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerId(String);

impl ContainerId {
    /// Validates and wraps a container id.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the id is empty, longer than
    /// [`MAX_ID_LEN`], starts with `-`, or contains characters other than
    /// ASCII alphanumerics, `-` and `_`.
    pub fn parse(id: &str) -> Result<Self> {
        if id.is_empty() {
            return Err(CellarError::Usage {
                message: "container name must not be empty".into(),
            });
        }
        if id.len() > MAX_ID_LEN {
            return Err(CellarError::Usage {
                message: format!("container name {id:?} is longer than {MAX_ID_LEN} characters"),
            });
        }
        if id.starts_with('-')
            || !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CellarError::Usage {
                message: format!(
                    "container name {id:?} may only contain letters, digits, '-' and '_'"
                ),
            });
        }
        Ok(Self(id.to_owned()))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContainerId {
    type Error = CellarError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ContainerId> for String {
    fn from(id: ContainerId) -> Self {
        id.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a read-only image tree under the images directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageName(String);

impl ImageName {
    /// Validates and wraps an image name.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the name is empty, longer than
    /// [`MAX_IMAGE_LEN`], contains `/` or NUL, or is `.` or `..`.
    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty() || name.len() > MAX_IMAGE_LEN {
            return Err(CellarError::Usage {
                message: format!("image name must be 1 to {MAX_IMAGE_LEN} characters"),
            });
        }
        if name == "." || name == ".." || name.contains('/') || name.contains('\0') {
            return Err(CellarError::Usage {
                message: format!("image name {name:?} must be a plain directory name"),
            });
        }
        Ok(Self(name.to_owned()))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ImageName {
    type Error = CellarError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ImageName> for String {
    fn from(name: ImageName) -> Self {
        name.0
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_id_accepts_short_names() {
        let id = ContainerId::parse("web1").unwrap();
        assert_eq!(id.as_str(), "web1");
        assert_eq!(id.to_string(), "web1");
    }

    #[test]
    fn container_id_rejects_empty() {
        assert!(ContainerId::parse("").unwrap_err().is_usage());
    }

    #[test]
    fn container_id_rejects_names_that_overflow_ifname() {
        assert!(ContainerId::parse("abcdefghijk").is_ok());
        assert!(ContainerId::parse("abcdefghijkl").is_err());
    }

    #[test]
    fn container_id_rejects_path_and_flag_characters() {
        assert!(ContainerId::parse("a/b").is_err());
        assert!(ContainerId::parse("-rf").is_err());
        assert!(ContainerId::parse("we b").is_err());
        assert!(ContainerId::parse("db_1-a").is_ok());
    }

    #[test]
    fn image_name_rejects_traversal() {
        assert!(ImageName::parse("alpine").is_ok());
        assert!(ImageName::parse("..").is_err());
        assert!(ImageName::parse("../etc").is_err());
        assert!(ImageName::parse("").is_err());
        assert!(ImageName::parse(&"a".repeat(MAX_IMAGE_LEN + 1)).is_err());
    }

    #[test]
    fn container_id_deserialization_validates() {
        let ok: ContainerId = serde_json::from_str("\"web1\"").unwrap();
        assert_eq!(ok.as_str(), "web1");
        assert!(serde_json::from_str::<ContainerId>("\"bad/id\"").is_err());
    }
}
