//! Mount descriptors handed to the container runtime.

use serde::{Deserialize, Serialize};

/// A mount the caller should perform to materialise a snapshot.
///
/// The snapshotter never calls mount(2) itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    /// Filesystem type (`bind` or `overlay`).
    #[serde(rename = "type")]
    pub mount_type: String,
    /// Mount source.
    pub source: String,
    /// Mount options, in order.
    pub options: Vec<String>,
}

impl Mount {
    /// A recursive bind mount of `source`.
    #[must_use]
    pub fn bind(source: impl Into<String>, readonly: bool) -> Self {
        let flag = if readonly { "ro" } else { "rw" };
        Self {
            mount_type: "bind".to_string(),
            source: source.into(),
            options: vec![flag.to_string(), "rbind".to_string()],
        }
    }

    /// An overlay mount with the given options.
    #[must_use]
    pub fn overlay(options: Vec<String>) -> Self {
        Self {
            mount_type: "overlay".to_string(),
            source: "overlay".to_string(),
            options,
        }
    }

    /// Returns true if the mount is read-only.
    #[must_use]
    pub fn is_readonly(&self) -> bool {
        let has_upper = self.options.iter().any(|o| o.starts_with("upperdir="));
        self.options.iter().any(|o| o == "ro") || (self.mount_type == "overlay" && !has_upper)
    }
}
