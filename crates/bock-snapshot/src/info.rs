//! Snapshot information returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Writable working copy or read-only view, addressed by key.
    Active,
    /// Immutable layer, addressed by name, usable as a parent.
    Committed,
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Committed => write!(f, "committed"),
        }
    }
}

/// Information about an active or committed snapshot.
///
/// Never carries the internal id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    /// Key of an active snapshot or name of a committed one.
    pub name: String,
    /// Name of the committed parent, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Snapshot kind.
    pub kind: Kind,
    /// True for a view.
    pub readonly: bool,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Last change of kind.
    pub updated: DateTime<Utc>,
}

/// Disk usage of a snapshot's own layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Number of filesystem entries below the layer directory.
    pub inodes: u64,
    /// Total size of regular files in bytes.
    pub size: u64,
}
