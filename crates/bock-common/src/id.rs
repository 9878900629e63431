//! Snapshot identifiers and parent references.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BockError, BockResult};

/// An opaque snapshot identifier allocated by the metadata store.
///
/// Ids name the snapshot's directory on disk and stay stable for its
/// whole life, across commit. They are never reused and never shown to
/// callers of the snapshotter, which only deal in keys and names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(u64);

impl SnapshotId {
    /// Create an id from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The id following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SnapshotId {
    type Err = BockError;

    fn from_str(s: &str) -> BockResult<Self> {
        // Reject signs and leading zeros so one id maps to one directory name.
        if s.is_empty() || (s.len() > 1 && s.starts_with('0')) || s.starts_with('+') {
            return Err(BockError::Internal {
                message: format!("Invalid snapshot id: {s}"),
            });
        }
        s.parse::<u64>()
            .map(Self)
            .map_err(|e| BockError::Internal {
                message: format!("Invalid snapshot id {s}: {e}"),
            })
    }
}

/// Reference to the parent of a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParentRef {
    /// Name of a committed snapshot, not yet resolved.
    Key(String),
    /// An already resolved snapshot id.
    Id(SnapshotId),
}

impl ParentRef {
    /// Parse the caller-facing parent argument; an empty string means no
    /// parent.
    #[must_use]
    pub fn from_key(parent: &str) -> Option<Self> {
        if parent.is_empty() {
            None
        } else {
            Some(Self::Key(parent.to_string()))
        }
    }
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::Id(id) => write!(f, "#{id}"),
        }
    }
}
