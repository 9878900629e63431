//! Standard filesystem paths for Bock snapshots.
//!
//! ```text
//! <root>/metadata.json
//! <root>/snapshots/<id>/fs      layer content (upperdir)
//! <root>/snapshots/<id>/work    overlay scratch area, writable actives only
//! <root>/snapshots/new-*        staging directory of an unfinished create
//! <root>/snapshots/rm-<id>      directory of an unfinished remove
//! ```

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

use crate::id::SnapshotId;

/// Default root directory for the overlay snapshotter.
pub static BOCK_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("BOCK_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/bock/snapshot/overlay"))
});

/// Name prefix of staging directories created by prepare and view.
pub const STAGING_PREFIX: &str = "new-";

/// Name prefix of directories being removed.
pub const REMOVAL_PREFIX: &str = "rm-";

/// Mode of every directory the snapshotter creates.
pub const DIR_MODE: u32 = 0o700;

const SNAPSHOTS_DIR: &str = "snapshots";
const METADATA_FILE: &str = "metadata.json";
const UPPER_DIR: &str = "fs";
const WORK_DIR: &str = "work";

/// Standard paths used by the snapshotter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BockPaths {
    /// Root data directory (default: /var/lib/bock/snapshot/overlay).
    pub root: PathBuf,
}

impl BockPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Metadata store document.
    #[must_use]
    pub fn metadata(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    /// Directory holding every snapshot directory.
    #[must_use]
    pub fn snapshots(&self) -> PathBuf {
        self.root.join(SNAPSHOTS_DIR)
    }

    /// Canonical directory of a snapshot.
    #[must_use]
    pub fn snapshot(&self, id: SnapshotId) -> PathBuf {
        self.snapshots().join(id.to_string())
    }

    /// Layer content of a snapshot (overlay upperdir, or lowerdir once
    /// used as a parent).
    #[must_use]
    pub fn upper(&self, id: SnapshotId) -> PathBuf {
        self.snapshot(id).join(UPPER_DIR)
    }

    /// Overlay work directory of a snapshot.
    #[must_use]
    pub fn work(&self, id: SnapshotId) -> PathBuf {
        self.snapshot(id).join(WORK_DIR)
    }

    /// Where a snapshot directory is parked while its removal commits.
    #[must_use]
    pub fn removal(&self, id: SnapshotId) -> PathBuf {
        self.snapshots().join(format!("{REMOVAL_PREFIX}{id}"))
    }

    /// Layer content directory inside a staging directory.
    #[must_use]
    pub fn staged_upper(staging: &Path) -> PathBuf {
        staging.join(UPPER_DIR)
    }

    /// Work directory inside a staging directory.
    #[must_use]
    pub fn staged_work(staging: &Path) -> PathBuf {
        staging.join(WORK_DIR)
    }

    /// Returns true if a directory name under `snapshots()` belongs to an
    /// interrupted create or remove.
    #[must_use]
    pub fn is_transient(name: &str) -> bool {
        name.starts_with(STAGING_PREFIX) || name.starts_with(REMOVAL_PREFIX)
    }

    /// Create the root and snapshots directories.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn create_dirs(&self) -> std::io::Result<()> {
        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(DIR_MODE);
        }
        builder.create(&self.root)?;
        builder.create(self.snapshots())?;
        tracing::debug!(root = %self.root.display(), "Snapshot directories ready");
        Ok(())
    }
}

impl Default for BockPaths {
    fn default() -> Self {
        Self {
            root: BOCK_ROOT.clone(),
        }
    }
}
