//! Scoped ownership of the directories an operation creates or moves.
//!
//! Each guard undoes its own step when dropped while armed, so every error
//! return and every cancelled future releases exactly what was acquired.

use std::fs::DirBuilder;
use std::path::{Path, PathBuf};

use bock_common::paths::{DIR_MODE, STAGING_PREFIX};
use bock_common::{BockError, BockPaths, BockResult};
use tempfile::TempDir;

fn create_dir(path: &Path) -> BockResult<()> {
    let mut builder = DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(path).map_err(BockError::fs("create", path))
}

/// A `new-*` directory holding a snapshot before it has an id.
///
/// Removed on drop unless promoted.
#[derive(Debug)]
pub(crate) struct StagingDir {
    dir: TempDir,
}

impl StagingDir {
    /// Create a staging directory under `snapshots` with its `fs` and, for
    /// writable snapshots, `work` subdirectories.
    pub(crate) fn create(snapshots: &Path, readonly: bool) -> BockResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(snapshots)
            .map_err(BockError::fs("create temp dir in", snapshots))?;
        let staging = Self { dir };

        create_dir(&BockPaths::staged_upper(staging.path()))?;
        if !readonly {
            create_dir(&BockPaths::staged_work(staging.path()))?;
        }

        tracing::debug!(path = %staging.path().display(), readonly, "Staging directory created");
        Ok(staging)
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Atomically rename the staging directory to `target`.
    ///
    /// On failure the staging directory is removed.
    pub(crate) fn promote(self, target: &Path) -> BockResult<LiveDir> {
        std::fs::rename(self.path(), target).map_err(BockError::fs("rename", self.path()))?;
        // The staging path no longer exists; only forget it.
        let _ = self.dir.keep();
        Ok(LiveDir {
            path: target.to_path_buf(),
            armed: true,
        })
    }
}

/// A freshly renamed snapshot directory whose metadata is not committed yet.
///
/// Removed on drop unless disarmed.
#[derive(Debug)]
pub(crate) struct LiveDir {
    path: PathBuf,
    armed: bool,
}

impl LiveDir {
    /// The metadata is durable; keep the directory.
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LiveDir {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = std::fs::remove_dir_all(&self.path) {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "Failed to remove snapshot directory after failed create"
            );
        }
    }
}

/// A snapshot directory parked under `rm-<id>` while its removal commits.
///
/// Renamed back to its canonical path on drop unless finished.
#[derive(Debug)]
pub(crate) struct PendingRemoval {
    live: PathBuf,
    parked: PathBuf,
    armed: bool,
}

impl PendingRemoval {
    /// Rename `live` to `parked`.
    pub(crate) fn park(live: PathBuf, parked: PathBuf) -> BockResult<Self> {
        std::fs::rename(&live, &parked).map_err(BockError::fs("rename", &live))?;
        Ok(Self {
            live,
            parked,
            armed: true,
        })
    }

    /// The removal is durable; hand back the parked path for deletion.
    pub(crate) fn finish(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.parked)
    }
}

impl Drop for PendingRemoval {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = std::fs::rename(&self.parked, &self.live) {
            // The record still exists but its directory is only reachable
            // under the parked name until repaired.
            tracing::error!(
                path = %self.parked.display(),
                error = %err,
                "Failed to rename after failed commit"
            );
        }
    }
}
