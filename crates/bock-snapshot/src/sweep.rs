//! Startup reconciliation of interrupted operations.
//!
//! A crash during prepare or view can leave a `new-*` staging directory, and
//! a crash during remove can leave an `rm-<id>` directory. Neither has a
//! metadata record, so both can be deleted. Run this only while no other
//! process is using the same root, since a live `new-*` directory looks the
//! same as an abandoned one.

use std::path::PathBuf;

use bock_common::{BockError, BockPaths, BockResult};

/// Remove every `new-*` and `rm-*` directory directly under the snapshots
/// directory, returning the removed paths.
///
/// # Errors
///
/// Returns an error if the snapshots directory cannot be read. Failures to
/// remove a single leftover are logged and skipped.
pub fn sweep_orphans(paths: &BockPaths) -> BockResult<Vec<PathBuf>> {
    let snapshots = paths.snapshots();
    let mut removed = Vec::new();

    if !snapshots.exists() {
        return Ok(removed);
    }

    for entry in std::fs::read_dir(&snapshots).map_err(BockError::fs("read", &snapshots))? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !BockPaths::is_transient(&name) || !entry.path().is_dir() {
            continue;
        }

        let path = entry.path();
        match std::fs::remove_dir_all(&path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Removed leftover snapshot directory");
                removed.push(path);
            }
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "Failed to remove leftover snapshot directory"
                );
            }
        }
    }

    Ok(removed)
}
