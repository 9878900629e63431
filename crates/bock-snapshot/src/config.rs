//! Snapshotter configuration.

use std::path::PathBuf;

use bock_common::BockPaths;

/// Snapshotter configuration options.
#[derive(Debug, Clone)]
pub struct SnapshotterConfig {
    /// Paths for snapshot data.
    pub paths: BockPaths,
    /// Remove `new-*` and `rm-*` leftovers when opening. Only safe while no
    /// other process uses the same root.
    pub sweep_on_start: bool,
}

impl Default for SnapshotterConfig {
    fn default() -> Self {
        Self {
            paths: BockPaths::new(),
            sweep_on_start: false,
        }
    }
}

impl SnapshotterConfig {
    /// Create a rootless configuration under the user's data directory.
    #[must_use]
    pub fn rootless() -> Self {
        let data = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        let root = data.join("bock/snapshot/overlay");

        Self {
            paths: BockPaths::with_root(root),
            sweep_on_start: false,
        }
    }

    /// Set the root directory.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.paths = BockPaths::with_root(root);
        self
    }

    /// Sweep leftovers of interrupted operations when opening.
    #[must_use]
    pub fn with_sweep_on_start(mut self) -> Self {
        self.sweep_on_start = true;
        self
    }
}
