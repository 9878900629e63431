//! Snapshot lifecycle on top of a metadata store and the snapshots directory.

use std::path::Path;

use async_trait::async_trait;
use bock_common::{BockError, BockPaths, BockResult, ParentRef, ResultExt};
use walkdir::WalkDir;

use super::guard::{PendingRemoval, StagingDir};
use super::mounts::mounts;
use crate::config::SnapshotterConfig;
use crate::info::{Info, Usage};
use crate::mount::Mount;
use crate::snapshotter::Snapshotter;
use crate::storage::{FileMetaStore, MetaStore, Transaction, WalkFn};
use crate::sweep::sweep_orphans;

/// Roll back a transaction that must not take effect, logging failures.
fn abort<T: Transaction>(tx: T) {
    if let Err(err) = tx.rollback() {
        tracing::warn!(error = %err, "Failure rolling back transaction");
    }
}

/// Overlay snapshotter.
///
/// Holds no lock of its own: concurrent callers are kept apart by the
/// metadata store's transactions, and directories are only ever created
/// under names the store allocated.
#[derive(Debug)]
pub struct OverlaySnapshotter<S> {
    paths: BockPaths,
    store: S,
}

impl OverlaySnapshotter<FileMetaStore> {
    /// Open the snapshotter described by `config`, with its metadata kept
    /// in `<root>/metadata.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created or the
    /// metadata cannot be loaded.
    pub fn open(config: &SnapshotterConfig) -> BockResult<Self> {
        if config.sweep_on_start {
            sweep_orphans(&config.paths)?;
        }
        let store = FileMetaStore::open(config.paths.metadata())?;
        Self::new(config.paths.clone(), store)
    }
}

impl<S: MetaStore> OverlaySnapshotter<S> {
    /// Create a snapshotter rooted at `paths` using `store` for metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshots directory cannot be created.
    pub fn new(paths: BockPaths, store: S) -> BockResult<Self> {
        paths.create_dirs()?;
        Ok(Self { paths, store })
    }

    /// The directory layout.
    pub const fn paths(&self) -> &BockPaths {
        &self.paths
    }

    /// The metadata store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    async fn create_active(
        &self,
        key: &str,
        parent: &str,
        readonly: bool,
    ) -> BockResult<Vec<Mount>> {
        let staging = StagingDir::create(&self.paths.snapshots(), readonly)
            .context("failed to create staging directory")?;

        let mut tx = self.store.begin(true).await?;

        let parent = ParentRef::from_key(parent);
        let active = match tx.create_active(key, parent.as_ref(), readonly) {
            Ok(active) => active,
            Err(err) => {
                abort(tx);
                return Err(err.context("failed to create active snapshot"));
            }
        };

        let target = self.paths.snapshot(active.id);
        let live = match staging.promote(&target) {
            Ok(live) => live,
            Err(err) => {
                abort(tx);
                return Err(err.context("failed to rename"));
            }
        };

        // On failure `live` is dropped here and removes the directory.
        tx.commit().context("commit failed")?;
        live.disarm();

        tracing::info!(key, id = %active.id, readonly, "Active snapshot created");
        Ok(mounts(&self.paths, &active))
    }
}

#[async_trait]
impl<S: MetaStore> Snapshotter for OverlaySnapshotter<S> {
    async fn stat(&self, key: &str) -> BockResult<Info> {
        let tx = self.store.begin(false).await?;
        let info = tx.stat(key);
        abort(tx);
        info
    }

    async fn prepare(&self, key: &str, parent: &str) -> BockResult<Vec<Mount>> {
        self.create_active(key, parent, false).await
    }

    async fn view(&self, key: &str, parent: &str) -> BockResult<Vec<Mount>> {
        self.create_active(key, parent, true).await
    }

    async fn mounts(&self, key: &str) -> BockResult<Vec<Mount>> {
        let tx = self.store.begin(false).await?;
        let active = tx.get_active(key);
        abort(tx);
        let active = active.context("failed to get active mount")?;
        Ok(mounts(&self.paths, &active))
    }

    async fn commit(&self, name: &str, key: &str) -> BockResult<()> {
        let mut tx = self.store.begin(true).await?;
        let id = match tx.commit_active(key, name) {
            Ok(id) => id,
            Err(err) => {
                abort(tx);
                return Err(err.context("failed to commit snapshot"));
            }
        };
        tx.commit().context("failed to commit snapshot")?;

        tracing::info!(key, name, %id, "Snapshot committed");
        Ok(())
    }

    async fn remove(&self, key: &str) -> BockResult<()> {
        let mut tx = self.store.begin(true).await?;

        let (id, kind) = match tx.remove(key) {
            Ok(removed) => removed,
            Err(err) => {
                abort(tx);
                return Err(err.context("failed to remove"));
            }
        };

        let pending = match PendingRemoval::park(self.paths.snapshot(id), self.paths.removal(id))
        {
            Ok(pending) => pending,
            Err(err) => {
                abort(tx);
                return Err(err.context("failed to rename"));
            }
        };

        if let Err(err) = tx.commit() {
            // Puts the directory back under its canonical name.
            drop(pending);
            return Err(err.context("failed to commit"));
        }
        let parked = pending.finish();

        if let Err(err) = tokio::fs::remove_dir_all(&parked).await {
            // Any rm-* directory is safe to delete later.
            tracing::warn!(
                path = %parked.display(),
                error = %err,
                "Failed to remove root filesystem"
            );
        }

        tracing::info!(key, %id, %kind, "Snapshot removed");
        Ok(())
    }

    async fn walk(&self, visitor: &mut WalkFn<'_>) -> BockResult<()> {
        let tx = self.store.begin(false).await?;
        let result = tx.walk(visitor);
        abort(tx);
        result
    }

    async fn usage(&self, key: &str) -> BockResult<Usage> {
        let tx = self.store.begin(false).await?;
        let id = tx.id(key);
        abort(tx);
        let upper = self.paths.upper(id.context("failed to get usage")?);

        tokio::task::spawn_blocking(move || layer_usage(&upper))
            .await
            .map_err(|e| BockError::Internal {
                message: format!("usage task failed: {e}"),
            })?
    }
}

/// Count the entries and regular file bytes below `path`.
fn layer_usage(path: &Path) -> BockResult<Usage> {
    let mut usage = Usage::default();

    for entry in WalkDir::new(path).min_depth(1) {
        let entry = entry.map_err(|e| BockError::Io(e.into()))?;
        usage.inodes += 1;
        if entry.file_type().is_file() {
            let metadata = entry.metadata().map_err(|e| BockError::Io(e.into()))?;
            usage.size += metadata.len();
        }
    }

    Ok(usage)
}
