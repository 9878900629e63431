//! The snapshotter interface consumed by the container runtime.

use async_trait::async_trait;
use bock_common::BockResult;

use crate::info::{Info, Usage};
use crate::mount::Mount;
use crate::storage::WalkFn;

/// Manages the lineage of filesystem layers for container root filesystems.
///
/// Callers only ever see keys, names and mounts. Every method runs in its
/// own metadata transaction; dropping a returned future cancels the
/// operation and undoes whatever it had done.
#[async_trait]
pub trait Snapshotter: Send + Sync {
    /// Info for an active snapshot by key or a committed one by name.
    async fn stat(&self, key: &str) -> BockResult<Info>;

    /// Create a writable active snapshot on top of the committed `parent`
    /// (empty for none) and return its mounts.
    async fn prepare(&self, key: &str, parent: &str) -> BockResult<Vec<Mount>>;

    /// Create a read-only active snapshot of `parent` and return its mounts.
    async fn view(&self, key: &str, parent: &str) -> BockResult<Vec<Mount>>;

    /// Mounts of an existing active snapshot.
    async fn mounts(&self, key: &str) -> BockResult<Vec<Mount>>;

    /// Turn the active snapshot `key` into the committed snapshot `name`.
    async fn commit(&self, name: &str, key: &str) -> BockResult<()>;

    /// Remove a snapshot and its content.
    async fn remove(&self, key: &str) -> BockResult<()>;

    /// Visit every committed snapshot.
    async fn walk(&self, visitor: &mut WalkFn<'_>) -> BockResult<()>;

    /// Disk usage of a snapshot's own layer.
    async fn usage(&self, key: &str) -> BockResult<Usage>;
}
