//! Snapshot metadata storage.
//!
//! The snapshotter never touches metadata outside a [`Transaction`]. A
//! store must serialize writable transactions and may run read-only ones
//! concurrently; the on-disk consistency of the snapshotter depends on it.

mod file;

use async_trait::async_trait;
use bock_common::{BockResult, ParentRef, SnapshotId};

use crate::info::{Info, Kind};

pub use file::{FileMetaStore, FileTransaction};

/// Visitor invoked for each committed snapshot during a walk.
pub type WalkFn<'a> = dyn FnMut(&Info) -> BockResult<()> + Send + 'a;

/// An active snapshot as seen by the snapshotter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Active {
    /// Directory id.
    pub id: SnapshotId,
    /// Ids of every ancestor, nearest first.
    pub parent_ids: Vec<SnapshotId>,
    /// True for a view.
    pub readonly: bool,
}

/// A transactional metadata store.
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// Transaction type handed out by [`MetaStore::begin`].
    type Tx: Transaction;

    /// Begin a transaction. Writable transactions wait for any other
    /// writable transaction to finish.
    async fn begin(&self, writable: bool) -> BockResult<Self::Tx>;
}

/// A metadata transaction.
///
/// Dropping a transaction without calling [`Transaction::commit`] discards
/// its changes.
pub trait Transaction: Send + Sized {
    /// Look up an active snapshot by key or a committed one by name.
    ///
    /// # Errors
    ///
    /// Returns [`bock_common::BockError::SnapshotNotFound`] for an unknown key.
    fn stat(&self, key: &str) -> BockResult<Info>;

    /// Directory id of an active or committed snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`bock_common::BockError::SnapshotNotFound`] for an unknown key.
    fn id(&self, key: &str) -> BockResult<SnapshotId>;

    /// Look up an active snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`bock_common::BockError::SnapshotNotFound`] unless `key`
    /// names an active snapshot.
    fn get_active(&self, key: &str) -> BockResult<Active>;

    /// Allocate a new active snapshot on top of `parent`.
    ///
    /// # Errors
    ///
    /// Fails if the key is in use, the parent is missing or not committed,
    /// or the transaction is read-only.
    fn create_active(
        &mut self,
        key: &str,
        parent: Option<&ParentRef>,
        readonly: bool,
    ) -> BockResult<Active>;

    /// Reclassify the active snapshot `key` as committed under `name`,
    /// keeping its id.
    ///
    /// # Errors
    ///
    /// Fails if `key` is not a writable active snapshot or `name` is in use.
    fn commit_active(&mut self, key: &str, name: &str) -> BockResult<SnapshotId>;

    /// Remove a snapshot record, returning its id and kind.
    ///
    /// # Errors
    ///
    /// Fails if the key is unknown or the snapshot still has children.
    fn remove(&mut self, key: &str) -> BockResult<(SnapshotId, Kind)>;

    /// Visit every committed snapshot in name order.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first visitor error.
    fn walk(&self, visitor: &mut WalkFn<'_>) -> BockResult<()>;

    /// Make the changes durable and visible.
    ///
    /// # Errors
    ///
    /// Returns [`bock_common::BockError::Transaction`] if nothing was made
    /// durable; the store is then unchanged.
    fn commit(self) -> BockResult<()>;

    /// Discard the changes.
    ///
    /// # Errors
    ///
    /// Returns [`bock_common::BockError::Transaction`] on failure.
    fn rollback(self) -> BockResult<()>;
}
