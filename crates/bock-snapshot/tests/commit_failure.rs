//! Metadata commit failures must leave records and directories consistent.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bock_common::{BockError, BockPaths, BockResult, ErrorKind, ParentRef, SnapshotId};
use bock_snapshot::storage::{Active, FileTransaction, WalkFn};
use bock_snapshot::{
    FileMetaStore, Info, Kind, MetaStore, OverlaySnapshotter, Snapshotter, Transaction,
};
use tempfile::TempDir;

/// Wraps a [`FileMetaStore`] and fails writable commits while armed.
struct FlakyStore {
    inner: FileMetaStore,
    fail_commit: Arc<AtomicBool>,
}

struct FlakyTx {
    inner: FileTransaction,
    fail_commit: bool,
}

#[async_trait]
impl MetaStore for FlakyStore {
    type Tx = FlakyTx;

    async fn begin(&self, writable: bool) -> BockResult<FlakyTx> {
        Ok(FlakyTx {
            inner: self.inner.begin(writable).await?,
            fail_commit: self.fail_commit.load(Ordering::SeqCst),
        })
    }
}

impl Transaction for FlakyTx {
    fn stat(&self, key: &str) -> BockResult<Info> {
        self.inner.stat(key)
    }

    fn id(&self, key: &str) -> BockResult<SnapshotId> {
        self.inner.id(key)
    }

    fn get_active(&self, key: &str) -> BockResult<Active> {
        self.inner.get_active(key)
    }

    fn create_active(
        &mut self,
        key: &str,
        parent: Option<&ParentRef>,
        readonly: bool,
    ) -> BockResult<Active> {
        self.inner.create_active(key, parent, readonly)
    }

    fn commit_active(&mut self, key: &str, name: &str) -> BockResult<SnapshotId> {
        self.inner.commit_active(key, name)
    }

    fn remove(&mut self, key: &str) -> BockResult<(SnapshotId, Kind)> {
        self.inner.remove(key)
    }

    fn walk(&self, visitor: &mut WalkFn<'_>) -> BockResult<()> {
        self.inner.walk(visitor)
    }

    fn commit(self) -> BockResult<()> {
        if self.fail_commit {
            self.inner.rollback()?;
            return Err(BockError::Transaction {
                message: "injected commit failure".to_string(),
            });
        }
        self.inner.commit()
    }

    fn rollback(self) -> BockResult<()> {
        self.inner.rollback()
    }
}

fn setup() -> (TempDir, Arc<AtomicBool>, OverlaySnapshotter<FlakyStore>) {
    let temp = TempDir::new().unwrap();
    let paths = BockPaths::with_root(temp.path().join("overlay"));
    paths.create_dirs().unwrap();
    let fail_commit = Arc::new(AtomicBool::new(false));
    let store = FlakyStore {
        inner: FileMetaStore::open(paths.metadata()).unwrap(),
        fail_commit: Arc::clone(&fail_commit),
    };
    let snapshotter = OverlaySnapshotter::new(paths, store).unwrap();
    (temp, fail_commit, snapshotter)
}

fn entries(paths: &BockPaths) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(paths.snapshots())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test_log::test(tokio::test)]
async fn remove_restores_directory_when_commit_fails() {
    let (_temp, fail_commit, s) = setup();
    let mounts = s.prepare("keep", "").await.unwrap();
    let before = entries(s.paths());

    fail_commit.store(true, Ordering::SeqCst);
    let err = s.remove("keep").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transaction);

    // The directory is back under its canonical name and still active.
    assert_eq!(entries(s.paths()), before);
    assert_eq!(s.stat("keep").await.unwrap().kind, Kind::Active);
    assert_eq!(s.mounts("keep").await.unwrap(), mounts);

    fail_commit.store(false, Ordering::SeqCst);
    s.remove("keep").await.unwrap();
    assert!(entries(s.paths()).is_empty());
}

#[test_log::test(tokio::test)]
async fn prepare_removes_directory_when_commit_fails() {
    let (_temp, fail_commit, s) = setup();

    fail_commit.store(true, Ordering::SeqCst);
    let err = s.prepare("lost", "").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transaction);

    assert!(entries(s.paths()).is_empty());
    assert!(s.stat("lost").await.unwrap_err().is_not_found());
}

#[test_log::test(tokio::test)]
async fn commit_failure_keeps_snapshot_active() {
    let (_temp, fail_commit, s) = setup();
    s.prepare("work", "").await.unwrap();

    fail_commit.store(true, Ordering::SeqCst);
    assert!(s.commit("layer", "work").await.is_err());
    fail_commit.store(false, Ordering::SeqCst);

    assert_eq!(s.stat("work").await.unwrap().kind, Kind::Active);
    assert!(s.stat("layer").await.unwrap_err().is_not_found());
    assert_eq!(entries(s.paths()).len(), 1);
}
