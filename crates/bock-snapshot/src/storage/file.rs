//! JSON file backed metadata store.
//!
//! The whole store is one document. Read-only transactions work on the
//! last committed state; a writable transaction holds the writer lock and
//! edits a private copy, which `commit` persists with write-to-temp, fsync
//! and rename before publishing it to new readers.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bock_common::{BockError, BockResult, ParentRef, SnapshotId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Active, MetaStore, Transaction, WalkFn};
use crate::info::{Info, Kind};

/// Persisted form of a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Record {
    id: SnapshotId,
    kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<SnapshotId>,
    #[serde(default)]
    readonly: bool,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

/// The persisted document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MetaState {
    /// Last allocated id; ids start at 1.
    #[serde(default)]
    last_id: u64,
    /// Active snapshots by key and committed snapshots by name.
    #[serde(default)]
    snapshots: BTreeMap<String, Record>,
}

impl MetaState {
    fn record(&self, key: &str) -> BockResult<&Record> {
        self.snapshots
            .get(key)
            .ok_or_else(|| BockError::SnapshotNotFound {
                key: key.to_string(),
            })
    }

    fn by_id(&self, id: SnapshotId) -> Option<(&String, &Record)> {
        self.snapshots.iter().find(|(_, r)| r.id == id)
    }

    fn parent_ids(&self, mut parent: Option<SnapshotId>) -> BockResult<Vec<SnapshotId>> {
        let mut ids = Vec::new();
        while let Some(id) = parent {
            let (_, record) = self.by_id(id).ok_or_else(|| BockError::Internal {
                message: format!("dangling parent id {id} in metadata"),
            })?;
            ids.push(id);
            parent = record.parent;
        }
        Ok(ids)
    }

    fn info(&self, name: &str, record: &Record) -> Info {
        Info {
            name: name.to_string(),
            parent: record
                .parent
                .and_then(|id| self.by_id(id))
                .map(|(name, _)| name.clone()),
            kind: record.kind,
            readonly: record.readonly,
            created: record.created,
            updated: record.updated,
        }
    }

    fn resolve_parent(&self, parent: &ParentRef) -> BockResult<SnapshotId> {
        let (name, record) = match parent {
            ParentRef::Key(key) => self
                .snapshots
                .get_key_value(key)
                .ok_or_else(|| BockError::ParentNotFound {
                    parent: key.clone(),
                })?,
            ParentRef::Id(id) => self.by_id(*id).ok_or_else(|| BockError::ParentNotFound {
                parent: parent.to_string(),
            })?,
        };
        if record.kind != Kind::Committed {
            return Err(BockError::InvalidState {
                key: name.clone(),
                message: "parent is not committed".to_string(),
            });
        }
        Ok(record.id)
    }
}

struct Inner {
    path: PathBuf,
    committed: RwLock<Arc<MetaState>>,
    writer: Arc<Mutex<()>>,
}

/// Metadata store persisted as a single JSON document.
#[derive(Clone)]
pub struct FileMetaStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FileMetaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileMetaStore")
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

impl FileMetaStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the document exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> BockResult<Self> {
        let path = path.into();

        let state = if path.exists() {
            let content = fs::read_to_string(&path).map_err(BockError::fs("read", &path))?;
            serde_json::from_str(&content).map_err(|e| BockError::Serialization(format!(
                "failed to parse {}: {e}",
                path.display()
            )))?
        } else {
            MetaState::default()
        };

        tracing::debug!(
            path = %path.display(),
            snapshots = state.snapshots.len(),
            "Opened metadata store"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                path,
                committed: RwLock::new(Arc::new(state)),
                writer: Arc::new(Mutex::new(())),
            }),
        })
    }
}

#[async_trait]
impl MetaStore for FileMetaStore {
    type Tx = FileTransaction;

    async fn begin(&self, writable: bool) -> BockResult<FileTransaction> {
        if !writable {
            let base = self.inner.committed.read().clone();
            return Ok(FileTransaction {
                inner: Arc::clone(&self.inner),
                base,
                working: None,
                _writer: None,
            });
        }

        let guard = Arc::clone(&self.inner.writer).lock_owned().await;
        // Read the committed state only once the writer lock is held.
        let base = self.inner.committed.read().clone();
        let working = MetaState::clone(&base);
        Ok(FileTransaction {
            inner: Arc::clone(&self.inner),
            base,
            working: Some(working),
            _writer: Some(guard),
        })
    }
}

/// Transaction on a [`FileMetaStore`].
pub struct FileTransaction {
    inner: Arc<Inner>,
    base: Arc<MetaState>,
    working: Option<MetaState>,
    _writer: Option<OwnedMutexGuard<()>>,
}

impl std::fmt::Debug for FileTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTransaction")
            .field("writable", &self.working.is_some())
            .finish_non_exhaustive()
    }
}

impl FileTransaction {
    fn state(&self) -> &MetaState {
        self.working.as_ref().unwrap_or(&self.base)
    }

    fn state_mut(&mut self) -> BockResult<&mut MetaState> {
        self.working.as_mut().ok_or_else(|| BockError::Transaction {
            message: "transaction is read-only".to_string(),
        })
    }
}

impl Transaction for FileTransaction {
    fn stat(&self, key: &str) -> BockResult<Info> {
        let state = self.state();
        let record = state.record(key)?;
        Ok(state.info(key, record))
    }

    fn id(&self, key: &str) -> BockResult<SnapshotId> {
        self.state().record(key).map(|r| r.id)
    }

    fn get_active(&self, key: &str) -> BockResult<Active> {
        let state = self.state();
        let record = state.record(key)?;
        if record.kind != Kind::Active {
            return Err(BockError::SnapshotNotFound {
                key: key.to_string(),
            });
        }
        Ok(Active {
            id: record.id,
            parent_ids: state.parent_ids(record.parent)?,
            readonly: record.readonly,
        })
    }

    fn create_active(
        &mut self,
        key: &str,
        parent: Option<&ParentRef>,
        readonly: bool,
    ) -> BockResult<Active> {
        let state = self.state_mut()?;

        if state.snapshots.contains_key(key) {
            return Err(BockError::SnapshotExists {
                key: key.to_string(),
            });
        }

        let parent = parent.map(|p| state.resolve_parent(p)).transpose()?;
        let parent_ids = state.parent_ids(parent)?;

        let id = SnapshotId::new(state.last_id).next();
        state.last_id = id.get();

        let now = Utc::now();
        state.snapshots.insert(
            key.to_string(),
            Record {
                id,
                kind: Kind::Active,
                parent,
                readonly,
                created: now,
                updated: now,
            },
        );

        Ok(Active {
            id,
            parent_ids,
            readonly,
        })
    }

    fn commit_active(&mut self, key: &str, name: &str) -> BockResult<SnapshotId> {
        let state = self.state_mut()?;

        let record = state.record(key)?;
        if record.kind != Kind::Active {
            return Err(BockError::InvalidState {
                key: key.to_string(),
                message: "snapshot is not active".to_string(),
            });
        }
        if record.readonly {
            return Err(BockError::InvalidState {
                key: key.to_string(),
                message: "cannot commit a read-only view".to_string(),
            });
        }
        if name != key && state.snapshots.contains_key(name) {
            return Err(BockError::SnapshotExists {
                key: name.to_string(),
            });
        }

        let Some(mut record) = state.snapshots.remove(key) else {
            return Err(BockError::SnapshotNotFound {
                key: key.to_string(),
            });
        };
        record.kind = Kind::Committed;
        record.updated = Utc::now();
        let id = record.id;
        state.snapshots.insert(name.to_string(), record);

        Ok(id)
    }

    fn remove(&mut self, key: &str) -> BockResult<(SnapshotId, Kind)> {
        let state = self.state_mut()?;

        let record = state.record(key)?;
        let id = record.id;
        if state.snapshots.values().any(|r| r.parent == Some(id)) {
            return Err(BockError::InvalidState {
                key: key.to_string(),
                message: "snapshot has children".to_string(),
            });
        }

        let kind = state
            .snapshots
            .remove(key)
            .map_or(Kind::Active, |r| r.kind);
        Ok((id, kind))
    }

    fn walk(&self, visitor: &mut WalkFn<'_>) -> BockResult<()> {
        let state = self.state();
        for (name, record) in &state.snapshots {
            if record.kind == Kind::Committed {
                visitor(&state.info(name, record))?;
            }
        }
        Ok(())
    }

    fn commit(mut self) -> BockResult<()> {
        let Some(working) = self.working.take() else {
            return Err(BockError::Transaction {
                message: "cannot commit a read-only transaction".to_string(),
            });
        };

        persist(&self.inner.path, &working).map_err(|e| BockError::Transaction {
            message: format!("failed to persist metadata: {e}"),
        })?;

        *self.inner.committed.write() = Arc::new(working);
        Ok(())
    }

    fn rollback(self) -> BockResult<()> {
        Ok(())
    }
}

/// Write `state` to `path` atomically.
///
/// The temporary file is removed if any step before the rename fails.
fn persist(path: &Path, state: &MetaState) -> BockResult<()> {
    let tmp_path = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(state)?;

    let written = write_synced(&tmp_path, &data).and_then(|()| {
        fs::rename(&tmp_path, path).map_err(BockError::fs("rename", &tmp_path))
    });
    if let Err(err) = written {
        if let Err(e) = fs::remove_file(&tmp_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %tmp_path.display(),
                    error = %e,
                    "Failed to remove temporary metadata"
                );
            }
        }
        return Err(err);
    }

    // The rename is only durable once the directory entry is synced.
    #[cfg(unix)]
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        File::open(dir)
            .and_then(|d| d.sync_all())
            .map_err(BockError::fs("sync", dir))?;
    }

    Ok(())
}

fn write_synced(path: &Path, data: &[u8]) -> BockResult<()> {
    let mut file = File::create(path).map_err(BockError::fs("create", path))?;
    file.write_all(data).map_err(BockError::fs("write", path))?;
    file.sync_all().map_err(BockError::fs("sync", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, FileMetaStore) {
        let temp = tempdir().unwrap();
        let store = FileMetaStore::open(temp.path().join("metadata.json")).unwrap();
        (temp, store)
    }

    fn parent(key: &str) -> ParentRef {
        ParentRef::Key(key.to_string())
    }

    #[tokio::test]
    async fn ids_are_allocated_in_order() {
        let (_temp, store) = store();
        let mut tx = store.begin(true).await.unwrap();
        let a = tx.create_active("a", None, false).unwrap();
        let b = tx.create_active("b", None, true).unwrap();
        tx.commit().unwrap();

        assert_eq!(a.id, SnapshotId::new(1));
        assert_eq!(b.id, SnapshotId::new(2));
        assert!(b.readonly);
    }

    #[tokio::test]
    async fn parent_chain_is_nearest_first() {
        let (_temp, store) = store();
        let mut tx = store.begin(true).await.unwrap();
        tx.create_active("base-key", None, false).unwrap();
        tx.commit_active("base-key", "base").unwrap();
        tx.create_active("mid-key", Some(&parent("base")), false).unwrap();
        tx.commit_active("mid-key", "mid").unwrap();
        let top = tx.create_active("top", Some(&parent("mid")), false).unwrap();
        tx.commit().unwrap();

        assert_eq!(top.parent_ids, vec![SnapshotId::new(2), SnapshotId::new(1)]);

        let tx = store.begin(false).await.unwrap();
        assert_eq!(tx.get_active("top").unwrap(), top);
        assert_eq!(tx.stat("top").unwrap().parent.as_deref(), Some("mid"));
    }

    #[tokio::test]
    async fn resolved_parent_id() {
        let (_temp, store) = store();
        let mut tx = store.begin(true).await.unwrap();
        let base = tx.create_active("k", None, false).unwrap();
        tx.commit_active("k", "base").unwrap();
        let child = tx
            .create_active("child", Some(&ParentRef::Id(base.id)), true)
            .unwrap();
        assert_eq!(child.parent_ids, vec![base.id]);
    }

    #[tokio::test]
    async fn create_conflicts() {
        let (_temp, store) = store();
        let mut tx = store.begin(true).await.unwrap();
        tx.create_active("a", None, false).unwrap();

        assert!(matches!(
            tx.create_active("a", None, false),
            Err(BockError::SnapshotExists { .. })
        ));
        assert!(matches!(
            tx.create_active("b", Some(&parent("missing")), false),
            Err(BockError::ParentNotFound { .. })
        ));
        assert!(matches!(
            tx.create_active("b", Some(&parent("a")), false),
            Err(BockError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn commit_keeps_id_and_frees_key() {
        let (_temp, store) = store();
        let mut tx = store.begin(true).await.unwrap();
        let active = tx.create_active("work", None, false).unwrap();
        let id = tx.commit_active("work", "layer").unwrap();
        tx.commit().unwrap();

        assert_eq!(id, active.id);
        let tx = store.begin(false).await.unwrap();
        assert_eq!(tx.stat("layer").unwrap().kind, Kind::Committed);
        assert!(tx.stat("work").unwrap_err().is_not_found());
        assert!(tx.get_active("layer").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn views_cannot_be_committed() {
        let (_temp, store) = store();
        let mut tx = store.begin(true).await.unwrap();
        tx.create_active("view", None, true).unwrap();
        assert!(matches!(
            tx.commit_active("view", "layer"),
            Err(BockError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn remove_refuses_parents_with_children() {
        let (_temp, store) = store();
        let mut tx = store.begin(true).await.unwrap();
        tx.create_active("k", None, false).unwrap();
        tx.commit_active("k", "base").unwrap();
        tx.create_active("child", Some(&parent("base")), false).unwrap();

        assert!(matches!(
            tx.remove("base"),
            Err(BockError::InvalidState { .. })
        ));
        assert_eq!(tx.remove("child").unwrap(), (SnapshotId::new(2), Kind::Active));
        assert_eq!(tx.remove("base").unwrap(), (SnapshotId::new(1), Kind::Committed));
    }

    #[tokio::test]
    async fn dropped_transaction_discards_changes() {
        let (_temp, store) = store();
        {
            let mut tx = store.begin(true).await.unwrap();
            tx.create_active("a", None, false).unwrap();
        }
        let tx = store.begin(false).await.unwrap();
        assert!(tx.stat("a").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn read_only_transactions_reject_mutation() {
        let (_temp, store) = store();
        let mut tx = store.begin(false).await.unwrap();
        assert!(matches!(
            tx.create_active("a", None, false),
            Err(BockError::Transaction { .. })
        ));
        assert!(tx.commit().is_err());
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let (temp, store) = store();
        let mut tx = store.begin(true).await.unwrap();
        tx.create_active("a", None, false).unwrap();
        tx.commit_active("a", "layer").unwrap();
        tx.commit().unwrap();
        drop(store);

        let store = FileMetaStore::open(temp.path().join("metadata.json")).unwrap();
        let mut tx = store.begin(true).await.unwrap();
        assert_eq!(tx.stat("layer").unwrap().kind, Kind::Committed);
        // Ids keep increasing across restarts.
        let next = tx.create_active("b", None, false).unwrap();
        assert_eq!(next.id, SnapshotId::new(2));
    }

    #[tokio::test]
    async fn walk_visits_committed_in_name_order() {
        let (_temp, store) = store();
        let mut tx = store.begin(true).await.unwrap();
        for (key, name) in [("k1", "zeta"), ("k2", "alpha")] {
            tx.create_active(key, None, false).unwrap();
            tx.commit_active(key, name).unwrap();
        }
        tx.create_active("active", None, false).unwrap();
        tx.commit().unwrap();

        let tx = store.begin(false).await.unwrap();
        let mut names = Vec::new();
        tx.walk(&mut |info: &Info| {
            names.push(info.name.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn persist_leaves_no_temporary_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("metadata.json");
        persist(&path, &MetaState::default()).unwrap();

        assert!(path.is_file());
        assert!(!temp.path().join("metadata.json.tmp").exists());
    }

    #[test]
    fn failed_persist_removes_temporary_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("metadata.json");
        // A directory in the way makes the rename fail.
        fs::create_dir(&path).unwrap();

        let err = persist(&path, &MetaState::default()).unwrap_err();
        assert!(matches!(err, BockError::Fs { operation: "rename", .. }));
        assert!(!temp.path().join("metadata.json.tmp").exists());
        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn failed_persist_keeps_previous_state() {
        let (temp, store) = store();
        let mut tx = store.begin(true).await.unwrap();
        tx.create_active("a", None, false).unwrap();
        tx.commit().unwrap();

        // Replace the document with a directory so the next rename fails.
        let path = temp.path().join("metadata.json");
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        let mut tx = store.begin(true).await.unwrap();
        tx.create_active("b", None, false).unwrap();
        assert!(matches!(tx.commit(), Err(BockError::Transaction { .. })));

        let tx = store.begin(false).await.unwrap();
        assert_eq!(tx.stat("a").unwrap().kind, Kind::Active);
        assert!(tx.stat("b").unwrap_err().is_not_found());
    }
}
