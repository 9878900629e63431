//! # Bock Snapshots
//!
//! Snapshot management for container filesystem layers.
//!
//! A snapshot is either *active*, a working copy addressed by a key that a
//! container writes into (or a read-only *view*), or *committed*, an
//! immutable layer addressed by a name that new snapshots can stack on.
//! The snapshotter tracks them in a transactional metadata store, keeps
//! their content under `snapshots/<id>`, and hands back the overlay or
//! bind mounts that compose a root filesystem.
//!
//! ## Usage
//!
//! ```no_run
//! use bock_snapshot::{OverlaySnapshotter, Snapshotter, SnapshotterConfig};
//!
//! # async fn example() -> bock_common::BockResult<()> {
//! let config = SnapshotterConfig::default().with_root("/var/lib/bock/snapshot/overlay");
//! let snapshotter = OverlaySnapshotter::open(&config)?;
//!
//! // Unpack a base layer and commit it.
//! snapshotter.prepare("extract-base", "").await?;
//! snapshotter.commit("base", "extract-base").await?;
//!
//! // Writable root filesystem for a container.
//! let mounts = snapshotter.prepare("container-1", "base").await?;
//! # let _ = mounts;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod info;
pub mod mount;
pub mod overlay;
pub mod snapshotter;
pub mod storage;
pub mod sweep;

pub use config::SnapshotterConfig;
pub use info::{Info, Kind, Usage};
pub use mount::Mount;
pub use overlay::OverlaySnapshotter;
pub use snapshotter::Snapshotter;
pub use storage::{FileMetaStore, MetaStore, Transaction};
pub use sweep::sweep_orphans;
