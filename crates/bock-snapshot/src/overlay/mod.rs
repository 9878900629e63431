//! Overlay filesystem snapshotter.
//!
//! Snapshots live in `snapshots/<id>` where the id comes from the metadata
//! store. Directories are named by id rather than by key or name, so
//! committing a snapshot never moves data.

mod guard;
mod mounts;
mod snapshotter;

pub use mounts::mounts;
pub use snapshotter::OverlaySnapshotter;
