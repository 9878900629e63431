//! # bock-common
//!
//! Shared utilities and types for Bock snapshots.
//!
//! This crate provides common functionality used across all Bock crates:
//! - Snapshot identifiers and parent references
//! - The on-disk snapshot layout
//! - Common error types

#![warn(missing_docs)]

pub mod error;
pub mod id;
pub mod paths;

pub use error::{BockError, BockResult, ErrorKind, ResultExt};
pub use id::{ParentRef, SnapshotId};
pub use paths::BockPaths;
