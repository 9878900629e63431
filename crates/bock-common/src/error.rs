//! Common error types for Bock snapshots.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`BockError`].
pub type BockResult<T> = Result<T, BockError>;

/// Coarse classification of a [`BockError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Key or name unknown to the metadata store.
    NotFound,
    /// Key or name already in use, missing parent, or an invalid state
    /// transition.
    Conflict,
    /// A directory create, rename or remove failed.
    Io,
    /// The metadata store failed to commit or roll back.
    Transaction,
    /// Anything else.
    Other,
}

/// Common errors across Bock snapshots.
#[derive(Error, Diagnostic, Debug)]
pub enum BockError {
    /// Snapshot not found.
    #[error("Snapshot not found: {key}")]
    #[diagnostic(code(bock::snapshot::not_found))]
    SnapshotNotFound {
        /// The key or name that was not found.
        key: String,
    },

    /// Snapshot key or name already in use.
    #[error("Snapshot already exists: {key}")]
    #[diagnostic(
        code(bock::snapshot::exists),
        help("Keys of active snapshots and names of committed snapshots share one namespace")
    )]
    SnapshotExists {
        /// The key or name that is taken.
        key: String,
    },

    /// Parent snapshot not found.
    #[error("Parent snapshot not found: {parent}")]
    #[diagnostic(code(bock::snapshot::parent_not_found))]
    ParentNotFound {
        /// The parent that could not be resolved.
        parent: String,
    },

    /// The snapshot is not in a state that allows the operation.
    #[error("Invalid snapshot state for {key}: {message}")]
    #[diagnostic(code(bock::snapshot::invalid_state))]
    InvalidState {
        /// The key or name of the snapshot.
        key: String,
        /// What is wrong with it.
        message: String,
    },

    /// Filesystem operation failed on a specific path.
    #[error("Failed to {operation} {}: {source}", path.display())]
    #[diagnostic(code(bock::fs))]
    Fs {
        /// The operation that failed (e.g. "rename").
        operation: &'static str,
        /// The path involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(bock::io))]
    Io(#[from] std::io::Error),

    /// Metadata transaction failed.
    #[error("Transaction failed: {message}")]
    #[diagnostic(code(bock::transaction))]
    Transaction {
        /// The error message.
        message: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(bock::serialization))]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(bock::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// An error wrapped with the operation it interrupted.
    #[error("{operation}: {source}")]
    #[diagnostic(code(bock::snapshot::operation))]
    Context {
        /// Description of the failed operation.
        operation: String,
        /// The underlying error.
        #[source]
        source: Box<BockError>,
    },

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(bock::internal),
        help("This is a bug, please report it at https://github.com/fishmindlabs360/bock/issues")
    )]
    Internal {
        /// The error message.
        message: String,
    },
}

impl BockError {
    /// Build a closure mapping an [`std::io::Error`] to [`BockError::Fs`].
    ///
    /// Intended for `map_err` on filesystem calls.
    pub fn fs(
        operation: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Fs {
            operation,
            path,
            source,
        }
    }

    /// Wrap this error with the operation it interrupted.
    #[must_use]
    pub fn context(self, operation: impl Into<String>) -> Self {
        Self::Context {
            operation: operation.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through [`BockError::Context`].
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Self::SnapshotNotFound { .. } => ErrorKind::NotFound,
            Self::SnapshotExists { .. }
            | Self::ParentNotFound { .. }
            | Self::InvalidState { .. } => ErrorKind::Conflict,
            Self::Fs { .. } | Self::Io(_) => ErrorKind::Io,
            Self::Transaction { .. } => ErrorKind::Transaction,
            _ => ErrorKind::Other,
        }
    }

    /// Returns true if the error means the key or name is unknown.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<serde_json::Error> for BockError {
    fn from(err: serde_json::Error) -> Self {
        BockError::Serialization(err.to_string())
    }
}

/// Extension for attaching operation context to a [`BockResult`].
pub trait ResultExt<T> {
    /// Wrap the error, if any, with the operation it interrupted.
    ///
    /// # Errors
    ///
    /// Returns the wrapped error.
    fn context(self, operation: &str) -> BockResult<T>;
}

impl<T> ResultExt<T> for BockResult<T> {
    fn context(self, operation: &str) -> BockResult<T> {
        self.map_err(|e| e.context(operation))
    }
}
