//! Storage layer error types
//!
//! All errors that can occur while reading or writing the object graph are
//! defined here. Input errors about malformed records live in
//! [`crate::record::RecordError`].

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::types::{CommitId, ObjectId, ObjectKind};

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// no commit has ever been made, so there is nothing to read
    #[error("no repository: no commit has been made yet")]
    NoRepository,

    /// the commit id is malformed or not present in the object store
    #[error("unknown commit: {0}")]
    UnknownCommit(String),

    /// a reset walked off the start of the history
    #[error("history exhausted: {commit} has only {available} ancestor(s), {requested} requested")]
    HistoryExhausted {
        commit: CommitId,
        requested: usize,
        available: usize,
    },

    /// nothing staged and no HEAD to build on
    #[error("empty commit: nothing staged and no prior commit exists")]
    EmptyCommit,

    /// HEAD moved (or is locked) between read and compare-and-set
    #[error("concurrent modification: HEAD was {expected} but is now {actual}")]
    ConcurrentModification { expected: String, actual: String },

    /// a record path runs into an existing entry of the other kind
    #[error("path conflict at {path}: {reason}")]
    PathConflict { path: String, reason: String },

    /// the requested object is not in the store
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// an object was found but has a different kind than requested
    #[error("unexpected object kind for {id}: expected {expected}, found {found}")]
    UnexpectedObjectKind {
        id: ObjectId,
        expected: ObjectKind,
        found: ObjectKind,
    },

    /// data integrity check failed
    #[error("corrupted data at {path}: {reason}")]
    CorruptedData { path: PathBuf, reason: String },

    /// the directory does not hold a store
    #[error("repository not initialized: {0}")]
    NotInitialized(PathBuf),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// lost compare-and-set against `expected`, HEAD now at `actual`
    pub(crate) fn concurrent(expected: Option<CommitId>, actual: impl Into<String>) -> Self {
        StorageError::ConcurrentModification {
            expected: expected.map(|c| c.to_string()).unwrap_or_else(|| "<none>".to_string()),
            actual: actual.into(),
        }
    }

    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::NoRepository
                | StorageError::UnknownCommit(_)
                | StorageError::ObjectNotFound(_)
                | StorageError::NotInitialized(_)
        )
    }

    /// check if this error is a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::ConcurrentModification { .. } | StorageError::PathConflict { .. }
        )
    }

    /// check if this error is recoverable by retry
    pub fn is_retriable(&self) -> bool {
        matches!(self, StorageError::ConcurrentModification { .. })
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
