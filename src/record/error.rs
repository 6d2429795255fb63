//! Input errors for malformed records

use thiserror::Error;

/// caller supplied a record the store cannot place
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// field names and field values differ in length
    #[error("schema mismatch: {names} field name(s) but {values} value(s)")]
    SchemaMismatch { names: usize, values: usize },

    /// the same field name appears twice in one record
    #[error("duplicate field name: '{0}'")]
    DuplicateField(String),

    /// a record needs at least one value to derive a path
    #[error("empty path: a record needs at least one field value")]
    EmptyPath,

    /// a value cannot be used as a tree entry name
    #[error("invalid path segment '{segment}': {reason}")]
    InvalidSegment { segment: String, reason: &'static str },
}

pub type RecordResult<T> = Result<T, RecordError>;
