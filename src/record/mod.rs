//! Logical records and the path resolver.
//!
//! Producers hand the store parallel lists of field names and field values.
//! The resolver turns them into a [`LogicalRecord`] (what readers get back)
//! and a [`RecordPath`] (where the record's blob lives in the tree).

mod error;
mod logical;
mod path;

pub use error::{RecordError, RecordResult};
pub use logical::{LogicalRecord, RecordId};
pub use path::{validate_segment, PathLayout, PathResolver, RecordPath};
