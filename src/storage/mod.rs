//! storage layer for EDB
//!
//! this module provides a self-contained version-control object graph for
//! record storage. The upper layers (staging index, query engine) use this API
//! and never touch object files or the HEAD file directly.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Repository                            │
//! │       (HEAD resolution, snapshots, history, reset)          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │    tree     │       │    blob     │       │    refs     │
//!  │(directories)│       │  (records)  │       │   (HEAD)    │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!         │                     │
//!         └──────────┬──────────┘
//!                    ▼
//!  ┌─────────────┐       ┌─────────────┐
//!  │   commit    │ ────▶ │     odb     │
//!  │  (history)  │       │  (objects)  │
//!  └─────────────┘       └─────────────┘
//!  ```
//!
//! # Usage
//!
//! ```ignore
//! use edb::storage::Repository;
//!
//! // Initialize or open
//! let repo = Repository::open_or_init("./my_store")?;
//!
//! // HEAD is absent until the first commit
//! if let Some(snapshot) = repo.head_snapshot()? {
//!     let tree = repo.load_tree(snapshot.tree_id)?;
//!     println!("{:?}", tree.list_names());
//! }
//! ```

pub mod blob;
pub mod commit;
mod error;
pub mod odb;
pub mod refs;
mod repository;
pub mod tree;
mod types;

// Re-export public API
pub use commit::{CommitInfo, CommitMessage};
pub use error::{StorageError, StorageResult};
pub use odb::{FsObjectStore, MemoryObjectStore, ObjectStore};
pub use refs::{FileHead, HeadRef, MemoryHead};
pub use repository::{Repository, RepositoryStats, TreeSnapshot};
pub use tree::{EntryKind, TreeEntry, TreeHandle, TreeMutator};
pub use types::{BlobId, CommitId, InvalidIdError, ObjectId, ObjectKind, Signature, TreeId};
