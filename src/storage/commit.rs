//!  Commit creation and history traversal
//!
//!  a commit is an immutable snapshot node: one root tree, at most one
//!  parent, who made it, when, and why. Commits form a singly-linked chain
//!  back to the first commit; HEAD points at one of them.
//!
//! this module handles commit encoding, creation, and history walking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::odb::ObjectStore;
use crate::storage::types::{CommitId, Signature, TreeId};

/// the stored form of a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitObject {
    pub tree: TreeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<CommitId>,
    pub author: Signature,
    pub committer: Signature,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// makes every commit a distinct object even with equal fields
    nonce: String,
}

impl CommitObject {
    pub fn new(
        tree: TreeId,
        parent: Option<CommitId>,
        author: Signature,
        committer: Signature,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            tree,
            parent,
            author,
            committer,
            timestamp,
            message: message.into(),
            nonce: ulid::Ulid::new().to_string(),
        }
    }

    pub(crate) fn encode(&self) -> StorageResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub(crate) fn decode(bytes: &[u8]) -> StorageResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// information about a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub id: CommitId,
    pub tree_id: TreeId,
    pub parent_id: Option<CommitId>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub committer: Signature,
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    pub(crate) fn from_object(id: CommitId, commit: CommitObject) -> Self {
        Self {
            id,
            tree_id: commit.tree,
            parent_id: commit.parent,
            message: commit.message,
            author_name: commit.author.name,
            author_email: commit.author.email,
            committer: commit.committer,
            timestamp: commit.timestamp,
        }
    }

    /// check if this is the first commit of the history
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// get a short summary of the commit (first line of message)
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }
}

/// builder for creating commits with a fluent interface
pub struct CommitBuilder<'a> {
    store: &'a dyn ObjectStore,
    tree_id: Option<TreeId>,
    parent: Option<CommitId>,
    message: String,
    author: Signature,
    committer: Signature,
    timestamp: Option<DateTime<Utc>>,
}

impl<'a> CommitBuilder<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self {
            store,
            tree_id: None,
            parent: None,
            message: String::new(),
            author: Signature::edb(),
            committer: Signature::edb(),
            timestamp: None,
        }
    }

    /// set the tree for this commit
    pub fn tree(mut self, tree_id: TreeId) -> Self {
        self.tree_id = Some(tree_id);
        self
    }

    /// set the parent commit, `None` for the first commit
    pub fn parent(mut self, parent: Option<CommitId>) -> Self {
        self.parent = parent;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn author(mut self, author: Signature) -> Self {
        self.author = author;
        self
    }

    pub fn committer(mut self, committer: Signature) -> Self {
        self.committer = committer;
        self
    }

    /// override the commit time (defaults to now)
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// write the commit object and return its ID
    ///
    /// this does not move HEAD; see `Repository::advance_head`
    pub fn commit(self) -> StorageResult<CommitId> {
        let tree_id = self.tree_id.ok_or_else(|| StorageError::CorruptedData {
            path: "commit".into(),
            reason: "commit requires a tree".to_string(),
        })?;

        let commit = CommitObject::new(
            tree_id,
            self.parent,
            self.author,
            self.committer,
            self.message,
            self.timestamp.unwrap_or_else(Utc::now),
        );
        self.store.put_commit(&commit)
    }
}

/// Load a commit, mapping "missing" or "not a commit" to `UnknownCommit`.
pub fn get_commit(store: &dyn ObjectStore, id: CommitId) -> StorageResult<CommitInfo> {
    let commit = store.get_commit(id).map_err(|e| match e {
        StorageError::ObjectNotFound(_) | StorageError::UnexpectedObjectKind { .. } => {
            StorageError::UnknownCommit(id.to_string())
        }
        other => other,
    })?;
    Ok(CommitInfo::from_object(id, commit))
}

/// Walk exactly `depth` parent links back from `start`.
///
/// `depth == 0` returns `start` itself once it is known to be a commit.
pub fn nth_ancestor(store: &dyn ObjectStore, start: CommitId, depth: usize) -> StorageResult<CommitId> {
    let mut current = get_commit(store, start)?;
    for step in 0..depth {
        let parent = current.parent_id.ok_or(StorageError::HistoryExhausted {
            commit: start,
            requested: depth,
            available: step,
        })?;
        current = get_commit(store, parent)?;
    }
    Ok(current.id)
}

/// iterate over commit history, newest first, following parent links
pub struct HistoryIterator<'s> {
    store: &'s dyn ObjectStore,
    next: Option<CommitId>,
}

impl<'s> HistoryIterator<'s> {
    pub fn new(store: &'s dyn ObjectStore, start: CommitId) -> Self {
        Self {
            store,
            next: Some(start),
        }
    }
}

impl Iterator for HistoryIterator<'_> {
    type Item = StorageResult<CommitInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next.take()?;
        match get_commit(self.store, id) {
            Ok(info) => {
                self.next = info.parent_id;
                Some(Ok(info))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// get history for a commit
pub fn history(store: &dyn ObjectStore, start: CommitId) -> HistoryIterator<'_> {
    HistoryIterator::new(store, start)
}

/// message formatting for store operations
pub struct CommitMessage;

impl CommitMessage {
    /// subject used when the caller gives no message
    pub const DEFAULT: &'static str = "commit via EDB-API";

    /// subject plus a trailer line counting the changes
    pub fn with_changes(subject: &str, added: usize, modified: usize, deleted: usize) -> String {
        format!(
            "{}\n\n[edb] {} added, {} modified, {} deleted",
            subject, added, modified, deleted
        )
    }
}
