//! The commit engine.
//!
//! Turns a staging index into a new commit on top of HEAD:
//!
//! 1. read HEAD once; that value is what the final compare-and-set expects
//! 2. diff the index against HEAD's tree
//! 3. write blobs for dirty paths and rebuild only the trees along them
//! 4. write the commit and move HEAD from the expected value to it
//!
//! Anything written before a failed compare-and-set is simply unreachable.

use tracing::{debug, info};

use crate::index::diff::{count_changes, diff_against, Change, ChangeStatus};
use crate::index::staging::StagingIndex;
use crate::storage::blob::write_record;
use crate::storage::commit::CommitBuilder;
use crate::storage::{
    CommitId, CommitMessage, Repository, Signature, StorageError, StorageResult, TreeHandle,
    TreeMutator,
};

/// The result of a successful commit.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub id: CommitId,
    pub parent: Option<CommitId>,
    pub changes: Vec<Change>,
}

/// Builds commits against one repository.
pub struct CommitEngine<'r> {
    repo: &'r Repository,
    committer: Signature,
    default_message: String,
}

impl<'r> CommitEngine<'r> {
    pub fn new(repo: &'r Repository) -> Self {
        Self {
            repo,
            committer: Signature::edb(),
            default_message: CommitMessage::DEFAULT.to_string(),
        }
    }

    pub fn committer(mut self, committer: Signature) -> Self {
        self.committer = committer;
        self
    }

    pub fn default_message(mut self, message: impl Into<String>) -> Self {
        self.default_message = message.into();
        self
    }

    /// Commit everything staged in `index`.
    ///
    /// Fails with `EmptyCommit` when there is no HEAD and nothing to write.
    /// With a HEAD and nothing dirty, the new commit reuses HEAD's tree. The
    /// index is cleared only on success.
    pub fn commit(
        &self,
        index: &mut StagingIndex,
        author: Signature,
        message: Option<&str>,
    ) -> StorageResult<CommitOutcome> {
        let store = self.repo.store();
        let expected = self.repo.head()?;

        let base_tree = match expected {
            Some(head) => Some(self.repo.tree_at(head)?.tree_id),
            None => None,
        };
        let base = match base_tree {
            Some(id) => TreeHandle::load(store, id)?,
            None => TreeHandle::empty(store),
        };

        let changes = diff_against(index, &base)?;
        if expected.is_none() && changes.is_empty() {
            return Err(StorageError::EmptyCommit);
        }

        let tree_id = match base_tree {
            Some(id) if changes.is_empty() => id,
            _ => {
                let mut mutator = TreeMutator::new(store, base_tree);
                for change in &changes {
                    let segments = change.path.segments();
                    match change.status {
                        ChangeStatus::Deleted => mutator.remove(segments),
                        ChangeStatus::Added | ChangeStatus::Modified => {
                            let record = index.get(&change.path).and_then(|e| e.record());
                            if let Some(record) = record {
                                let blob = write_record(store, record)?;
                                mutator.upsert(segments, blob);
                            }
                        }
                    }
                }
                mutator.write()?
            }
        };

        let message = match message {
            Some(message) => message.to_string(),
            None => {
                let (added, modified, deleted) = count_changes(&changes);
                CommitMessage::with_changes(&self.default_message, added, modified, deleted)
            }
        };

        let id = CommitBuilder::new(store)
            .tree(tree_id)
            .parent(expected)
            .author(author)
            .committer(self.committer.clone())
            .message(message)
            .commit()?;
        debug!(commit = %id.short(), tree = %tree_id.short(), "wrote commit");

        self.repo.advance_head(expected, id)?;
        index.clear();

        info!(commit = %id.short(), changes = changes.len(), "committed");
        Ok(CommitOutcome {
            id,
            parent: expected,
            changes,
        })
    }
}
