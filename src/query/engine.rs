//! Read side: record queries and directory listings.
//!
//! Every call resolves HEAD exactly once and from then on reads only
//! immutable objects, so a commit landing mid-call cannot change what the
//! call returns.

use tracing::debug;

use crate::query::matcher::{parse_pattern, Matcher};
use crate::record::LogicalRecord;
use crate::storage::blob::read_record;
use crate::storage::{CommitId, Repository, StorageError, StorageResult, TreeId};

/// property name of the synthetic HEAD record
pub const HEAD_PROPERTY: &str = "HEAD";
/// property name of directory listing records
pub const NAME_PROPERTY: &str = "name";

/// Queries over one repository.
pub struct QueryEngine<'r> {
    repo: &'r Repository,
}

impl<'r> QueryEngine<'r> {
    pub fn new(repo: &'r Repository) -> Self {
        Self { repo }
    }

    /// All records in the HEAD snapshot accepted by `matcher`.
    ///
    /// With `include_head` the result starts with one `HEAD -> <commit>`
    /// record naming the snapshot that was read.
    pub fn query(&self, matcher: &dyn Matcher, include_head: bool) -> StorageResult<Vec<LogicalRecord>> {
        let snapshot = self.repo.head_snapshot()?.ok_or(StorageError::NoRepository)?;

        let mut records = Vec::new();
        if include_head {
            records.push(head_record(snapshot.commit_id));
        }
        self.collect(snapshot.tree_id, matcher, &mut records)?;

        debug!(
            head = %snapshot.commit_id.short(),
            count = records.len(),
            "query"
        );
        Ok(records)
    }

    /// `query` with a textual pattern, see [`parse_pattern`]
    pub fn query_pattern(&self, pattern: &str, include_head: bool) -> StorageResult<Vec<LogicalRecord>> {
        self.query(parse_pattern(pattern).as_ref(), include_head)
    }

    /// Records of an explicit commit instead of HEAD.
    pub fn query_at(&self, commit: CommitId, matcher: &dyn Matcher) -> StorageResult<Vec<LogicalRecord>> {
        let snapshot = self.repo.tree_at(commit)?;
        let mut records = Vec::new();
        self.collect(snapshot.tree_id, matcher, &mut records)?;
        Ok(records)
    }

    /// Immediate entries under `prefix` in the HEAD snapshot.
    ///
    /// One `name -> <entry>` record per entry, blobs and trees alike, in name
    /// order. A missing prefix, a prefix that names a record, or a store
    /// with no commits yields an empty list.
    pub fn query_nodes<S: AsRef<str>>(&self, prefix: &[S]) -> StorageResult<Vec<LogicalRecord>> {
        let Some(snapshot) = self.repo.head_snapshot()? else {
            return Ok(Vec::new());
        };
        let root = self.repo.load_tree(snapshot.tree_id)?;
        let Some(dir) = root.subtree(prefix)? else {
            return Ok(Vec::new());
        };

        Ok(dir
            .list_names()
            .into_iter()
            .map(|name| LogicalRecord::single(NAME_PROPERTY, name))
            .collect())
    }

    fn collect(
        &self,
        tree_id: TreeId,
        matcher: &dyn Matcher,
        out: &mut Vec<LogicalRecord>,
    ) -> StorageResult<()> {
        let tree = self.repo.load_tree(tree_id)?;
        let store = self.repo.store();
        tree.walk_blobs(|_path, blob| {
            let record = read_record(store, blob)?;
            if matcher.matches(&record) {
                out.push(record);
            }
            Ok(())
        })
    }
}

/// the synthetic `HEAD -> <commit>` record
pub fn head_record(commit: CommitId) -> LogicalRecord {
    LogicalRecord::single(HEAD_PROPERTY, commit.to_string())
}
