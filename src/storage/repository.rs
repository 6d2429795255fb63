//!  Core repository handle.
//!
//!  This is the central component of the storage layer. It pairs an object
//!  store with the HEAD reference and provides the operations the rest of
//!  the system uses: HEAD resolution, snapshot loading, history and the
//!  rollback engine.
//!
//! All other layers reach storage through this type.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::storage::commit::{self, CommitInfo, HistoryIterator};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::odb::{FsObjectStore, MemoryObjectStore, ObjectStore};
use crate::storage::refs::{FileHead, HeadRef, MemoryHead};
use crate::storage::tree::TreeHandle;
use crate::storage::types::{CommitId, TreeId};

/// The main repository handle.
///
/// Clone this to share across threads - it uses Arc internally. Every
/// clone sees the same objects and the same HEAD.
#[derive(Clone)]
pub struct Repository {
    inner: Arc<RepositoryInner>,
}

struct RepositoryInner {
    store: Box<dyn ObjectStore>,
    head: Box<dyn HeadRef>,
    path: Option<PathBuf>,
}

impl Repository {
    /// Assemble a repository from any object store and HEAD cell.
    pub fn from_parts(store: Box<dyn ObjectStore>, head: Box<dyn HeadRef>) -> Self {
        let path = store.base().map(Path::to_path_buf);
        Self {
            inner: Arc::new(RepositoryInner { store, head, path }),
        }
    }

    /// A repository that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::from_parts(Box::new(MemoryObjectStore::new()), Box::new(MemoryHead::new()))
    }

    /// Open an existing repository.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let store = FsObjectStore::open(path)?;
        debug!(path = %path.display(), "opened repository");
        Ok(Self::from_parts(Box::new(store), Box::new(FileHead::new(path))))
    }

    /// Initialize a new repository.
    ///
    /// HEAD stays absent until the first commit.
    pub fn init(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let store = FsObjectStore::init(path)?;
        info!(path = %path.display(), "initialized repository");
        Ok(Self::from_parts(Box::new(store), Box::new(FileHead::new(path))))
    }

    /// Open or initialize a repository.
    pub fn open_or_init(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if FsObjectStore::exists_at(path) {
            Self::open(path)
        } else {
            Self::init(path)
        }
    }

    /// Get the repository path, `None` for in-memory repositories.
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.inner.store.as_ref()
    }

    // ==================== HEAD ====================

    /// Get the current HEAD commit, `None` before the first commit.
    pub fn head(&self) -> StorageResult<Option<CommitId>> {
        self.inner.head.read()
    }

    /// Get the current HEAD commit or fail with `NoRepository`.
    pub fn require_head(&self) -> StorageResult<CommitId> {
        self.head()?.ok_or(StorageError::NoRepository)
    }

    /// Move HEAD from `expected` to `new`, failing on a lost race.
    pub fn advance_head(&self, expected: Option<CommitId>, new: CommitId) -> StorageResult<()> {
        self.inner.head.compare_and_set(expected, new)
    }

    /// Remove a HEAD lock left by a crashed writer; see [`HeadRef::clear_lock`].
    pub fn clear_head_lock(&self) -> StorageResult<bool> {
        self.inner.head.clear_lock()
    }

    // ==================== Commits & Trees ====================

    /// Get information about a commit.
    pub fn get_commit(&self, id: CommitId) -> StorageResult<CommitInfo> {
        commit::get_commit(self.store(), id)
    }

    /// Parse a commit id and check that it names a commit in the store.
    pub fn resolve_commit(&self, hex: &str) -> StorageResult<CommitId> {
        let id = CommitId::from_hex(hex.trim())
            .map_err(|_| StorageError::UnknownCommit(hex.to_string()))?;
        self.get_commit(id)?;
        Ok(id)
    }

    /// Get the snapshot a commit points at.
    pub fn tree_at(&self, commit_id: CommitId) -> StorageResult<TreeSnapshot> {
        let info = self.get_commit(commit_id)?;
        Ok(TreeSnapshot {
            commit_id,
            tree_id: info.tree_id,
        })
    }

    /// Resolve HEAD once and return its snapshot.
    pub fn head_snapshot(&self) -> StorageResult<Option<TreeSnapshot>> {
        match self.head()? {
            Some(head) => self.tree_at(head).map(Some),
            None => Ok(None),
        }
    }

    /// Load a tree for reading.
    pub fn load_tree(&self, tree_id: TreeId) -> StorageResult<TreeHandle<'_>> {
        TreeHandle::load(self.store(), tree_id)
    }

    /// Iterate history newest first.
    pub fn walk_history(&self, from: CommitId) -> HistoryIterator<'_> {
        commit::history(self.store(), from)
    }

    /// Get commit history.
    pub fn history(&self, from: CommitId, limit: Option<usize>) -> StorageResult<Vec<CommitInfo>> {
        let iter = self.walk_history(from);
        match limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }

    // ==================== Rollback ====================

    /// Move HEAD to the ancestor `depth` parent links behind `target`.
    ///
    /// `depth` is counted from `target`, not from the current HEAD. HEAD is
    /// moved with the same compare-and-set as a commit; the commits left
    /// behind stay in the store.
    pub fn reset(&self, target: CommitId, depth: usize) -> StorageResult<CommitId> {
        let expected = self.head()?;
        let ancestor = commit::nth_ancestor(self.store(), target, depth)?;
        self.advance_head(expected, ancestor)?;
        info!(
            from = %expected.map(|c| c.short()).unwrap_or_default(),
            to = %ancestor.short(),
            depth,
            "HEAD reset"
        );
        Ok(ancestor)
    }

    // ==================== Utility Operations ====================

    /// Get statistics about the repository.
    pub fn stats(&self) -> StorageResult<RepositoryStats> {
        let Some(snapshot) = self.head_snapshot()? else {
            return Ok(RepositoryStats::default());
        };
        let records = self.load_tree(snapshot.tree_id)?.count_blobs()?;
        let commits = self.walk_history(snapshot.commit_id).count();

        Ok(RepositoryStats {
            head: Some(snapshot.commit_id),
            commit_count: commits,
            record_count: records,
        })
    }

    /// Delete the on-disk repository. In-memory repositories are left as is.
    pub fn destroy(self) -> StorageResult<()> {
        if let Some(path) = self.path() {
            fs::remove_dir_all(path)?;
            info!(path = %path.display(), "removed repository");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

/// A commit and the root tree it points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeSnapshot {
    pub commit_id: CommitId,
    pub tree_id: TreeId,
}

/// Statistics about the repository.
#[derive(Debug, Clone, Default)]
pub struct RepositoryStats {
    pub head: Option<CommitId>,
    pub commit_count: usize,
    pub record_count: usize,
}

impl std::fmt::Display for RepositoryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Repository Statistics:")?;
        match self.head {
            Some(head) => writeln!(f, "  HEAD: {}", head)?,
            None => writeln!(f, "  HEAD: <none>")?,
        }
        writeln!(f, "  Commits: {}", self.commit_count)?;
        write!(f, "  Records: {}", self.record_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::commit::CommitBuilder;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    /// commit an empty tree on top of HEAD and advance HEAD
    fn commit_empty(repo: &Repository, message: &str) -> CommitId {
        let parent = repo.head().unwrap();
        let tree = repo.store().put_tree(Vec::new()).unwrap();
        let id = CommitBuilder::new(repo.store())
            .tree(tree)
            .parent(parent)
            .message(message)
            .commit()
            .unwrap();
        repo.advance_head(parent, id).unwrap();
        id
    }

    #[test]
    fn test_init_and_open() {
        let dir = TempDir::new().unwrap();

        let repo = Repository::init(dir.path()).unwrap();
        assert_eq!(repo.head().unwrap(), None);
        let c1 = commit_empty(&repo, "first");

        drop(repo);
        let repo = Repository::open(dir.path()).unwrap();
        assert_eq!(repo.head().unwrap(), Some(c1));
        assert_eq!(repo.path(), Some(dir.path()));
    }

    #[test]
    fn test_open_or_init() {
        let dir = TempDir::new().unwrap();

        // first call inits
        let repo1 = Repository::open_or_init(dir.path()).unwrap();
        let c1 = commit_empty(&repo1, "first");

        // second call opens
        drop(repo1);
        let repo2 = Repository::open_or_init(dir.path()).unwrap();
        assert_eq!(repo2.head().unwrap(), Some(c1));
    }

    #[test]
    fn test_open_missing_repository() {
        let dir = TempDir::new().unwrap();
        let result = Repository::open(dir.path().join("nope"));
        assert!(matches!(result, Err(StorageError::NotInitialized(_))));
    }

    #[test]
    fn test_require_head() {
        let repo = Repository::in_memory();
        assert!(matches!(repo.require_head(), Err(StorageError::NoRepository)));
        assert!(repo.head_snapshot().unwrap().is_none());
        assert_eq!(repo.path(), None);
    }

    #[test]
    fn test_resolve_commit() {
        let (_dir, repo) = setup();
        let c1 = commit_empty(&repo, "first");

        assert_eq!(repo.resolve_commit(&c1.to_string()).unwrap(), c1);
        assert!(matches!(
            repo.resolve_commit("not-a-real-id"),
            Err(StorageError::UnknownCommit(_))
        ));
        // well-formed but absent
        let absent = "0".repeat(64);
        assert!(matches!(repo.resolve_commit(&absent), Err(StorageError::UnknownCommit(_))));
    }

    #[test]
    fn test_history() {
        let (_dir, repo) = setup();
        commit_empty(&repo, "1");
        commit_empty(&repo, "2");
        let head = commit_empty(&repo, "3");

        let history = repo.history(head, Some(10)).unwrap();
        assert_eq!(history.len(), 3);
        // first should be most recent
        assert_eq!(history[0].id, head);
        assert_eq!(history[2].message, "1");

        assert_eq!(repo.history(head, Some(2)).unwrap().len(), 2);
    }

    #[test]
    fn test_reset_counts_from_given_commit() {
        let (_dir, repo) = setup();
        let c0 = commit_empty(&repo, "0");
        let c1 = commit_empty(&repo, "1");
        let c2 = commit_empty(&repo, "2");
        let c3 = commit_empty(&repo, "3");

        // HEAD is c3, but depth is relative to c2
        assert_eq!(repo.reset(c2, 1).unwrap(), c1);
        assert_eq!(repo.head().unwrap(), Some(c1));

        // moving forward again to an orphaned commit works
        assert_eq!(repo.reset(c3, 0).unwrap(), c3);
        assert_eq!(repo.reset(c3, 3).unwrap(), c0);

        let result = repo.reset(c1, 2);
        assert!(matches!(
            result,
            Err(StorageError::HistoryExhausted { requested: 2, available: 1, .. })
        ));
        // failed reset leaves HEAD alone
        assert_eq!(repo.head().unwrap(), Some(c0));
    }

    #[test]
    fn test_concurrent_modification_detection() {
        let (_dir, repo) = setup();
        let c1 = commit_empty(&repo, "1");
        let c2 = commit_empty(&repo, "2");

        // a writer that still believes HEAD is c1
        let result = repo.advance_head(Some(c1), c1);
        assert!(matches!(result, Err(StorageError::ConcurrentModification { .. })));
        assert_eq!(repo.head().unwrap(), Some(c2));
    }

    #[test]
    fn test_reset_loses_race_to_held_lock() {
        let (dir, repo) = setup();
        let c1 = commit_empty(&repo, "1");
        let c2 = commit_empty(&repo, "2");

        fs::write(dir.path().join(FileHead::LOCK_NAME), b"").unwrap();
        let result = repo.reset(c2, 1);
        assert!(matches!(result, Err(StorageError::ConcurrentModification { .. })));
        assert_eq!(repo.head().unwrap(), Some(c2));

        assert!(repo.clear_head_lock().unwrap());
        assert_eq!(repo.reset(c2, 1).unwrap(), c1);
    }

    /// moves HEAD to the armed commit right after the next read
    struct RacingHead {
        inner: MemoryHead,
        interloper: Arc<Mutex<Option<CommitId>>>,
    }

    impl HeadRef for RacingHead {
        fn read(&self) -> StorageResult<Option<CommitId>> {
            let current = self.inner.read()?;
            if let Some(next) = self.interloper.lock().take() {
                self.inner.compare_and_set(current, next)?;
            }
            Ok(current)
        }

        fn compare_and_set(&self, expected: Option<CommitId>, new: CommitId) -> StorageResult<()> {
            self.inner.compare_and_set(expected, new)
        }
    }

    #[test]
    fn test_reset_loses_race_when_head_moves() {
        let interloper = Arc::new(Mutex::new(None));
        let head = RacingHead {
            inner: MemoryHead::new(),
            interloper: Arc::clone(&interloper),
        };
        let repo = Repository::from_parts(Box::new(MemoryObjectStore::new()), Box::new(head));
        let c1 = commit_empty(&repo, "1");
        let c2 = commit_empty(&repo, "2");
        let c3 = commit_empty(&repo, "3");

        // another writer moves HEAD to c1 between the reset's read and its CAS
        *interloper.lock() = Some(c1);
        let result = repo.reset(c3, 1);
        assert!(matches!(result, Err(StorageError::ConcurrentModification { .. })));
        assert_eq!(repo.head().unwrap(), Some(c1));

        assert_eq!(repo.reset(c3, 1).unwrap(), c2);
    }

    #[test]
    fn test_clones_share_head() {
        let repo = Repository::in_memory();
        let other = repo.clone();
        let c1 = commit_empty(&repo, "1");
        assert_eq!(other.head().unwrap(), Some(c1));
    }

    #[test]
    fn test_stats() {
        let (_dir, repo) = setup();
        let stats = repo.stats().unwrap();
        assert_eq!(stats.head, None);
        assert_eq!(stats.commit_count, 0);

        commit_empty(&repo, "1");
        let head = commit_empty(&repo, "2");
        let stats = repo.stats().unwrap();
        assert_eq!(stats.head, Some(head));
        assert_eq!(stats.commit_count, 2);
        assert_eq!(stats.record_count, 0);
    }

    #[test]
    fn test_destroy() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("repo");
        let repo = Repository::init(&base).unwrap();
        assert!(base.exists());
        repo.destroy().unwrap();
        assert!(!base.exists());
    }
}
