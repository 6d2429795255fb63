//! Store API - high-level interface for EDB.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::index::{CommitEngine, StagedEntry, StagingIndex};
use crate::query::{parse_pattern, Matcher, QueryEngine};
use crate::record::{LogicalRecord, PathLayout, PathResolver, RecordError, RecordPath};
use crate::storage::{
    CommitId, CommitInfo, CommitMessage, FsObjectStore, Repository, Signature, StorageError,
};

/// Result type for store operations.
pub type EdbResult<T> = Result<T, EdbError>;

/// Store errors.
#[derive(Debug, Error)]
pub enum EdbError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("record error: {0}")]
    Record(#[from] RecordError),

    #[error("repository not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EdbError {
    /// the requested repository, commit or object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            EdbError::Storage(e) => e.is_not_found(),
            EdbError::NotFound(_) => true,
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, EdbError::Storage(e) if e.is_conflict())
    }

    /// a lost compare-and-set; retrying from scratch may succeed
    pub fn is_retriable(&self) -> bool {
        matches!(self, EdbError::Storage(e) if e.is_retriable())
    }

    /// the caller passed a malformed record
    pub fn is_input_error(&self) -> bool {
        matches!(self, EdbError::Record(_))
    }
}

/// Where objects and HEAD are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// loose objects and a HEAD file under `path`
    #[default]
    Disk,
    /// process memory; gone when the last handle drops
    Memory,
}

/// Store configuration options.
#[derive(Debug, Clone)]
pub struct EdbConfig {
    /// Path to the repository directory.
    pub path: PathBuf,
    pub backend: Backend,
    /// Create if doesn't exist.
    pub create_if_missing: bool,
    /// How record paths are derived.
    pub layout: PathLayout,
    /// Recorded as committer on every commit.
    pub committer: Signature,
    /// Commit message subject used when none is given.
    pub default_message: String,
    /// Enable verbose logging.
    pub verbose: bool,
}

impl Default for EdbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".edb"),
            backend: Backend::Disk,
            create_if_missing: true,
            layout: PathLayout::Values,
            committer: Signature::edb(),
            default_message: CommitMessage::DEFAULT.to_string(),
            verbose: false,
        }
    }
}

impl EdbConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Configuration for a memory-only store.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory,
            ..Default::default()
        }
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn layout(mut self, layout: PathLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn committer(mut self, committer: Signature) -> Self {
        self.committer = committer;
        self
    }

    pub fn default_message(mut self, message: impl Into<String>) -> Self {
        self.default_message = message.into();
        self
    }

    /// Set verbose flag.
    pub fn verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Default log filter for this configuration; `RUST_LOG` still wins.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }

    fn validate(&self) -> EdbResult<()> {
        if self.default_message.trim().is_empty() {
            return Err(EdbError::InvalidConfig("default message must not be empty".into()));
        }
        if self.committer.name.trim().is_empty() {
            return Err(EdbError::InvalidConfig("committer name must not be empty".into()));
        }
        if self.backend == Backend::Disk && self.path.as_os_str().is_empty() {
            return Err(EdbError::InvalidConfig("repository path must not be empty".into()));
        }
        Ok(())
    }
}

/// The main store handle.
///
/// Each handle is one writer: it owns a private staging index. Several
/// handles may share one repository (see [`Edb::with_repository`]); HEAD
/// races between them surface as `ConcurrentModification`.
pub struct Edb {
    config: EdbConfig,
    repo: Repository,
    index: StagingIndex,
}

impl Edb {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> EdbResult<Self> {
        Self::open_with_config(EdbConfig::new(path.as_ref()))
    }

    /// Open or create a store with custom configuration.
    pub fn open_with_config(config: EdbConfig) -> EdbResult<Self> {
        config.validate()?;
        let repo = match config.backend {
            Backend::Memory => Repository::in_memory(),
            Backend::Disk if config.create_if_missing => Repository::open_or_init(&config.path)?,
            Backend::Disk if FsObjectStore::exists_at(&config.path) => {
                Repository::open(&config.path)?
            }
            Backend::Disk => return Err(EdbError::NotFound(config.path.clone())),
        };
        Self::with_repository(repo, config)
    }

    /// Create a new in-memory store (for testing).
    pub fn in_memory() -> EdbResult<Self> {
        Self::open_with_config(EdbConfig::in_memory())
    }

    /// Another writer on an already open repository.
    pub fn with_repository(repo: Repository, config: EdbConfig) -> EdbResult<Self> {
        config.validate()?;
        let index = StagingIndex::new(PathResolver::new(config.layout));
        debug!(
            path = ?repo.path(),
            layout = %config.layout,
            "store handle ready"
        );
        Ok(Self { config, repo, index })
    }

    // ==================== Staging ====================

    /// Stage records; the whole batch is rejected if one record is invalid.
    pub fn add(&mut self, records: impl IntoIterator<Item = LogicalRecord>) -> EdbResult<usize> {
        Ok(self.index.stage(records)?)
    }

    /// Stage the removal of the records' paths.
    pub fn remove(&mut self, records: impl IntoIterator<Item = LogicalRecord>) -> EdbResult<usize> {
        Ok(self.index.remove(records)?)
    }

    /// Drop everything staged since the last commit.
    pub fn discard(&mut self) {
        let dropped = self.index.len();
        self.index.clear();
        debug!(dropped, "discarded staged changes");
    }

    /// number of staged paths
    pub fn staged(&self) -> usize {
        self.index.len()
    }

    /// staged entries in path order
    pub fn staged_entries(&self) -> impl Iterator<Item = (&RecordPath, &StagedEntry)> {
        self.index.entries()
    }

    // ==================== Commit ====================

    /// Commit the staged records with the default message.
    pub fn commit(&mut self, author: &str, email: &str) -> EdbResult<CommitId> {
        self.commit_inner(author, email, None)
    }

    pub fn commit_with_message(&mut self, author: &str, email: &str, message: &str) -> EdbResult<CommitId> {
        self.commit_inner(author, email, Some(message))
    }

    fn commit_inner(&mut self, author: &str, email: &str, message: Option<&str>) -> EdbResult<CommitId> {
        let outcome = CommitEngine::new(&self.repo)
            .committer(self.config.committer.clone())
            .default_message(self.config.default_message.as_str())
            .commit(&mut self.index, Signature::new(author, email), message)?;
        if self.config.verbose {
            for change in &outcome.changes {
                info!(commit = %outcome.id.short(), "[change] {}", change);
            }
        }
        Ok(outcome.id)
    }

    // ==================== Reads ====================

    /// Records in the HEAD snapshot matching `pattern`.
    pub fn query(&self, pattern: &str, include_head: bool) -> EdbResult<Vec<LogicalRecord>> {
        let records = QueryEngine::new(&self.repo).query_pattern(pattern, include_head)?;
        if self.config.verbose {
            info!(pattern, include_head, count = records.len(), "[query]");
        }
        Ok(records)
    }

    /// Records in the HEAD snapshot accepted by a custom matcher.
    pub fn query_with(&self, matcher: &dyn Matcher, include_head: bool) -> EdbResult<Vec<LogicalRecord>> {
        Ok(QueryEngine::new(&self.repo).query(matcher, include_head)?)
    }

    /// Records of an older commit matching `pattern`.
    pub fn query_at(&self, commit: &str, pattern: &str) -> EdbResult<Vec<LogicalRecord>> {
        let commit = self.repo.resolve_commit(commit)?;
        let matcher = parse_pattern(pattern);
        Ok(QueryEngine::new(&self.repo).query_at(commit, matcher.as_ref())?)
    }

    /// Immediate children of `prefix` in the HEAD snapshot.
    pub fn query_nodes<S: AsRef<str>>(&self, prefix: &[S]) -> EdbResult<Vec<LogicalRecord>> {
        let nodes = QueryEngine::new(&self.repo).query_nodes(prefix)?;
        if self.config.verbose {
            let prefix: Vec<&str> = prefix.iter().map(AsRef::as_ref).collect();
            info!(prefix = %prefix.join("/"), count = nodes.len(), "[nodes]");
        }
        Ok(nodes)
    }

    pub fn head(&self) -> EdbResult<Option<CommitId>> {
        Ok(self.repo.head()?)
    }

    /// Commits reachable from HEAD, newest first.
    pub fn history(&self, limit: Option<usize>) -> EdbResult<Vec<CommitInfo>> {
        match self.repo.head()? {
            Some(head) => Ok(self.repo.history(head, limit)?),
            None => Ok(Vec::new()),
        }
    }

    // ==================== Rollback ====================

    /// Move HEAD `depth` commits behind `commit` and discard staged changes.
    ///
    /// `depth` counts parent links from `commit`, not from the current HEAD.
    pub fn reset(&mut self, commit: &str, depth: usize) -> EdbResult<CommitId> {
        let commit = self.repo.resolve_commit(commit)?;
        self.reset_to(commit, depth)
    }

    pub fn reset_to(&mut self, commit: CommitId, depth: usize) -> EdbResult<CommitId> {
        let target = self.repo.reset(commit, depth)?;
        self.index.clear();
        Ok(target)
    }

    // ==================== Utility ====================

    /// Get store statistics.
    pub fn stats(&self) -> EdbResult<EdbStats> {
        let repo = self.repo.stats()?;
        Ok(EdbStats {
            head: repo.head,
            commits: repo.commit_count,
            records: repo.record_count,
            staged: self.index.len(),
        })
    }

    /// On-disk root of the repository, `None` for memory stores.
    pub fn repository_base(&self) -> Option<&Path> {
        self.repo.path()
    }

    /// Delete the repository from disk and close this handle.
    pub fn remove_repository(self) -> EdbResult<()> {
        info!(path = ?self.repo.path(), "removing repository");
        Ok(self.repo.destroy()?)
    }

    /// Remove a HEAD lock left behind by a crashed writer.
    pub fn clear_head_lock(&self) -> EdbResult<bool> {
        Ok(self.repo.clear_head_lock()?)
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Get the configuration.
    pub fn config(&self) -> &EdbConfig {
        &self.config
    }
}

/// Store statistics.
#[derive(Debug, Clone)]
pub struct EdbStats {
    pub head: Option<CommitId>,
    /// Number of commits reachable from HEAD.
    pub commits: usize,
    /// Number of records in the HEAD snapshot.
    pub records: usize,
    /// Number of staged, uncommitted paths.
    pub staged: usize,
}

impl fmt::Display for EdbStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.head {
            Some(head) => writeln!(f, "HEAD:    {}", head)?,
            None => writeln!(f, "HEAD:    <none>")?,
        }
        writeln!(f, "commits: {}", self.commits)?;
        writeln!(f, "records: {}", self.records)?;
        write!(f, "staged:  {}", self.staged)
    }
}
