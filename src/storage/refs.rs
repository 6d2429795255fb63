//!  The HEAD reference.
//!
//!  HEAD is the only mutable piece of state in a repository: one pointer to
//!  the current commit. It is absent until the first commit and afterwards
//!  only ever moves through `compare_and_set`, so a writer that lost a race
//!  gets `ConcurrentModification` instead of overwriting someone else's work.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::CommitId;

/// A single compare-and-set cell holding the current commit.
pub trait HeadRef: Send + Sync {
    /// current HEAD, `None` before the first commit
    fn read(&self) -> StorageResult<Option<CommitId>>;

    /// Move HEAD to `new` only if it still equals `expected`.
    ///
    /// Fails immediately with `ConcurrentModification` otherwise; never
    /// retries or blocks.
    fn compare_and_set(&self, expected: Option<CommitId>, new: CommitId) -> StorageResult<()>;

    /// Drop a lock left behind by a writer that died mid-update.
    ///
    /// Returns whether a lock was removed. Only safe when no other writer
    /// is running.
    fn clear_lock(&self) -> StorageResult<bool> {
        Ok(false)
    }
}

fn describe(head: Option<CommitId>) -> String {
    head.map(|c| c.to_string()).unwrap_or_else(|| "<none>".to_string())
}

/// HEAD held in process memory
#[derive(Debug, Default)]
pub struct MemoryHead {
    cell: Mutex<Option<CommitId>>,
}

impl MemoryHead {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HeadRef for MemoryHead {
    fn read(&self) -> StorageResult<Option<CommitId>> {
        Ok(*self.cell.lock())
    }

    fn compare_and_set(&self, expected: Option<CommitId>, new: CommitId) -> StorageResult<()> {
        let mut cell = self.cell.lock();
        if *cell != expected {
            return Err(StorageError::concurrent(expected, describe(*cell)));
        }
        *cell = Some(new);
        Ok(())
    }
}

/// HEAD stored as a one-line file next to the object directory.
///
/// Updates go through `HEAD.lock`: the lock is created exclusively, HEAD is
/// re-read and compared, the new id is written into the lock file and the
/// lock file is renamed over `HEAD`. A lock file that already exists means
/// another writer is mid-update, which is reported as a lost race.
#[derive(Debug, Clone)]
pub struct FileHead {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileHead {
    pub const FILE_NAME: &'static str = "HEAD";
    /// Present only while a writer is moving HEAD. A writer that crashes
    /// mid-update leaves it behind and every later update fails with
    /// `ConcurrentModification` until [`HeadRef::clear_lock`] removes it.
    pub const LOCK_NAME: &'static str = "HEAD.lock";

    pub fn new(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            path: base.join(Self::FILE_NAME),
            lock_path: base.join(Self::LOCK_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HeadRef for FileHead {
    fn read(&self) -> StorageResult<Option<CommitId>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }
        CommitId::from_hex(content)
            .map(Some)
            .map_err(|e| StorageError::CorruptedData {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    fn compare_and_set(&self, expected: Option<CommitId>, new: CommitId) -> StorageResult<()> {
        let lock = match LockFile::acquire(&self.lock_path) {
            Ok(lock) => lock,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                warn!(lock = %self.lock_path.display(), "HEAD is locked by another writer");
                return Err(StorageError::concurrent(expected, "<locked>"));
            }
            Err(e) => return Err(e.into()),
        };

        let current = self.read()?;
        if current != expected {
            return Err(StorageError::concurrent(expected, describe(current)));
        }

        lock.commit(format!("{}\n", new).as_bytes(), &self.path)?;
        debug!(head = %new.short(), "HEAD updated");
        Ok(())
    }

    fn clear_lock(&self) -> StorageResult<bool> {
        match fs::remove_file(&self.lock_path) {
            Ok(()) => {
                warn!(lock = %self.lock_path.display(), "removed stale HEAD lock");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Exclusive lock file, removed on drop unless committed.
struct LockFile {
    file: Option<File>,
    path: PathBuf,
}

impl LockFile {
    fn acquire(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(Self {
            file: Some(file),
            path: path.to_path_buf(),
        })
    }

    /// write `content` and atomically rename the lock over `target`
    fn commit(mut self, content: &[u8], target: &Path) -> std::io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.write_all(content)?;
            file.sync_all()?;
        }
        fs::rename(&self.path, target)?;
        // renamed away: nothing left to clean up
        self.path = PathBuf::new();
        Ok(())
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        self.file.take();
        if !self.path.as_os_str().is_empty() {
            let _ = fs::remove_file(&self.path);
        }
    }
}
