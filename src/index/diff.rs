//! Commit-time diff of the staging index against a snapshot.

use std::fmt;

use tracing::debug;

use std::collections::HashMap;

use crate::index::staging::{StagedEntry, StagingIndex};
use crate::record::{PathLayout, RecordPath};
use crate::storage::blob::{read_record, record_blob_id};
use crate::storage::{BlobId, EntryKind, StorageResult, TreeHandle};

/// What happened at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            ChangeStatus::Added => 'A',
            ChangeStatus::Modified => 'M',
            ChangeStatus::Deleted => 'D',
        };
        write!(f, "{}", c)
    }
}

/// A dirty path found by the diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: RecordPath,
    pub status: ChangeStatus,
    /// blob the path will hold, `None` for deletions
    pub blob: Option<BlobId>,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.path)
    }
}

/// tally of changes by status: (added, modified, deleted)
pub fn count_changes(changes: &[Change]) -> (usize, usize, usize) {
    changes.iter().fold((0, 0, 0), |(a, m, d), c| match c.status {
        ChangeStatus::Added => (a + 1, m, d),
        ChangeStatus::Modified => (a, m + 1, d),
        ChangeStatus::Deleted => (a, m, d + 1),
    })
}

/// Compare every staged path with what `base` holds there.
///
/// Only paths whose content would change are returned. Besides the staged
/// paths, a stored record is reported deleted when a staged record with the
/// same identity is going to a different path.
pub fn diff_against(index: &StagingIndex, base: &TreeHandle<'_>) -> StorageResult<Vec<Change>> {
    let mut changes = Vec::new();

    for (path, entry) in index.entries() {
        let existing = base.entry_at(path.segments())?;
        let change = match (entry, existing) {
            (StagedEntry::Put(record), existing) => {
                let blob = record_blob_id(record)?;
                let status = match existing {
                    None => ChangeStatus::Added,
                    Some(e) if e.kind == EntryKind::Blob && e.as_blob() == Some(blob) => continue,
                    // a directory in the way is reported here and rejected when trees are rebuilt
                    Some(_) => ChangeStatus::Modified,
                };
                Change {
                    path: path.clone(),
                    status,
                    blob: Some(blob),
                }
            }
            (StagedEntry::Delete, Some(e)) if e.kind == EntryKind::Blob => Change {
                path: path.clone(),
                status: ChangeStatus::Deleted,
                blob: None,
            },
            (StagedEntry::Delete, _) => continue,
        };
        changes.push(change);
    }

    for path in superseded(index, base)? {
        changes.push(Change {
            path,
            status: ChangeStatus::Deleted,
            blob: None,
        });
    }

    debug!(staged = index.len(), dirty = changes.len(), "diffed staging index");
    Ok(changes)
}

/// Stored paths holding an identity that the index puts somewhere else.
fn superseded(index: &StagingIndex, base: &TreeHandle<'_>) -> StorageResult<Vec<RecordPath>> {
    let wanted: HashMap<&str, &RecordPath> = index
        .identities()
        .map(|(id, path)| (id.as_str(), path))
        .collect();
    if wanted.is_empty() {
        return Ok(Vec::new());
    }

    // identity is the entry name here, so only candidates need reading
    let by_name = index.resolver().layout() == PathLayout::ValuesThenIdentity;
    let store = base.store();
    let mut stale = Vec::new();
    base.walk_blobs(|path, blob| {
        if by_name && !path.last().map_or(false, |name| wanted.contains_key(name.as_str())) {
            return Ok(());
        }
        let record = read_record(store, blob)?;
        let target = record.identity().and_then(|id| wanted.get(id.as_str()));
        if let Some(target) = target {
            if target.segments() != path {
                let path = RecordPath::from_segments(path.to_vec());
                if index.get(&path).is_none() {
                    stale.push(path);
                }
            }
        }
        Ok(())
    })?;
    Ok(stale)
}
