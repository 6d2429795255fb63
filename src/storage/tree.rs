//! tree objects and tree manipulation.
//!
//! a tree is a directory: a name-sorted list of entries, each pointing at a
//! blob (one stored record) or at a nested tree. Trees are immutable; a
//! change to one record produces new trees only along that record's path,
//! every sibling is carried over by id.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::odb::ObjectStore;
use crate::storage::types::{BlobId, ObjectId, TreeId};

/// what a tree entry points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
}

/// one named entry of a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub kind: EntryKind,
    pub id: ObjectId,
}

impl TreeEntry {
    pub fn blob(name: impl Into<String>, id: BlobId) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Blob,
            id: id.raw(),
        }
    }

    pub fn tree(name: impl Into<String>, id: TreeId) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Tree,
            id: id.raw(),
        }
    }

    pub fn as_blob(&self) -> Option<BlobId> {
        match self.kind {
            EntryKind::Blob => Some(BlobId::new(self.id)),
            EntryKind::Tree => None,
        }
    }

    pub fn as_tree(&self) -> Option<TreeId> {
        match self.kind {
            EntryKind::Tree => Some(TreeId::new(self.id)),
            EntryKind::Blob => None,
        }
    }
}

/// An immutable directory object.
///
/// Entries are kept sorted by name and names are unique, which makes the
/// encoding canonical: equal entry sets always hash to the same id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// build a tree; a later entry with a duplicate name replaces the earlier one
    pub fn new(entries: Vec<TreeEntry>) -> Self {
        let by_name: BTreeMap<String, TreeEntry> =
            entries.into_iter().map(|e| (e.name.clone(), e)).collect();
        Self {
            entries: by_name.into_values().collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<TreeEntry> {
        self.entries
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn encode(&self) -> StorageResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.entries)?)
    }

    pub(crate) fn decode(bytes: &[u8]) -> StorageResult<Self> {
        let entries: Vec<TreeEntry> = serde_json::from_slice(bytes)?;
        Ok(Self::new(entries))
    }
}

/// A read-only view of a tree at some commit.
///
/// think of it as a snapshot: the objects behind it never change, so it
/// stays valid no matter how many commits land after it was loaded.
pub struct TreeHandle<'s> {
    store: &'s dyn ObjectStore,
    id: Option<TreeId>,
    tree: Tree,
}

impl<'s> TreeHandle<'s> {
    /// load a tree from the store
    pub fn load(store: &'s dyn ObjectStore, id: TreeId) -> StorageResult<Self> {
        let tree = store.get_tree(id)?;
        Ok(Self {
            store,
            id: Some(id),
            tree,
        })
    }

    /// the empty tree that stands in for "no HEAD yet"
    pub fn empty(store: &'s dyn ObjectStore) -> Self {
        Self {
            store,
            id: None,
            tree: Tree::empty(),
        }
    }

    pub fn store(&self) -> &'s dyn ObjectStore {
        self.store
    }

    /// tree id, `None` for the unsaved empty tree
    pub fn id(&self) -> Option<TreeId> {
        self.id
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// immediate entry names, in name order
    pub fn list_names(&self) -> Vec<String> {
        self.tree.entries().iter().map(|e| e.name.clone()).collect()
    }

    /// follow `path` and return the entry it names
    pub fn entry_at<S: AsRef<str>>(&self, path: &[S]) -> StorageResult<Option<TreeEntry>> {
        let Some((last, parents)) = path.split_last() else {
            return Ok(None);
        };
        match self.subtree(parents)? {
            Some(dir) => Ok(dir.tree.get(last.as_ref()).cloned()),
            None => Ok(None),
        }
    }

    /// the blob stored at `path`, if there is one
    pub fn blob_id_at<S: AsRef<str>>(&self, path: &[S]) -> StorageResult<Option<BlobId>> {
        Ok(self.entry_at(path)?.and_then(|e| e.as_blob()))
    }

    /// Descend along `prefix`.
    ///
    /// Returns `None` when a segment is missing or names a blob.
    pub fn subtree<S: AsRef<str>>(&self, prefix: &[S]) -> StorageResult<Option<TreeHandle<'s>>> {
        let mut current = TreeHandle {
            store: self.store,
            id: self.id,
            tree: self.tree.clone(),
        };
        for segment in prefix {
            let next = match current.tree.get(segment.as_ref()).and_then(|e| e.as_tree()) {
                Some(id) => id,
                None => return Ok(None),
            };
            current = TreeHandle::load(self.store, next)?;
        }
        Ok(Some(current))
    }

    /// Depth-first walk over every blob reachable from this tree.
    ///
    /// Entries are visited in name order; `visit` gets the full path.
    pub fn walk_blobs<F>(&self, mut visit: F) -> StorageResult<()>
    where
        F: FnMut(&[String], BlobId) -> StorageResult<()>,
    {
        let mut path = Vec::new();
        walk(self.store, &self.tree, &mut path, &mut visit)
    }

    /// count blobs reachable from this tree
    pub fn count_blobs(&self) -> StorageResult<usize> {
        let mut count = 0;
        self.walk_blobs(|_, _| {
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }
}

fn walk<F>(
    store: &dyn ObjectStore,
    tree: &Tree,
    path: &mut Vec<String>,
    visit: &mut F,
) -> StorageResult<()>
where
    F: FnMut(&[String], BlobId) -> StorageResult<()>,
{
    for entry in tree.entries() {
        path.push(entry.name.clone());
        match entry.kind {
            EntryKind::Blob => visit(path.as_slice(), BlobId::new(entry.id))?,
            EntryKind::Tree => {
                let child = store.get_tree(TreeId::new(entry.id))?;
                walk(store, &child, path, visit)?;
            }
        }
        path.pop();
    }
    Ok(())
}

/// a single change to apply at a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathEdit {
    Upsert(BlobId),
    Remove,
}

/// A mutable tree builder for making changes.
///
/// This collects edits and produces a new root tree when written. Only trees
/// on edited paths are rewritten; missing intermediate trees are created and
/// trees left empty by removals are dropped.
///
/// # Usage Pattern
///
/// ```ignore
/// let mut mutator = TreeMutator::new(store, head_tree);
/// mutator.upsert(&["a", "b", "c"], blob_id);
/// mutator.remove(&["myValue"]);
/// let new_tree_id = mutator.write()?;
/// ```
pub struct TreeMutator<'s> {
    store: &'s dyn ObjectStore,
    base: Option<TreeId>,
    edits: BTreeMap<Vec<String>, PathEdit>,
}

type EditRef<'a> = (&'a [String], PathEdit);

impl<'s> TreeMutator<'s> {
    /// start from `base`, or from an empty tree
    pub fn new(store: &'s dyn ObjectStore, base: Option<TreeId>) -> Self {
        Self {
            store,
            base,
            edits: BTreeMap::new(),
        }
    }

    pub fn upsert<S: AsRef<str>>(&mut self, path: &[S], blob: BlobId) {
        self.edits.insert(to_owned(path), PathEdit::Upsert(blob));
    }

    pub fn remove<S: AsRef<str>>(&mut self, path: &[S]) {
        self.edits.insert(to_owned(path), PathEdit::Remove);
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// write all changed trees and return the new root tree id
    pub fn write(self) -> StorageResult<TreeId> {
        if self.edits.is_empty() {
            if let Some(base) = self.base {
                return Ok(base);
            }
        }

        let edits: Vec<EditRef<'_>> = self
            .edits
            .iter()
            .filter(|(path, _)| !path.is_empty())
            .map(|(path, edit)| (path.as_slice(), *edit))
            .collect();

        let mut prefix = Vec::new();
        match self.rebuild(self.base, edits, &mut prefix)? {
            Some(root) => Ok(root),
            None => self.store.put_tree(Vec::new()),
        }
    }

    /// returns `None` when the resulting tree has no entries
    fn rebuild(
        &self,
        base: Option<TreeId>,
        edits: Vec<EditRef<'_>>,
        prefix: &mut Vec<String>,
    ) -> StorageResult<Option<TreeId>> {
        let mut entries: BTreeMap<String, TreeEntry> = match base {
            Some(id) => self
                .store
                .get_tree(id)?
                .into_entries()
                .into_iter()
                .map(|e| (e.name.clone(), e))
                .collect(),
            None => BTreeMap::new(),
        };

        let mut groups: BTreeMap<&str, Vec<EditRef<'_>>> = BTreeMap::new();
        for (path, edit) in edits {
            groups
                .entry(path[0].as_str())
                .or_default()
                .push((&path[1..], edit));
        }

        for (name, group) in groups {
            prefix.push(name.to_string());
            let (leaf, deeper): (Vec<_>, Vec<_>) =
                group.into_iter().partition(|(rest, _)| rest.is_empty());
            let deeper_upserts = deeper.iter().any(|(_, e)| matches!(e, PathEdit::Upsert(_)));
            let mut existing = entries.get(name).cloned();

            match leaf.last().map(|(_, edit)| *edit) {
                Some(PathEdit::Upsert(_)) if deeper_upserts => {
                    return Err(conflict(prefix, "staged both as a record and as a directory"));
                }
                Some(PathEdit::Upsert(blob)) => {
                    // a directory may only be replaced once the same change set empties it
                    if let Some(dir) = existing.as_ref().and_then(|e| e.as_tree()) {
                        if self.rebuild(Some(dir), deeper, prefix)?.is_some() {
                            return Err(conflict(prefix, "a directory already exists at this path"));
                        }
                    }
                    entries.insert(name.to_string(), TreeEntry::blob(name, blob));
                    prefix.pop();
                    continue;
                }
                Some(PathEdit::Remove) => {
                    if existing.as_ref().map(|e| e.kind) == Some(EntryKind::Blob) {
                        entries.remove(name);
                        existing = None;
                    }
                }
                None => {}
            }

            if deeper.is_empty() {
                prefix.pop();
                continue;
            }

            let child_base = match existing {
                Some(e) if e.kind == EntryKind::Blob => {
                    if deeper_upserts {
                        return Err(conflict(prefix, "a record is stored at this path"));
                    }
                    prefix.pop();
                    continue;
                }
                Some(e) => Some(TreeId::new(e.id)),
                None => None,
            };

            match self.rebuild(child_base, deeper, prefix)? {
                Some(child) => {
                    entries.insert(name.to_string(), TreeEntry::tree(name, child));
                }
                None => {
                    entries.remove(name);
                }
            }
            prefix.pop();
        }

        if entries.is_empty() {
            return Ok(None);
        }
        let id = self.store.put_tree(entries.into_values().collect())?;
        debug!(path = %prefix.join("/"), tree = %id.short(), "wrote tree");
        Ok(Some(id))
    }
}

fn to_owned<S: AsRef<str>>(path: &[S]) -> Vec<String> {
    path.iter().map(|s| s.as_ref().to_string()).collect()
}

fn conflict(path: &[String], reason: &str) -> StorageError {
    StorageError::PathConflict {
        path: path.join("/"),
        reason: reason.to_string(),
    }
}
