//! Content-addressed object database.
//!
//! Objects are immutable and append-only: once written they are never
//! mutated or deleted. Writing the same content twice yields the same id
//! and is a no-op the second time, so concurrent writers cannot corrupt
//! each other here. Only the HEAD reference (see `refs`) is mutable.
//!
//! Two backends are provided:
//! - [`MemoryObjectStore`] keeps everything in a `HashMap`
//! - [`FsObjectStore`] keeps loose objects under `<base>/objects/xx/yyyy...`

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tempfile::NamedTempFile;
use tracing::trace;

use crate::storage::commit::CommitObject;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::tree::{Tree, TreeEntry};
use crate::storage::types::{BlobId, CommitId, ObjectId, ObjectKind, TreeId};

/// a raw object as held by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub kind: ObjectKind,
    pub payload: Vec<u8>,
}

impl StoredObject {
    pub fn new(kind: ObjectKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    /// the content address of this object
    pub fn id(&self) -> ObjectId {
        ObjectId::compute(self.kind, &self.payload)
    }
}

/// Append-only, content-addressed storage for blobs, trees and commits.
///
/// Backends only implement the raw `write`/`read`/`contains` triple; the
/// typed `put_*`/`get_*` helpers are shared.
pub trait ObjectStore: Send + Sync {
    /// write an object, returning its id; existing objects are left alone
    fn write(&self, object: &StoredObject) -> StorageResult<ObjectId>;

    /// read an object; `Ok(None)` when absent
    fn read(&self, id: &ObjectId) -> StorageResult<Option<StoredObject>>;

    /// check whether an object exists
    fn contains(&self, id: &ObjectId) -> StorageResult<bool>;

    /// on-disk root of the store, if it has one
    fn base(&self) -> Option<&Path> {
        None
    }

    /// store a record payload
    fn put_blob(&self, bytes: &[u8]) -> StorageResult<BlobId> {
        let id = self.write(&StoredObject::new(ObjectKind::Blob, bytes.to_vec()))?;
        Ok(BlobId::new(id))
    }

    /// store a tree built from `entries` (order does not matter)
    fn put_tree(&self, entries: Vec<TreeEntry>) -> StorageResult<TreeId> {
        let tree = Tree::new(entries);
        let id = self.write(&StoredObject::new(ObjectKind::Tree, tree.encode()?))?;
        Ok(TreeId::new(id))
    }

    /// store a commit; every commit carries a unique nonce so it is always new
    fn put_commit(&self, commit: &CommitObject) -> StorageResult<CommitId> {
        let id = self.write(&StoredObject::new(ObjectKind::Commit, commit.encode()?))?;
        Ok(CommitId::new(id))
    }

    /// read an object of any kind, failing when it is missing
    fn get(&self, id: &ObjectId) -> StorageResult<StoredObject> {
        self.read(id)?.ok_or(StorageError::ObjectNotFound(*id))
    }

    /// read an object and check its kind
    fn get_kind(&self, id: &ObjectId, expected: ObjectKind) -> StorageResult<Vec<u8>> {
        let object = self.get(id)?;
        if object.kind != expected {
            return Err(StorageError::UnexpectedObjectKind {
                id: *id,
                expected,
                found: object.kind,
            });
        }
        Ok(object.payload)
    }

    fn get_blob(&self, id: BlobId) -> StorageResult<Vec<u8>> {
        self.get_kind(&id.raw(), ObjectKind::Blob)
    }

    fn get_tree(&self, id: TreeId) -> StorageResult<Tree> {
        let payload = self.get_kind(&id.raw(), ObjectKind::Tree)?;
        Tree::decode(&payload)
    }

    fn get_commit(&self, id: CommitId) -> StorageResult<CommitObject> {
        let payload = self.get_kind(&id.raw(), ObjectKind::Commit)?;
        CommitObject::decode(&payload)
    }
}

/// In-memory, HashMap-based object store.
///
/// Used for tests and for `Edb::in_memory`.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// number of objects currently stored
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn write(&self, object: &StoredObject) -> StorageResult<ObjectId> {
        let id = object.id();
        self.objects.write().entry(id).or_insert_with(|| object.clone());
        Ok(id)
    }

    fn read(&self, id: &ObjectId) -> StorageResult<Option<StoredObject>> {
        Ok(self.objects.read().get(id).cloned())
    }

    fn contains(&self, id: &ObjectId) -> StorageResult<bool> {
        Ok(self.objects.read().contains_key(id))
    }
}

impl std::fmt::Debug for MemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryObjectStore")
            .field("object_count", &self.len())
            .finish()
    }
}

/// Loose-object store on the filesystem.
///
/// Each object lives in its own file, `objects/<first 2 hex>/<remaining 62 hex>`,
/// holding the same `"<kind> <len>\0<payload>"` bytes the id was hashed from.
/// Files are written to a temporary file in the target directory and renamed
/// into place, so a reader never sees a half-written object.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    base: PathBuf,
    objects_dir: PathBuf,
}

impl FsObjectStore {
    pub const OBJECTS_DIR: &'static str = "objects";

    /// open an existing store rooted at `base`
    pub fn open(base: impl AsRef<Path>) -> StorageResult<Self> {
        let base = base.as_ref().to_path_buf();
        let objects_dir = base.join(Self::OBJECTS_DIR);
        if !objects_dir.is_dir() {
            return Err(StorageError::NotInitialized(base));
        }
        Ok(Self { base, objects_dir })
    }

    /// create the directory layout (idempotent) and open it
    pub fn init(base: impl AsRef<Path>) -> StorageResult<Self> {
        let base = base.as_ref();
        fs::create_dir_all(base.join(Self::OBJECTS_DIR))?;
        Self::open(base)
    }

    /// check whether `base` looks like a store
    pub fn exists_at(base: impl AsRef<Path>) -> bool {
        base.as_ref().join(Self::OBJECTS_DIR).is_dir()
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    fn encode(object: &StoredObject) -> Vec<u8> {
        let mut bytes = format!("{} {}\0", object.kind, object.payload.len()).into_bytes();
        bytes.extend_from_slice(&object.payload);
        bytes
    }

    fn decode(&self, id: &ObjectId, bytes: &[u8]) -> StorageResult<StoredObject> {
        let path = self.object_path(id);
        let corrupted = |reason: &str| StorageError::CorruptedData {
            path: path.clone(),
            reason: reason.to_string(),
        };

        let nul = bytes
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| corrupted("missing header terminator"))?;
        let header = std::str::from_utf8(&bytes[..nul]).map_err(|_| corrupted("header is not utf-8"))?;
        let (kind, len) = header
            .split_once(' ')
            .ok_or_else(|| corrupted("malformed header"))?;
        let kind = match kind {
            "blob" => ObjectKind::Blob,
            "tree" => ObjectKind::Tree,
            "commit" => ObjectKind::Commit,
            _ => return Err(corrupted("unknown object kind")),
        };
        let payload = &bytes[nul + 1..];
        if len.parse::<usize>().ok() != Some(payload.len()) {
            return Err(corrupted("length does not match header"));
        }

        let object = StoredObject::new(kind, payload.to_vec());
        if object.id() != *id {
            return Err(corrupted("content does not match object id"));
        }
        Ok(object)
    }
}

impl ObjectStore for FsObjectStore {
    fn write(&self, object: &StoredObject) -> StorageResult<ObjectId> {
        let id = object.id();
        let path = self.object_path(&id);
        if path.exists() {
            return Ok(id);
        }

        let dir = path.parent().unwrap_or(&self.objects_dir);
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&Self::encode(object))?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;

        trace!(id = %id.short(), kind = %object.kind, "wrote object");
        Ok(id)
    }

    fn read(&self, id: &ObjectId) -> StorageResult<Option<StoredObject>> {
        match fs::read(self.object_path(id)) {
            Ok(bytes) => self.decode(id, &bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, id: &ObjectId) -> StorageResult<bool> {
        Ok(self.object_path(id).exists())
    }

    fn base(&self) -> Option<&Path> {
        Some(&self.base)
    }
}
