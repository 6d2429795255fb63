//! core type-safe identifiers for the object graph.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// the three kinds of objects kept in the object store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// error returned when parsing an object id from text
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidIdError {
    #[error("invalid hex in object id: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("object id must be 32 bytes, got {0}")]
    Length(usize),
}

/// A SHA-256 content address.
///
/// The hash covers a `"<kind> <len>\0"` header followed by the payload, so a
/// blob and a tree with the same payload bytes never share an id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// hash a payload of the given kind
    pub fn compute(kind: ObjectKind, payload: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(b" ");
        hasher.update(payload.len().to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(payload);
        Self(hasher.finalize().into())
    }

    /// parse an ObjectId from a 64 character hex string
    pub fn from_hex(hex_str: &str) -> Result<Self, InvalidIdError> {
        let bytes = hex::decode(hex_str.trim())?;
        let raw: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| InvalidIdError::Length(bytes.len()))?;
        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// short form used in log lines and the CLI
    pub fn short(&self) -> String {
        self.to_hex()[..7].to_string()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short())
    }
}

impl FromStr for ObjectId {
    type Err = InvalidIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ObjectId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub(crate) ObjectId);

        impl $name {
            pub(crate) fn new(id: ObjectId) -> Self {
                Self(id)
            }

            /// the untyped object id
            pub fn raw(&self) -> ObjectId {
                self.0
            }

            /// the object kind this id always refers to
            pub fn kind() -> ObjectKind {
                $kind
            }

            /// parse from a hex string
            pub fn from_hex(hex_str: &str) -> Result<Self, InvalidIdError> {
                ObjectId::from_hex(hex_str).map(Self)
            }

            /// short form of the id
            pub fn short(&self) -> String {
                self.0.short()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = InvalidIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }
    };
}

typed_id!(
    /// Identifier of a blob (one serialized record).
    BlobId,
    ObjectKind::Blob
);

typed_id!(
    /// Identifier of a tree (a directory of blobs and trees).
    TreeId,
    ObjectKind::Tree
);

typed_id!(
    /// Identifier of a commit.
    ///
    /// Keeps a commit id from being passed where a tree id is expected.
    CommitId,
    ObjectKind::Commit
);

/// author/committer identity recorded on commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// default committer for store operations
    pub fn edb() -> Self {
        Self::new("EDB", "edb@localhost")
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::edb()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}
