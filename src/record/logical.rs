//! The caller-facing record type.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::error::{RecordError, RecordResult};

/// Opaque record identity.
///
/// Callers may supply their own; otherwise the store generates a ULID when
/// the configured path layout needs one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new ULID-based identity.
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An ordered set of `name -> value` string properties plus an optional
/// identity.
///
/// Property order is insertion order and is significant: the value sequence
/// is the record's path inside the tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogicalRecord {
    properties: Vec<(String, String)>,
    identity: Option<RecordId>,
}

impl LogicalRecord {
    /// Build a record from parallel name and value lists.
    pub fn new<N, V>(
        names: impl IntoIterator<Item = N>,
        values: impl IntoIterator<Item = V>,
    ) -> RecordResult<Self>
    where
        N: Into<String>,
        V: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if names.len() != values.len() {
            return Err(RecordError::SchemaMismatch {
                names: names.len(),
                values: values.len(),
            });
        }
        Self::from_pairs(names.into_iter().zip(values))
    }

    /// Build a record from `(name, value)` pairs, rejecting repeated names.
    pub fn from_pairs<N, V>(pairs: impl IntoIterator<Item = (N, V)>) -> RecordResult<Self>
    where
        N: Into<String>,
        V: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut properties = Vec::new();
        for (name, value) in pairs {
            let name = name.into();
            if !seen.insert(name.clone()) {
                return Err(RecordError::DuplicateField(name));
            }
            properties.push((name, value.into()));
        }
        Ok(Self {
            properties,
            identity: None,
        })
    }

    /// A single-property record, as produced by the HEAD banner and
    /// directory listings.
    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            properties: vec![(name.into(), value.into())],
            identity: None,
        }
    }

    pub fn with_identity(mut self, identity: RecordId) -> Self {
        self.identity = Some(identity);
        self
    }

    pub(crate) fn set_identity(&mut self, identity: RecordId) {
        self.identity = Some(identity);
    }

    pub fn identity(&self) -> Option<&RecordId> {
        self.identity.as_ref()
    }

    /// value of a named property
    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(n, _)| n.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl fmt::Display for LogicalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.properties.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")?;
        if let Some(id) = &self.identity {
            write!(f, " #{}", id)?;
        }
        Ok(())
    }
}
