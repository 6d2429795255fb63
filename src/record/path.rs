//! Path resolution: where a record lives inside the tree.
//!
//! A record with values `[a, b, c]` is stored at `a/b/c`. Values are used
//! verbatim as tree entry names; nothing is escaped or normalized, so a value
//! that could not be an entry name is rejected up front.

use std::fmt;
use std::str::FromStr;

use tracing::trace;

use crate::record::error::{RecordError, RecordResult};
use crate::record::logical::{LogicalRecord, RecordId};

/// How a record's path is derived from its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathLayout {
    /// path = values
    #[default]
    Values,
    /// path = values followed by the record identity; records staged
    /// without one get a generated ULID
    ValuesThenIdentity,
}

impl FromStr for PathLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "values" => Ok(PathLayout::Values),
            "identity" | "values-then-identity" => Ok(PathLayout::ValuesThenIdentity),
            other => Err(format!("unknown path layout '{}'", other)),
        }
    }
}

impl fmt::Display for PathLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathLayout::Values => write!(f, "values"),
            PathLayout::ValuesThenIdentity => write!(f, "values-then-identity"),
        }
    }
}

/// A validated, non-empty sequence of tree entry names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordPath(Vec<String>);

impl RecordPath {
    pub fn new<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> RecordResult<Self> {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(RecordError::EmptyPath);
        }
        for segment in &segments {
            validate_segment(segment)?;
        }
        Ok(Self(segments))
    }

    /// segments read back from a stored tree, already valid
    pub(crate) fn from_segments(segments: Vec<String>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// always false; kept for symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RecordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Check that `segment` can be used as a tree entry name.
pub fn validate_segment(segment: &str) -> RecordResult<()> {
    let reason = if segment.is_empty() {
        "segment is empty"
    } else if segment == "." || segment == ".." {
        "segment is a relative path component"
    } else if segment.contains('/') || segment.contains('\\') {
        "segment contains a path separator"
    } else if segment.contains('\0') {
        "segment contains a NUL character"
    } else {
        return Ok(());
    };

    Err(RecordError::InvalidSegment {
        segment: segment.to_string(),
        reason,
    })
}

/// Maps records to their properties and physical path.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver {
    layout: PathLayout,
}

impl PathResolver {
    pub fn new(layout: PathLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> PathLayout {
        self.layout
    }

    /// Resolve parallel name/value lists into a record and its path.
    pub fn resolve<N, V>(
        &self,
        names: impl IntoIterator<Item = N>,
        values: impl IntoIterator<Item = V>,
        identity: Option<RecordId>,
    ) -> RecordResult<(LogicalRecord, RecordPath)>
    where
        N: Into<String>,
        V: Into<String>,
    {
        let mut record = LogicalRecord::new(names, values)?;
        if let Some(identity) = identity {
            record.set_identity(identity);
        }
        self.place(record)
    }

    /// Compute the path of an already built record, assigning an identity
    /// first when the layout needs one.
    pub fn place(&self, mut record: LogicalRecord) -> RecordResult<(LogicalRecord, RecordPath)> {
        if self.layout == PathLayout::ValuesThenIdentity && record.identity().is_none() {
            record.set_identity(RecordId::generate());
        }
        let path = self.path_of(&record)?;
        trace!(path = %path, "resolved record path");
        Ok((record, path))
    }

    /// The path of `record` without modifying it.
    ///
    /// Under `ValuesThenIdentity` a record without identity resolves to its
    /// value path only.
    pub fn path_of(&self, record: &LogicalRecord) -> RecordResult<RecordPath> {
        let values = record.values().map(str::to_string);
        match (self.layout, record.identity()) {
            (PathLayout::ValuesThenIdentity, Some(id)) if !record.is_empty() => {
                RecordPath::new(values.chain(std::iter::once(id.to_string())))
            }
            _ => RecordPath::new(values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_become_path() {
        let resolver = PathResolver::default();
        let (record, path) = resolver
            .resolve(["kind", "name", "id"], ["a", "b", "c"], None)
            .unwrap();
        assert_eq!(path.segments(), ["a", "b", "c"]);
        assert_eq!(path.to_string(), "a/b/c");
        assert_eq!(record.get("name"), Some("b"));
    }

    #[test]
    fn test_identity_does_not_change_default_path() {
        let resolver = PathResolver::default();
        let (record, path) = resolver
            .resolve(["k"], ["v"], Some(RecordId::new("id-1")))
            .unwrap();
        assert_eq!(path.to_string(), "v");
        assert_eq!(record.identity().map(RecordId::as_str), Some("id-1"));
    }

    #[test]
    fn test_identity_layout_generates_identity() {
        let resolver = PathResolver::new(PathLayout::ValuesThenIdentity);
        let (record, path) = resolver.resolve(["k"], ["v"], None).unwrap();
        let id = record.identity().unwrap().to_string();
        assert_eq!(path.segments(), ["v".to_string(), id]);

        let (_, path) = resolver
            .resolve(["k"], ["v"], Some(RecordId::new("fixed")))
            .unwrap();
        assert_eq!(path.to_string(), "v/fixed");
    }

    #[test]
    fn test_empty_path() {
        let resolver = PathResolver::default();
        let names: [&str; 0] = [];
        assert_eq!(resolver.resolve(names, names, None), Err(RecordError::EmptyPath));

        // also with a generated identity, the values must not be empty
        let resolver = PathResolver::new(PathLayout::ValuesThenIdentity);
        assert_eq!(resolver.resolve(names, names, None), Err(RecordError::EmptyPath));
    }

    #[test]
    fn test_schema_mismatch() {
        let resolver = PathResolver::default();
        assert_eq!(
            resolver.resolve(["a"], ["1", "2"], None),
            Err(RecordError::SchemaMismatch { names: 1, values: 2 })
        );
    }

    #[test]
    fn test_invalid_segments() {
        for bad in ["a/b", "a\\b", "", ".", "..", "nul\0byte"] {
            let result = PathResolver::default().resolve(["k"], [bad], None);
            assert!(
                matches!(result, Err(RecordError::InvalidSegment { .. })),
                "{:?} should be rejected",
                bad
            );
        }
        // dots inside a name are fine
        assert!(validate_segment("v1.2").is_ok());
        assert!(validate_segment("...").is_ok());
    }

    #[test]
    fn test_layout_parsing() {
        assert_eq!("values".parse::<PathLayout>().unwrap(), PathLayout::Values);
        assert_eq!(
            "identity".parse::<PathLayout>().unwrap(),
            PathLayout::ValuesThenIdentity
        );
        assert!("flat".parse::<PathLayout>().is_err());
    }
}
