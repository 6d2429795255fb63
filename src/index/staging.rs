//! The per-writer staging index.
//!
//! Records are staged by path; staging the same path twice keeps only the
//! last record, and so does staging the same identity twice. Nothing here is durable or shared: the index belongs to one
//! writer and is cleared after that writer's next successful commit.

use std::collections::BTreeMap;

use tracing::debug;

use crate::record::{LogicalRecord, PathResolver, RecordId, RecordPath, RecordResult};

/// What a commit should do at one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedEntry {
    /// store this record at the path
    Put(LogicalRecord),
    /// drop the record stored at the path, if any
    Delete,
}

impl StagedEntry {
    pub fn record(&self) -> Option<&LogicalRecord> {
        match self {
            StagedEntry::Put(record) => Some(record),
            StagedEntry::Delete => None,
        }
    }
}

/// Desired state accumulated since the last commit.
#[derive(Debug, Clone, Default)]
pub struct StagingIndex {
    resolver: PathResolver,
    entries: BTreeMap<RecordPath, StagedEntry>,
    /// where each staged identity was last put
    identities: BTreeMap<RecordId, RecordPath>,
}

impl StagingIndex {
    pub fn new(resolver: PathResolver) -> Self {
        Self {
            resolver,
            entries: BTreeMap::new(),
            identities: BTreeMap::new(),
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Stage records for storage.
    ///
    /// The whole batch is resolved before anything is staged, so an invalid
    /// record leaves the index unchanged. Returns the number of records
    /// staged.
    pub fn stage(&mut self, records: impl IntoIterator<Item = LogicalRecord>) -> RecordResult<usize> {
        let placed = records
            .into_iter()
            .map(|record| self.resolver.place(record))
            .collect::<RecordResult<Vec<_>>>()?;

        let count = placed.len();
        for (record, path) in placed {
            if let Some(id) = record.identity() {
                let previous = self.identities.insert(id.clone(), path.clone());
                if let Some(previous) = previous.filter(|p| *p != path && self.holds(p, id)) {
                    self.entries.remove(&previous);
                }
            }
            self.entries.insert(path, StagedEntry::Put(record));
        }
        debug!(count, staged = self.entries.len(), "staged records");
        Ok(count)
    }

    /// Stage the removal of the records' paths.
    ///
    /// Removing a path that holds nothing is a no-op at commit time.
    pub fn remove(&mut self, records: impl IntoIterator<Item = LogicalRecord>) -> RecordResult<usize> {
        let paths = records
            .into_iter()
            .map(|record| self.resolver.path_of(&record))
            .collect::<RecordResult<Vec<_>>>()?;

        let count = paths.len();
        for path in paths {
            self.entries.insert(path, StagedEntry::Delete);
        }
        debug!(count, staged = self.entries.len(), "staged removals");
        Ok(count)
    }

    /// stage the removal of one path
    pub fn remove_path(&mut self, path: RecordPath) {
        self.entries.insert(path, StagedEntry::Delete);
    }

    /// drop a staged entry without staging anything in its place
    pub fn unstage(&mut self, path: &RecordPath) -> Option<StagedEntry> {
        self.entries.remove(path)
    }

    /// discard everything staged
    pub fn clear(&mut self) {
        self.entries.clear();
        self.identities.clear();
    }

    /// Identities of staged records and the paths they are staged at.
    ///
    /// A commit removes any other stored record carrying one of these.
    pub fn identities(&self) -> impl Iterator<Item = (&RecordId, &RecordPath)> {
        self.identities.iter().filter(|(id, path)| self.holds(path, id))
    }

    fn holds(&self, path: &RecordPath, id: &RecordId) -> bool {
        matches!(self.entries.get(path), Some(StagedEntry::Put(r)) if r.identity() == Some(id))
    }

    pub fn get(&self, path: &RecordPath) -> Option<&StagedEntry> {
        self.entries.get(path)
    }

    /// staged entries in path order
    pub fn entries(&self) -> impl Iterator<Item = (&RecordPath, &StagedEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{PathLayout, RecordError};

    fn record(values: &[&str]) -> LogicalRecord {
        let names: Vec<String> = (0..values.len()).map(|i| format!("f{}", i)).collect();
        LogicalRecord::new(names, values.iter().copied()).unwrap()
    }

    #[test]
    fn test_last_write_wins() {
        let mut index = StagingIndex::default();
        let first = LogicalRecord::new(["k", "v"], ["a", "1"]).unwrap();
        let second = LogicalRecord::new(["key", "value"], ["a", "1"]).unwrap();

        index.stage([first, second.clone()]).unwrap();
        assert_eq!(index.len(), 1);

        let path = RecordPath::new(["a", "1"]).unwrap();
        assert_eq!(index.get(&path), Some(&StagedEntry::Put(second)));
    }

    #[test]
    fn test_invalid_batch_stages_nothing() {
        let mut index = StagingIndex::default();
        let result = index.stage([record(&["ok"]), record(&["bad/segment"])]);
        assert!(matches!(result, Err(RecordError::InvalidSegment { .. })));
        assert!(index.is_empty());
    }

    #[test]
    fn test_remove_overrides_put() {
        let mut index = StagingIndex::default();
        index.stage([record(&["a", "b"])]).unwrap();
        index.remove([record(&["a", "b"])]).unwrap();

        let path = RecordPath::new(["a", "b"]).unwrap();
        assert_eq!(index.get(&path), Some(&StagedEntry::Delete));

        assert_eq!(index.unstage(&path), Some(StagedEntry::Delete));
        assert!(index.is_empty());
    }

    #[test]
    fn test_identity_layout_keeps_distinct_records() {
        let mut index = StagingIndex::new(PathResolver::new(PathLayout::ValuesThenIdentity));
        index.stage([record(&["x"]), record(&["x"])]).unwrap();
        // each record got its own generated identity, hence its own path
        assert_eq!(index.len(), 2);
        for (path, entry) in index.entries() {
            let id = entry.record().and_then(|r| r.identity()).unwrap();
            assert_eq!(path.segments().last().map(String::as_str), Some(id.as_str()));
        }
    }

    #[test]
    fn test_same_identity_keeps_last() {
        for layout in [PathLayout::Values, PathLayout::ValuesThenIdentity] {
            let mut index = StagingIndex::new(PathResolver::new(layout));
            let id = RecordId::new("uuid-1");
            index
                .stage([
                    record(&["myValue"]).with_identity(id.clone()),
                    record(&["yetAnotherValue"]).with_identity(id.clone()),
                ])
                .unwrap();

            assert_eq!(index.len(), 1);
            let (_, entry) = index.entries().next().unwrap();
            assert_eq!(entry.record().unwrap().get("f0"), Some("yetAnotherValue"));

            let identities: Vec<_> = index.identities().collect();
            assert_eq!(identities.len(), 1);
            assert_eq!(identities[0].0, &id);
        }
    }

    #[test]
    fn test_removed_identity_is_not_reported() {
        let mut index = StagingIndex::default();
        let tagged = record(&["a"]).with_identity(RecordId::new("uuid-1"));
        index.stage([tagged.clone()]).unwrap();
        index.remove([tagged]).unwrap();
        assert_eq!(index.identities().count(), 0);
    }

    #[test]
    fn test_clear() {
        let mut index = StagingIndex::default();
        index.stage([record(&["a"]), record(&["b"])]).unwrap();
        assert_eq!(index.len(), 2);
        index.clear();
        assert!(index.is_empty());
    }
}
