//! Staging index, commit-time diff and the commit engine.

mod diff;
mod engine;
mod staging;

pub use diff::{count_changes, diff_against, Change, ChangeStatus};
pub use engine::{CommitEngine, CommitOutcome};
pub use staging::{StagedEntry, StagingIndex};
