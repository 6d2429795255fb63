//! Query engine and tree listing engine.

mod engine;
mod matcher;

pub use engine::{head_record, QueryEngine, HEAD_PROPERTY, NAME_PROPERTY};
pub use matcher::{parse_pattern, AnyValueGlob, FieldGlob, Glob, MatchAll, Matcher};
