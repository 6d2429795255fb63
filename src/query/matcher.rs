//! Record matchers for `query`.
//!
//! Pattern forms:
//! - `*` or the empty string matches every record
//! - `field:glob` matches records whose `field` property matches `glob`
//! - any other string is a glob matched against every property value
//!
//! Globs understand `*` (any run of characters) and `?` (one character).

use crate::record::LogicalRecord;

/// Decides which records a query returns.
pub trait Matcher: Send + Sync {
    fn matches(&self, record: &LogicalRecord) -> bool;
}

impl<F> Matcher for F
where
    F: Fn(&LogicalRecord) -> bool + Send + Sync,
{
    fn matches(&self, record: &LogicalRecord) -> bool {
        self(record)
    }
}

/// matches everything
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAll;

impl Matcher for MatchAll {
    fn matches(&self, _record: &LogicalRecord) -> bool {
        true
    }
}

/// A compiled `*`/`?` wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glob {
    pattern: Vec<char>,
}

impl Glob {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.chars().collect(),
        }
    }

    /// whole-string match
    pub fn is_match(&self, text: &str) -> bool {
        let text: Vec<char> = text.chars().collect();
        let (mut p, mut t) = (0, 0);
        // last `*` seen and the text position it is currently absorbing up to
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            match self.pattern.get(p) {
                Some('*') => {
                    backtrack = Some((p, t));
                    p += 1;
                }
                Some('?') => {
                    p += 1;
                    t += 1;
                }
                Some(c) if *c == text[t] => {
                    p += 1;
                    t += 1;
                }
                _ => match backtrack {
                    Some((star, absorbed)) => {
                        p = star + 1;
                        t = absorbed + 1;
                        backtrack = Some((star, absorbed + 1));
                    }
                    None => return false,
                },
            }
        }

        self.pattern[p..].iter().all(|c| *c == '*')
    }
}

/// `field:glob`
#[derive(Debug, Clone)]
pub struct FieldGlob {
    field: String,
    glob: Glob,
}

impl FieldGlob {
    pub fn new(field: impl Into<String>, glob: &str) -> Self {
        Self {
            field: field.into(),
            glob: Glob::new(glob),
        }
    }
}

impl Matcher for FieldGlob {
    fn matches(&self, record: &LogicalRecord) -> bool {
        record
            .get(&self.field)
            .map(|value| self.glob.is_match(value))
            .unwrap_or(false)
    }
}

/// a glob matched against every property value
#[derive(Debug, Clone)]
pub struct AnyValueGlob(Glob);

impl AnyValueGlob {
    pub fn new(glob: &str) -> Self {
        Self(Glob::new(glob))
    }
}

impl Matcher for AnyValueGlob {
    fn matches(&self, record: &LogicalRecord) -> bool {
        record.values().any(|value| self.0.is_match(value))
    }
}

/// Parse a query pattern into a matcher.
pub fn parse_pattern(pattern: &str) -> Box<dyn Matcher> {
    let pattern = pattern.trim();
    if pattern.is_empty() || pattern == "*" {
        return Box::new(MatchAll);
    }
    match pattern.split_once(':') {
        Some((field, glob)) if !field.is_empty() => Box::new(FieldGlob::new(field, glob)),
        _ => Box::new(AnyValueGlob::new(pattern)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob() {
        let cases = [
            ("*", "", true),
            ("*", "anything", true),
            ("abc", "abc", true),
            ("abc", "abcd", false),
            ("a?c", "abc", true),
            ("a?c", "ac", false),
            ("a*", "a", true),
            ("*c", "abc", true),
            ("a*b*c", "aXbYbZc", true),
            ("a*b*c", "aXbYbZ", false),
            ("*.log", "nightly.log", true),
            ("*.log", "nightly.log.gz", false),
            ("?", "ä", true),
        ];
        for (pattern, text, expected) in cases {
            assert_eq!(
                Glob::new(pattern).is_match(text),
                expected,
                "{} vs {}",
                pattern,
                text
            );
        }
    }

    #[test]
    fn test_parse_pattern() {
        let record = LogicalRecord::new(["kind", "name"], ["job", "nightly"]).unwrap();

        assert!(parse_pattern("*").matches(&record));
        assert!(parse_pattern("").matches(&record));
        assert!(parse_pattern("name:night*").matches(&record));
        assert!(!parse_pattern("kind:night*").matches(&record));
        assert!(!parse_pattern("missing:*").matches(&record));
        assert!(parse_pattern("j?b").matches(&record));
        assert!(!parse_pattern("weekly").matches(&record));
        // a leading colon is part of the glob, not an empty field name
        assert!(!parse_pattern(":job").matches(&record));
    }

    #[test]
    fn test_closure_matcher() {
        let record = LogicalRecord::new(["n"], ["42"]).unwrap();
        let even = |r: &LogicalRecord| {
            r.get("n")
                .and_then(|v| v.parse::<u32>().ok())
                .map_or(false, |n| n % 2 == 0)
        };
        assert!(even.matches(&record));
    }
}
