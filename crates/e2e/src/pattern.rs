//! Watch patterns matched against subprocess output

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};

/// A watch pattern plus the lines it has matched during one run.
///
/// The regex, label and flags are fixed at construction. `matches` only ever
/// grows, so [`WatchPattern::has_matched`] never goes back to `false`.
#[derive(Debug, Clone)]
pub struct WatchPattern {
    regex: Regex,
    label: String,
    break_on_match: bool,
    fail_on_find: bool,
    matches: Vec<String>,
}

impl WatchPattern {
    /// Compile a watch pattern. A malformed regex is rejected here, never at
    /// evaluation time.
    pub fn new(
        pattern: &str,
        label: impl Into<String>,
        break_on_match: bool,
        fail_on_find: bool,
    ) -> E2eResult<Self> {
        let regex = Regex::new(pattern).map_err(|source| E2eError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            regex,
            label: label.into(),
            break_on_match,
            fail_on_find,
            matches: Vec::new(),
        })
    }

    /// Test `line` for a match anywhere in it, recording the line on a hit.
    pub fn evaluate(&mut self, line: &str) -> bool {
        if !self.regex.is_match(line) {
            return false;
        }
        self.matches.push(line.to_string());
        true
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// A match asks for the supervised process to be terminated.
    pub fn break_on_match(&self) -> bool {
        self.break_on_match
    }

    /// A match fails the scenario.
    pub fn fail_on_find(&self) -> bool {
        self.fail_on_find
    }

    pub fn matches(&self) -> &[String] {
        &self.matches
    }

    pub fn has_matched(&self) -> bool {
        !self.matches.is_empty()
    }
}

/// Serializable form of a watch pattern, as written in scenario catalogs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpec {
    /// Regular expression, matched anywhere in a line
    pub pattern: String,

    /// Human-readable label used in reports
    pub label: String,

    #[serde(default)]
    pub break_on_match: bool,

    #[serde(default)]
    pub fail_on_find: bool,
}

impl PatternSpec {
    pub fn new(pattern: &str, label: &str, break_on_match: bool, fail_on_find: bool) -> Self {
        Self {
            pattern: pattern.to_string(),
            label: label.to_string(),
            break_on_match,
            fail_on_find,
        }
    }

    /// Compile into a fresh pattern with empty match history.
    pub fn compile(&self) -> E2eResult<WatchPattern> {
        WatchPattern::new(&self.pattern, &self.label, self.break_on_match, self.fail_on_find)
    }
}

/// Compile every spec, failing on the first bad regex.
pub fn compile_all(specs: &[PatternSpec]) -> E2eResult<Vec<WatchPattern>> {
    specs.iter().map(PatternSpec::compile).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_anywhere_in_line() {
        let mut p = WatchPattern::new("READY", "ready", false, false).unwrap();
        assert!(p.evaluate("server READY on :8080"));
        assert_eq!(p.matches(), ["server READY on :8080"]);
        assert!(p.has_matched());
    }

    #[test]
    fn test_anchored_pattern_respects_anchor() {
        let mut p = WatchPattern::new("^Caused by", "stacktrace", true, true).unwrap();
        assert!(!p.evaluate("\tCaused by: something"));
        assert!(!p.has_matched());
        assert!(p.evaluate("Caused by: java.lang.NullPointerException"));
    }

    #[test]
    fn test_miss_leaves_state_untouched() {
        let mut p = WatchPattern::new("ERROR", "errors", false, true).unwrap();
        assert!(!p.evaluate("all good"));
        assert!(p.matches().is_empty());
        assert!(!p.has_matched());
    }

    #[test]
    fn test_has_matched_is_monotonic() {
        let mut p = WatchPattern::new("x", "x", false, false).unwrap();
        p.evaluate("x");
        for line in ["a", "b", "c"] {
            p.evaluate(line);
            assert!(p.has_matched());
        }
        assert_eq!(p.matches().len(), 1);
    }

    #[test]
    fn test_malformed_regex_rejected_at_construction() {
        let err = WatchPattern::new("(unclosed", "bad", false, false).unwrap_err();
        assert!(matches!(err, E2eError::InvalidPattern { .. }));
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let spec: PatternSpec = serde_yaml::from_str("pattern: foo\nlabel: Foo seen\n").unwrap();
        assert!(!spec.break_on_match);
        assert!(!spec.fail_on_find);
        let compiled = spec.compile().unwrap();
        assert_eq!(compiled.pattern(), "foo");
        assert_eq!(compiled.label(), "Foo seen");
    }
}
