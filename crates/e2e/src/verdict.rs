//! Pass/fail verdicts and per-pattern reports

use std::fmt::Write;

use crate::pattern::WatchPattern;

/// Whether a single pattern passes: only a matched fail-on-find pattern fails.
pub fn pattern_passed(pattern: &WatchPattern) -> bool {
    !(pattern.fail_on_find() && pattern.has_matched())
}

/// A run passes iff none of its fail-on-find patterns matched.
///
/// Patterns without `fail_on_find` are diagnostic only and never change the
/// result, matched or not.
pub fn evaluate(patterns: &[WatchPattern]) -> bool {
    patterns.iter().all(pattern_passed)
}

/// Render one line per pattern, in definition order:
/// `<prefix>: <label>: <PASSED|FAILED> ([<matched lines>])`.
pub fn report(prefix: &str, patterns: &[WatchPattern]) -> String {
    let mut buf = String::new();
    for pattern in patterns {
        let status = if pattern_passed(pattern) { "PASSED" } else { "FAILED" };
        // Writing to a String cannot fail.
        let _ = writeln!(
            buf,
            "{}: {}: {} ([{}])",
            prefix,
            pattern.label(),
            status,
            pattern.matches().join(", ")
        );
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn matched(re: &str, label: &str, fail_on_find: bool, line: Option<&str>) -> WatchPattern {
        let mut p = WatchPattern::new(re, label, false, fail_on_find).unwrap();
        if let Some(line) = line {
            assert!(p.evaluate(line));
        }
        p
    }

    #[test_case(false, None => true ; "failing pattern unmatched")]
    #[test_case(true, None => true ; "informational pattern unmatched")]
    #[test_case(false, Some("hit") => false ; "failing pattern matched")]
    #[test_case(true, Some("hit") => true ; "informational pattern matched")]
    fn test_single_pattern_verdict(informational: bool, line: Option<&str>) -> bool {
        evaluate(&[matched("hit", "hit", !informational, line)])
    }

    #[test]
    fn test_informational_patterns_never_flip_verdict() {
        let failing = matched("ERROR", "errors", true, None);
        let info_unmatched = matched("READY", "ready", false, None);
        let info_matched = matched("READY", "ready", false, Some("READY"));

        assert_eq!(
            evaluate(&[failing.clone(), info_unmatched]),
            evaluate(&[failing, info_matched])
        );
    }

    #[test]
    fn test_empty_rule_set_passes() {
        assert!(evaluate(&[]));
    }

    #[test]
    fn test_report_lines_in_definition_order() {
        let patterns = vec![
            matched("Caused by", "Stacktraces in output", true, Some("Caused by: NPE")),
            matched("Installed features", "Reached installed features", false, None),
        ];

        let text = report("postgres", &patterns);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "postgres: Stacktraces in output: FAILED ([Caused by: NPE])",
                "postgres: Reached installed features: PASSED ([])",
            ]
        );
    }

    #[test]
    fn test_report_joins_multiple_matches() {
        let mut p = WatchPattern::new("W", "warnings", false, false).unwrap();
        p.evaluate("W1");
        p.evaluate("W2");
        assert_eq!(report("kafka", &[p]), "kafka: warnings: PASSED ([W1, W2])\n");
    }
}
