//! Per-line classification against a run's watch patterns

use tracing::info;

use crate::pattern::WatchPattern;

/// Applies every watch pattern of a run to each output line.
#[derive(Debug, Default)]
pub struct LineClassifier {
    patterns: Vec<WatchPattern>,
}

impl LineClassifier {
    pub fn new(patterns: Vec<WatchPattern>) -> Self {
        Self { patterns }
    }

    /// Classify one line and report whether the process should be killed.
    ///
    /// Every pattern sees the line even when an earlier one already asked for
    /// a kill, so informational patterns are never starved by a break pattern
    /// firing on the same line.
    pub fn classify(&mut self, line: &str) -> bool {
        let mut kill = false;
        for pattern in &mut self.patterns {
            if pattern.evaluate(line) && pattern.break_on_match() {
                info!("Kill on {}", line);
                kill = true;
            }
        }
        kill
    }

    pub fn patterns(&self) -> &[WatchPattern] {
        &self.patterns
    }

    pub fn into_patterns(self) -> Vec<WatchPattern> {
        self.patterns
    }
}
