//! Output sinks: classify, persist and echo subprocess lines

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::classifier::LineClassifier;
use crate::pattern::WatchPattern;
use crate::process::ProcessHandle;
use crate::verdict;

/// Something that consumes a supervised process's output, one line at a time.
///
/// The supervisor only talks to this trait, so tests can stand in their own
/// consumer for [`LogSink`].
pub trait LineConsumer: Send {
    /// Handle one output line (without its trailing newline).
    fn consume(&mut self, line: &str);

    /// Bind the running process so later lines can request its termination.
    /// Called at most once per run.
    fn attach(&mut self, process: ProcessHandle);

    /// Release any resources held for the run. Safe to call more than once.
    fn close(&mut self);

    /// Verdict over everything consumed so far.
    fn passed(&self) -> bool;

    /// Human-readable per-pattern report.
    fn report(&self) -> String;
}

/// Configuration shared by every sink of an invocation
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Echo each line to the console as `<prefix>: <line>`
    pub verbose: bool,

    /// Directory where `<name>.log` transcripts are appended
    pub log_dir: PathBuf,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_dir: PathBuf::from("."),
        }
    }
}

/// The standard consumer: console echo, append-only log file, classification.
pub struct LogSink {
    prefix: String,
    log_path: PathBuf,
    verbose: bool,
    log: Option<File>,
    closed: bool,
    classifier: LineClassifier,
    process: Option<ProcessHandle>,
    kill_requested: bool,
}

impl LogSink {
    pub fn new(config: &SinkConfig, directory: &Path, patterns: Vec<WatchPattern>) -> Self {
        Self {
            prefix: directory_name(directory),
            log_path: log_path(&config.log_dir, directory),
            verbose: config.verbose,
            log: None,
            closed: false,
            classifier: LineClassifier::new(patterns),
            process: None,
            kill_requested: false,
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn patterns(&self) -> &[WatchPattern] {
        self.classifier.patterns()
    }

    /// A break-on-match pattern has fired during this run.
    pub fn kill_requested(&self) -> bool {
        self.kill_requested
    }

    fn persist(&mut self, line: &str) {
        if self.closed {
            debug!("Dropping line for closed log {}", self.log_path.display());
            return;
        }

        if let Err(e) = self.append(line) {
            error!("Could not write to log file {}: {}", self.log_path.display(), e);
        }
    }

    fn append(&mut self, line: &str) -> std::io::Result<()> {
        if self.log.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_path)?;
            self.log = Some(file);
        }
        if let Some(file) = self.log.as_mut() {
            writeln!(file, "{}", line)?;
            file.flush()?;
        }
        Ok(())
    }

    fn request_kill(&mut self) {
        self.kill_requested = true;
        match &self.process {
            Some(process) => {
                process.terminate();
            }
            None => debug!("Kill requested before a process was attached"),
        }
    }
}

impl LineConsumer for LogSink {
    fn consume(&mut self, line: &str) {
        if self.verbose {
            println!("{}: {}", self.prefix, line);
        }

        self.persist(line);

        // Once a kill is requested, remaining output is transcript only.
        if self.kill_requested {
            return;
        }
        if self.classifier.classify(line) {
            self.request_kill();
        }
    }

    fn attach(&mut self, process: ProcessHandle) {
        if let Some(existing) = &self.process {
            debug!(
                "Process {} already attached, ignoring {}",
                existing.pid(),
                process.pid()
            );
            return;
        }
        self.process = Some(process);

        // A break pattern fired before the handle existed.
        if self.kill_requested {
            process.terminate();
        }
    }

    fn close(&mut self) {
        if let Some(mut file) = self.log.take() {
            if let Err(e) = file.flush() {
                error!("Could not flush log file {}: {}", self.log_path.display(), e);
            }
        }
        self.closed = true;
    }

    fn passed(&self) -> bool {
        verdict::evaluate(self.classifier.patterns())
    }

    fn report(&self) -> String {
        verdict::report(&self.prefix, self.classifier.patterns())
    }
}

/// `<log_dir>/<directory name>.log`
pub fn log_path(log_dir: &Path, directory: &Path) -> PathBuf {
    log_dir.join(format!("{}.log", directory_name(directory)))
}

/// Last path component, used as the log name and console prefix.
fn directory_name(directory: &Path) -> String {
    directory
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| directory.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink_in(dir: &Path, patterns: Vec<WatchPattern>) -> LogSink {
        let config = SinkConfig {
            verbose: false,
            log_dir: dir.to_path_buf(),
        };
        LogSink::new(&config, Path::new("postgres"), patterns)
    }

    #[test]
    fn test_log_path_uses_directory_name() {
        assert_eq!(
            log_path(Path::new("logs"), Path::new("work/postgres")),
            PathBuf::from("logs/postgres.log")
        );
    }

    #[test]
    fn test_prefix_is_directory_name() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SinkConfig {
            verbose: false,
            log_dir: tmp.path().to_path_buf(),
        };
        let patterns = vec![WatchPattern::new("x", "Saw x", false, false).unwrap()];
        let sink = LogSink::new(&config, Path::new("./work/kafka"), patterns);
        assert_eq!(sink.log_path(), tmp.path().join("kafka.log"));
        assert!(sink.report().starts_with("kafka: Saw x"));
    }

    #[test]
    fn test_log_opened_lazily() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = sink_in(tmp.path(), vec![]);
        assert!(!sink.log_path().exists());

        sink.close();
        assert!(!sink.log_path().exists());
    }

    #[test]
    fn test_lines_persisted_and_flushed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = sink_in(tmp.path(), vec![]);
        sink.consume("first");
        sink.consume("second");

        // Flushed per line, readable before close.
        let contents = std::fs::read_to_string(sink.log_path()).unwrap();
        assert_eq!(contents, "first\nsecond\n");
        sink.close();
        sink.close();
    }

    #[test]
    fn test_unwritable_log_does_not_stop_classification() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SinkConfig {
            verbose: false,
            log_dir: tmp.path().join("missing-dir"),
        };
        let patterns = vec![WatchPattern::new("ERROR", "errors", false, true).unwrap()];
        let mut sink = LogSink::new(&config, Path::new("kafka"), patterns);

        sink.consume("ERROR: broker down");
        assert!(sink.patterns()[0].has_matched());
        assert!(!sink.passed());
    }

    #[test]
    fn test_kill_before_attach_is_safe() {
        let tmp = tempfile::tempdir().unwrap();
        let patterns = vec![WatchPattern::new("^Caused by", "stacktrace", true, true).unwrap()];
        let mut sink = sink_in(tmp.path(), patterns);

        sink.consume("Caused by: NullPointerException");
        assert!(sink.kill_requested());
        assert!(sink.patterns()[0].has_matched());
        assert!(!sink.passed());
    }

    #[test]
    fn test_lines_after_kill_are_not_classified() {
        let tmp = tempfile::tempdir().unwrap();
        let patterns = vec![
            WatchPattern::new("ERROR", "errors", false, true).unwrap(),
            WatchPattern::new("READY", "ready", true, false).unwrap(),
        ];
        let mut sink = sink_in(tmp.path(), patterns);

        for line in ["starting", "READY", "ERROR after shutdown"] {
            sink.consume(line);
        }

        assert!(!sink.patterns()[0].has_matched());
        assert!(sink.patterns()[1].has_matched());
        assert!(sink.passed());

        let contents = std::fs::read_to_string(sink.log_path()).unwrap();
        assert_eq!(contents.lines().count(), 3);
    }

    #[test]
    fn test_report_uses_directory_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let patterns = vec![WatchPattern::new("x", "Saw x", false, false).unwrap()];
        let sink = sink_in(tmp.path(), patterns);
        assert_eq!(sink.report(), "postgres: Saw x: PASSED ([])\n");
    }
}
