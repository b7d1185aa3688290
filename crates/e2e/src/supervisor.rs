//! Supervised execution of one external command

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::E2eError;
use crate::pattern::WatchPattern;
use crate::process::{exit_value, ProcessHandle, PROCESS_KILLED};
use crate::sink::{LineConsumer, LogSink, SinkConfig};

/// Lines buffered between the pipe readers and the consumer
const LINE_BUFFER: usize = 1024;

/// One supervised execution
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Working directory of the command
    pub directory: PathBuf,

    /// Program followed by its arguments
    pub command: Vec<String>,

    /// Variables applied on top of the inherited environment
    pub env: BTreeMap<String, String>,

    /// Wall-clock bound on the wait for completion
    pub timeout: Duration,
}

/// How a supervised run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Exited on its own with this shell-style exit value
    Exited(Option<i32>),

    /// Exited with the killed sentinel
    Killed,

    /// Still running when the timeout fired; termination was requested
    TimedOut,

    /// The run could not be carried out
    Failed(String),
}

/// Result of a supervised run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub passed: bool,
    pub report: String,
    pub status: RunStatus,
}

/// Configuration for the supervisor
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub sink: SinkConfig,

    /// Variables set for every supervised command
    pub env: BTreeMap<String, String>,

    /// How long to keep draining output after the process ended or was killed
    pub drain_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        // Plain console rendering, so no output line is redrawn or hidden.
        env.insert("QUARKUS_CONSOLE_BASIC".to_string(), "true".to_string());

        Self {
            sink: SinkConfig::default(),
            env,
            drain_grace: Duration::from_secs(5),
        }
    }
}

/// Runs external commands and turns their output into verdicts
pub struct Supervisor {
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Run `request` with a [`LogSink`] over `patterns`.
    pub async fn run(&self, request: &RunRequest, patterns: Vec<WatchPattern>) -> RunOutcome {
        let sink = LogSink::new(&self.config.sink, &request.directory, patterns);
        self.run_with(request, sink).await
    }

    /// Run `request`, feeding its output to `consumer`.
    ///
    /// Never fails: start, wait and consumption errors are logged and yield a
    /// failed outcome. A timeout on its own does not fail the run, the verdict
    /// comes from the consumer's patterns.
    pub async fn run_with<C>(&self, request: &RunRequest, consumer: C) -> RunOutcome
    where
        C: LineConsumer + 'static,
    {
        info!(
            "Testing {} with {}",
            request.directory.display(),
            request.command.join(" ")
        );

        let (status, consumer) = self.supervise(request, consumer).await;

        match consumer {
            Some(mut consumer) => {
                consumer.close();
                let failed = matches!(status, RunStatus::Failed(_));
                RunOutcome {
                    passed: !failed && consumer.passed(),
                    report: consumer.report(),
                    status,
                }
            }
            None => RunOutcome {
                passed: false,
                report: String::new(),
                status,
            },
        }
    }

    async fn supervise<C>(&self, request: &RunRequest, mut consumer: C) -> (RunStatus, Option<C>)
    where
        C: LineConsumer + 'static,
    {
        let Some((program, args)) = request.command.split_first() else {
            let err = E2eError::EmptyCommand(request.directory.display().to_string());
            error!("{}", err);
            return (RunStatus::Failed(err.to_string()), Some(consumer));
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&request.directory)
            .envs(&self.config.env)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                let err = E2eError::Spawn {
                    command: request.command.join(" "),
                    source,
                };
                error!("{}", err);
                return (RunStatus::Failed(err.to_string()), Some(consumer));
            }
        };

        // Attached before any line reaches the consumer task.
        let handle = ProcessHandle::from_child(&child);
        if let Some(handle) = handle {
            debug!("{} started with PID {}", program, handle.pid());
            consumer.attach(handle);
        }

        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, tx.clone())));
        }
        drop(tx);

        let stop = CancellationToken::new();
        let mut drain = tokio::spawn(drain_lines(rx, consumer, stop.clone()));

        info!(
            "Waiting for command to finish within {} seconds",
            request.timeout.as_secs()
        );

        let mut status = match timeout(request.timeout, child.wait()).await {
            Ok(Ok(exit)) => match exit_value(&exit) {
                Some(PROCESS_KILLED) => {
                    warn!("{} killed abruptly", program);
                    RunStatus::Killed
                }
                value => {
                    debug!("{} exited with {:?}", program, value);
                    RunStatus::Exited(value)
                }
            },
            Ok(Err(e)) => {
                error!("Failed waiting for {}: {}", program, e);
                RunStatus::Failed(format!("wait failed: {}", e))
            }
            Err(_) => {
                warn!("{} timed out", program);
                match handle {
                    Some(handle) => {
                        handle.kill();
                    }
                    None => {
                        let _ = child.start_kill();
                    }
                }
                RunStatus::TimedOut
            }
        };

        // Orphaned descendants may hold the pipes open; stop draining after
        // the grace period and keep whatever was already buffered.
        let drained = match timeout(self.config.drain_grace, &mut drain).await {
            Ok(joined) => joined,
            Err(_) => {
                debug!("Output still open after {:?}, stopping consumer", self.config.drain_grace);
                stop.cancel();
                drain.await
            }
        };

        for reader in readers {
            reader.abort();
        }

        match drained {
            Ok((consumer, read_error)) => {
                if let Some(e) = read_error {
                    error!("Failed reading output of {}: {}", program, e);
                    if !matches!(status, RunStatus::Failed(_)) {
                        status = RunStatus::Failed(format!("output read failed: {}", e));
                    }
                }
                (status, Some(consumer))
            }
            Err(e) => {
                error!("Output consumer for {} failed: {}", program, e);
                (RunStatus::Failed(format!("output consumer failed: {}", e)), None)
            }
        }
    }
}

/// Read `reader` line by line into `tx`. Invalid UTF-8 is replaced, a
/// trailing `\r` is stripped.
async fn forward_lines<R>(reader: R, tx: mpsc::Sender<std::io::Result<String>>)
where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(reader).split(b'\n');
    loop {
        match segments.next_segment().await {
            Ok(Some(bytes)) => {
                if tx.send(Ok(decode_line(&bytes))).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
}

/// Feed every received line to `consumer` until the channel closes or `stop`
/// fires. Returns the consumer and the first read error, if any.
async fn drain_lines<C>(
    mut rx: mpsc::Receiver<std::io::Result<String>>,
    mut consumer: C,
    stop: CancellationToken,
) -> (C, Option<std::io::Error>)
where
    C: LineConsumer,
{
    let mut read_error = None;
    let mut handle = |item: std::io::Result<String>, consumer: &mut C| match item {
        Ok(line) => consumer.consume(&line),
        Err(e) => {
            read_error.get_or_insert(e);
        }
    };

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                while let Ok(item) = rx.try_recv() {
                    handle(item, &mut consumer);
                }
                break;
            }
            item = rx.recv() => match item {
                Some(item) => handle(item, &mut consumer),
                None => break,
            },
        }
    }

    (consumer, read_error)
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_line_strips_carriage_return() {
        assert_eq!(decode_line(b"hello\r"), "hello");
        assert_eq!(decode_line(b"plain"), "plain");
    }

    #[test]
    fn test_decode_line_replaces_invalid_utf8() {
        assert_eq!(decode_line(b"a\xffb"), "a\u{fffd}b");
    }

    #[test]
    fn test_default_env_forces_basic_console() {
        let config = SupervisorConfig::default();
        assert_eq!(
            config.env.get("QUARKUS_CONSOLE_BASIC").map(String::as_str),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_empty_command_fails_run() {
        let supervisor = Supervisor::new(SupervisorConfig::default());
        let request = RunRequest {
            directory: PathBuf::from("."),
            command: vec![],
            env: BTreeMap::new(),
            timeout: Duration::from_secs(1),
        };

        let outcome = supervisor.run(&request, vec![]).await;
        assert!(!outcome.passed);
        assert!(matches!(outcome.status, RunStatus::Failed(_)));
    }
}
