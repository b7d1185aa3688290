//! smokerun E2E engine
//!
//! Runs an external build or dev-mode command per sample project and decides
//! pass/fail from its output:
//! - Spawns the command in its own process group with piped output
//! - Classifies every output line against typed watch patterns
//! - Kills the run early when a break-on-match pattern fires, or on timeout
//! - Renders a verdict and a per-pattern report
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Harness                                                    │
//! │    ├── prepare()       scaffold missing targets             │
//! │    └── run_scenarios() target × kind -> ScenarioResults     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Supervisor::run(RunRequest, [WatchPattern]) -> RunOutcome  │
//! │    ├── stdout/stderr readers ──mpsc──> consumer task        │
//! │    └── wait with timeout, SIGKILL on expiry                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  LogSink (LineConsumer)                                     │
//! │    ├── echo "<dir>: <line>" when verbose                    │
//! │    ├── append to <dir>.log                                  │
//! │    └── LineClassifier -> SIGTERM on break-on-match          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  verdict::evaluate / verdict::report                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod classifier;
pub mod error;
pub mod harness;
pub mod pattern;
pub mod process;
pub mod sink;
pub mod supervisor;
pub mod verdict;

pub use catalog::{Catalog, KindSpec};
pub use error::{E2eError, E2eResult};
pub use harness::{Harness, HarnessConfig, ScenarioResults};
pub use pattern::{PatternSpec, WatchPattern};
pub use sink::{LineConsumer, LogSink, SinkConfig};
pub use supervisor::{RunOutcome, RunRequest, RunStatus, Supervisor, SupervisorConfig};
