//! Orchestrates scaffolding and one supervised run per target and kind

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{error, info, warn};

use crate::catalog::{Catalog, KindSpec};
use crate::error::{E2eError, E2eResult};
use crate::supervisor::{RunOutcome, RunRequest, RunStatus, Supervisor, SupervisorConfig};

/// Configuration for a harness invocation
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Target directory names, relative to `base_dir`
    pub targets: Vec<String>,

    /// Where targets live and scaffold commands run
    pub base_dir: PathBuf,

    /// Bound on each supervised run
    pub timeout: Duration,

    /// Forwarded to kinds that accept a container runtime flag
    pub container_runtime: Option<String>,

    /// Catalog kinds to skip
    pub disabled_kinds: BTreeSet<String>,

    pub supervisor: SupervisorConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            targets: vec!["postgres".to_string()],
            base_dir: PathBuf::from("."),
            timeout: Duration::from_secs(60),
            container_runtime: None,
            disabled_kinds: BTreeSet::new(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

/// Scenario id -> verdict, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioResults {
    entries: Vec<(String, bool)>,
}

impl ScenarioResults {
    /// Record a scenario. Ids are unique; a repeated id keeps its first verdict.
    pub fn insert(&mut self, id: impl Into<String>, passed: bool) {
        let id = id.into();
        if self.get(&id).is_some() {
            warn!("Scenario {} already recorded", id);
            return;
        }
        self.entries.push((id, passed));
    }

    pub fn get(&self, id: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|(name, _)| name == id)
            .map(|(_, passed)| *passed)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.entries.iter().map(|(name, passed)| (name.as_str(), *passed))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn all_passed(&self) -> bool {
        self.entries.iter().all(|(_, passed)| *passed)
    }
}

impl fmt::Display for ScenarioResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, passed)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", name, passed)?;
        }
        f.write_str("}")
    }
}

/// Runs every enabled catalog kind against every target
pub struct Harness {
    config: HarnessConfig,
    catalog: Catalog,
    supervisor: Supervisor,
}

impl Harness {
    pub fn new(config: HarnessConfig, catalog: Catalog) -> Self {
        let supervisor = Supervisor::new(config.supervisor.clone());
        Self {
            config,
            catalog,
            supervisor,
        }
    }

    /// Scaffold missing targets, then run all scenarios.
    pub async fn run(&self) -> E2eResult<ScenarioResults> {
        self.prepare().await?;
        Ok(self.run_scenarios().await)
    }

    /// Make sure every target directory exists before any run starts.
    ///
    /// A missing target is scaffolded with its catalog setup command; a
    /// missing target without one, or a target that is not a directory,
    /// aborts the invocation.
    pub async fn prepare(&self) -> E2eResult<()> {
        for target in &self.config.targets {
            let path = self.config.base_dir.join(target);

            if !path.exists() {
                let command = self
                    .catalog
                    .setup(target)
                    .ok_or_else(|| E2eError::NoSetupCommand(target.clone()))?;
                self.scaffold(target, command).await?;
            } else if path.is_dir() {
                info!("Skipping {} as it already exists", target);
            } else {
                return Err(E2eError::NotADirectory(path));
            }
        }
        Ok(())
    }

    async fn scaffold(&self, target: &str, command: &[String]) -> E2eResult<()> {
        let Some((program, args)) = command.split_first() else {
            return Err(E2eError::EmptyCommand(target.to_string()));
        };

        info!("Creating {} with {}", target, command.join(" "));

        let status = Command::new(program)
            .args(args)
            .current_dir(&self.config.base_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| E2eError::Scaffold {
                target: target.to_string(),
                source,
            })?;

        if !status.success() {
            warn!("Setup command for {} exited with {}", target, status);
        }
        Ok(())
    }

    /// Run every enabled kind for every target, in order.
    pub async fn run_scenarios(&self) -> ScenarioResults {
        let mut results = ScenarioResults::default();

        for target in &self.config.targets {
            info!("Testing {}", target);

            for kind in self.enabled_kinds() {
                let id = format!("{}-{}", target, kind.name);
                let outcome = self.run_kind(target, kind).await;
                eprint!("{}", outcome.report);
                results.insert(id, outcome.passed);
            }
        }

        results
    }

    fn enabled_kinds(&self) -> impl Iterator<Item = &KindSpec> {
        self.catalog
            .kinds
            .iter()
            .filter(|kind| !self.config.disabled_kinds.contains(&kind.name))
    }

    async fn run_kind(&self, target: &str, kind: &KindSpec) -> RunOutcome {
        let patterns = match kind.watch_patterns() {
            Ok(patterns) => patterns,
            Err(e) => {
                error!("{}-{}: {}", target, kind.name, e);
                return RunOutcome {
                    passed: false,
                    report: String::new(),
                    status: RunStatus::Failed(e.to_string()),
                };
            }
        };

        let request = RunRequest {
            directory: self.config.base_dir.join(target),
            command: kind.command_line(self.config.container_runtime.as_deref()),
            env: Default::default(),
            timeout: self.config.timeout,
        };

        self.supervisor.run(&request, patterns).await
    }
}
