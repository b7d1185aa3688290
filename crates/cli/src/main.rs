//! smokerun CLI - Main Entry Point
//!
//! Scaffolds the requested sample projects if needed, then runs the native
//! build and dev-mode checks against each and prints the results.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use smokerun_e2e::catalog::{DEV_MODE, NATIVE_BUILD};
use smokerun_e2e::{Catalog, Harness, HarnessConfig, SinkConfig, SupervisorConfig};

/// smokerun - supervised smoke runs of sample projects
#[derive(Parser, Debug)]
#[command(name = "smokerun")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The directories to use as test projects
    #[arg(value_delimiter = ',', num_args = 1.., default_value = "postgres")]
    targets: Vec<String>,

    /// Echo every output line of the supervised commands
    #[arg(short, long)]
    verbose: bool,

    /// Timeout in seconds for each supervised command
    #[arg(short, long, default_value = "60")]
    timeout: u64,

    /// Run dev-mode tests (default)
    #[arg(long, overrides_with = "no_dev")]
    dev: bool,

    /// Skip dev-mode tests
    #[arg(long, overrides_with = "dev")]
    no_dev: bool,

    /// Run native build tests (default)
    #[arg(short = 'n', long, overrides_with = "no_native")]
    native: bool,

    /// Skip native build tests
    #[arg(long, overrides_with = "native")]
    no_native: bool,

    /// Container runtime to use. Default: let the build tool decide
    #[arg(short, long)]
    container_runtime: Option<String>,

    /// YAML scenario catalog replacing the built-in one
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Directory for the per-project log files
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,
}

impl Cli {
    fn disabled_kinds(&self) -> BTreeSet<String> {
        let mut disabled = BTreeSet::new();
        if self.no_native && !self.native {
            disabled.insert(NATIVE_BUILD.to_string());
        }
        if self.no_dev && !self.dev {
            disabled.insert(DEV_MODE.to_string());
        }
        disabled
    }

    fn harness_config(&self) -> HarnessConfig {
        HarnessConfig {
            targets: self.targets.clone(),
            base_dir: PathBuf::from("."),
            timeout: Duration::from_secs(self.timeout),
            container_runtime: self.container_runtime.clone(),
            disabled_kinds: self.disabled_kinds(),
            supervisor: SupervisorConfig {
                sink: SinkConfig {
                    verbose: self.verbose,
                    log_dir: self.log_dir.clone(),
                },
                ..Default::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let catalog = match &cli.catalog {
        Some(path) => Catalog::from_yaml_file(path)
            .with_context(|| format!("loading catalog {}", path.display()))?,
        None => Catalog::builtin(),
    };

    let harness = Harness::new(cli.harness_config(), catalog);

    match harness.run().await {
        Ok(results) => {
            println!("Test results: {}", results);
            Ok(())
        }
        Err(e) => {
            println!("{}", e);
            std::process::exit(e.exit_code());
        }
    }
}
