//! Scenario catalogs: scaffold commands and test kinds
//!
//! A catalog is plain data handed to the [`Harness`](crate::harness::Harness).
//! The built-in one covers the Quarkus sample projects; a YAML file with the
//! same shape can replace it:
//!
//! ```yaml
//! setups:
//!   postgres: [quarkus, create, app, -x, "jdbc-postgres,hibernate-orm", postgres]
//! kinds:
//!   - name: quarkusdev
//!     command: [quarkus, dev]
//!     patterns:
//!       - pattern: "^Caused by"
//!         label: Stacktraces in output
//!         break_on_match: true
//!         fail_on_find: true
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::pattern::{compile_all, PatternSpec, WatchPattern};

/// Kind name of the native build scenario
pub const NATIVE_BUILD: &str = "nativebuild";

/// Kind name of the dev-mode scenario
pub const DEV_MODE: &str = "quarkusdev";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Target name -> command that scaffolds it in the base directory
    #[serde(default)]
    pub setups: BTreeMap<String, Vec<String>>,

    /// Test kinds, run in this order for every target
    #[serde(default)]
    pub kinds: Vec<KindSpec>,
}

/// One kind of supervised run performed against every target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindSpec {
    /// Suffix of the scenario id (`<target>-<name>`)
    pub name: String,

    /// Program and arguments, run inside the target directory
    pub command: Vec<String>,

    #[serde(default)]
    pub patterns: Vec<PatternSpec>,

    /// When set and a container runtime is chosen, `<flag><runtime>` is
    /// appended to the command
    #[serde(default)]
    pub container_runtime_flag: Option<String>,
}

impl KindSpec {
    /// Full command line for this kind.
    pub fn command_line(&self, container_runtime: Option<&str>) -> Vec<String> {
        let mut command = self.command.clone();
        if let (Some(flag), Some(runtime)) = (&self.container_runtime_flag, container_runtime) {
            command.push(format!("{}{}", flag, runtime));
        }
        command
    }

    /// Fresh, unmatched patterns for one run.
    pub fn watch_patterns(&self) -> E2eResult<Vec<WatchPattern>> {
        compile_all(&self.patterns)
    }
}

impl Catalog {
    /// Quarkus sample projects and their native-build / dev-mode checks.
    pub fn builtin() -> Self {
        let mut setups = BTreeMap::new();
        setups.insert(
            "postgres".to_string(),
            words("quarkus create app -x jdbc-postgres,hibernate-orm postgres"),
        );
        setups.insert(
            "kafka".to_string(),
            words("quarkus create app -x quarkus-smallrye-reactive-messaging-kafka kafka"),
        );
        setups.insert(
            "kubernetes".to_string(),
            words("quarkus create app -x kubernetes kubernetes"),
        );

        let native = KindSpec {
            name: NATIVE_BUILD.to_string(),
            command: words("quarkus build --native -Dquarkus.native.container-build=true -DskipTests"),
            patterns: vec![PatternSpec::new(
                ".*-runner: Permission denied.*",
                "Permission denied on runner creation",
                false,
                false,
            )],
            container_runtime_flag: Some("-Dquarkus.native.container-runtime=".to_string()),
        };

        let dev = KindSpec {
            name: DEV_MODE.to_string(),
            command: words("quarkus dev"),
            patterns: vec![
                PatternSpec::new(
                    ".*Creating container for image: testcontainers/ryuk:.*",
                    "Ryuk container creation",
                    false,
                    false,
                ),
                PatternSpec::new(
                    ".*Container testcontainers/ryuk:.* started.*",
                    "Ryuk container started",
                    false,
                    false,
                ),
                PatternSpec::new("^Caused by", "Stacktraces in output", true, true),
                // Startup reached: stop dev mode, the run is done.
                PatternSpec::new("^.*Installed features.*", "Quarkus reached installed features", true, false),
            ],
            container_runtime_flag: None,
        };

        Self {
            setups,
            kinds: vec![native, dev],
        }
    }

    /// Parse and validate a YAML catalog.
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let catalog: Catalog = serde_yaml::from_str(yaml)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_yaml_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Reject empty commands, duplicate kind names and bad regexes up front.
    pub fn validate(&self) -> E2eResult<()> {
        for (name, command) in &self.setups {
            if command.is_empty() {
                return Err(E2eError::Catalog(format!("setup '{}' has an empty command", name)));
            }
        }

        let mut seen = HashSet::new();
        for kind in &self.kinds {
            if !seen.insert(kind.name.as_str()) {
                return Err(E2eError::Catalog(format!("duplicate kind '{}'", kind.name)));
            }
            if kind.command.is_empty() {
                return Err(E2eError::Catalog(format!("kind '{}' has an empty command", kind.name)));
            }
            kind.watch_patterns()?;
        }
        Ok(())
    }

    pub fn setup(&self, target: &str) -> Option<&[String]> {
        self.setups.get(target).map(Vec::as_slice)
    }

    pub fn kind(&self, name: &str) -> Option<&KindSpec> {
        self.kinds.iter().find(|k| k.name == name)
    }
}

fn words(command: &str) -> Vec<String> {
    command.split_whitespace().map(String::from).collect()
}
