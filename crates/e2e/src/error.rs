//! Error types for supervised smoke runs

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Invalid watch pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Empty command line for {0}")]
    EmptyCommand(String),

    #[error("No dir nor setup command found for {0}")]
    NoSetupCommand(String),

    #[error("{} is not a directory. Abort.", .0.display())]
    NotADirectory(PathBuf),

    #[error("Setup command for {target} could not be run: {source}")]
    Scaffold {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl E2eError {
    /// Process exit code for errors that abort the whole invocation.
    pub fn exit_code(&self) -> i32 {
        match self {
            E2eError::NotADirectory(_) => 100,
            E2eError::NoSetupCommand(_) => 200,
            _ => 1,
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
