//! Typed error hierarchy for the artifact runner.
//!
//! - `CommandError`: a shell command exited unsuccessfully
//! - `ActionError`: a single enqueued action failed
//! - `SandboxError`: the sandboxed runtime rejected an operation

use std::path::PathBuf;
use thiserror::Error;

/// A shell command that ran to completion with a failing exit code.
///
/// `header` is a short, human-readable summary; `output` is the full captured
/// process output so a reader can diagnose the failure without re-running it.
#[derive(Debug, Clone, Error)]
#[error("{header}")]
pub struct CommandError {
    pub header: String,
    pub output: String,
    pub exit_code: Option<i32>,
}

impl CommandError {
    pub fn new(header: impl Into<String>, output: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            header: header.into(),
            output: output.into(),
            exit_code,
        }
    }
}

/// Errors observed by a caller awaiting one enqueued action.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Action runner has shut down")]
    RunnerClosed,
}

impl ActionError {
    /// The captured process output, if this error came from a command.
    pub fn output(&self) -> Option<&str> {
        match self {
            ActionError::Command(e) => Some(&e.output),
            _ => None,
        }
    }
}

/// Errors from the sandboxed runtime itself.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Path {path} escapes the sandbox root")]
    PathEscape { path: PathBuf },

    #[error("Sandbox root {path} does not exist")]
    MissingRoot { path: PathBuf },

    #[error("Failed to spawn shell `{shell}`: {source}")]
    SpawnFailed {
        shell: String,
        #[source]
        source: std::io::Error,
    },
}
