//! Configuration for the artifact runner.
//!
//! Settings are read from `artifact-runner.toml` in the project directory and
//! layered file → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [parser]
//! artifact_tag = "artifact"
//! action_tag = "action"
//! strip_fences = true
//!
//! [commands]
//! install = ["npm install", "pnpm install"]
//! build = ["npm run build"]
//! start = ["npm run dev"]
//!
//! [queue]
//! start_settle_ms = 2000
//!
//! [start]
//! ready_timeout_secs = 0
//!
//! [build]
//! output_dirs = ["dist", "build"]
//!
//! [sandbox]
//! root = "."
//! shell = "sh"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in the project directory.
pub const CONFIG_FILE: &str = "artifact-runner.toml";

/// Tag names used by the streaming parser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParserSection {
    #[serde(default = "default_artifact_tag")]
    pub artifact_tag: String,
    #[serde(default = "default_action_tag")]
    pub action_tag: String,
    /// Strip markdown code fences from file content.
    #[serde(default = "default_true")]
    pub strip_fences: bool,
}

fn default_artifact_tag() -> String {
    "artifact".to_string()
}

fn default_action_tag() -> String {
    "action".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ParserSection {
    fn default() -> Self {
        Self {
            artifact_tag: default_artifact_tag(),
            action_tag: default_action_tag(),
            strip_fences: true,
        }
    }
}

/// Known command lines per classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandsSection {
    #[serde(default = "default_install_commands")]
    pub install: Vec<String>,
    #[serde(default = "default_build_commands")]
    pub build: Vec<String>,
    #[serde(default = "default_start_commands")]
    pub start: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_install_commands() -> Vec<String> {
    strings(&[
        "npm install",
        "npm i",
        "npm ci",
        "pnpm install",
        "pnpm i",
        "yarn",
        "yarn install",
        "bun install",
    ])
}

fn default_build_commands() -> Vec<String> {
    strings(&[
        "npm run build",
        "pnpm build",
        "pnpm run build",
        "yarn build",
        "yarn run build",
        "bun run build",
    ])
}

fn default_start_commands() -> Vec<String> {
    strings(&[
        "npm run dev",
        "npm start",
        "npm run start",
        "npm run preview",
        "pnpm dev",
        "pnpm run dev",
        "pnpm start",
        "yarn dev",
        "yarn start",
        "bun run dev",
    ])
}

impl Default for CommandsSection {
    fn default() -> Self {
        Self {
            install: default_install_commands(),
            build: default_build_commands(),
            start: default_start_commands(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueSection {
    /// Delay after launching a start action before the queue moves on.
    #[serde(default = "default_start_settle_ms")]
    pub start_settle_ms: u64,
}

fn default_start_settle_ms() -> u64 {
    2000
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            start_settle_ms: default_start_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StartSection {
    /// Seconds to wait for a port before raising a warning alert. 0 disables.
    #[serde(default)]
    pub ready_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildSection {
    /// Candidate output directories, checked in order after a build succeeds.
    #[serde(default = "default_output_dirs")]
    pub output_dirs: Vec<String>,
}

fn default_output_dirs() -> Vec<String> {
    strings(&["dist", "build", "out", ".next"])
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            output_dirs: default_output_dirs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SandboxSection {
    /// Sandbox root, relative to the project directory.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_shell() -> String {
    "sh".to_string()
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            root: default_root(),
            shell: default_shell(),
        }
    }
}

/// The complete `artifact-runner.toml` structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunnerToml {
    #[serde(default)]
    pub parser: ParserSection,
    #[serde(default)]
    pub commands: CommandsSection,
    #[serde(default)]
    pub queue: QueueSection,
    #[serde(default)]
    pub start: StartSection,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub sandbox: SandboxSection,
}

impl RunnerToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse artifact-runner.toml")
    }

    /// Load from `<project_dir>/artifact-runner.toml`, or defaults if absent.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize artifact-runner.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.parser.artifact_tag.trim().is_empty() {
            warnings.push("parser.artifact_tag is empty".to_string());
        }
        if self.parser.action_tag.trim().is_empty() {
            warnings.push("parser.action_tag is empty".to_string());
        }
        if self.parser.artifact_tag == self.parser.action_tag {
            warnings.push(format!(
                "parser.artifact_tag and parser.action_tag are both '{}'",
                self.parser.action_tag
            ));
        }

        let categories = [
            ("install", &self.commands.install),
            ("build", &self.commands.build),
            ("start", &self.commands.start),
        ];
        for (i, (name, list)) in categories.iter().enumerate() {
            for (other_name, other_list) in categories.iter().skip(i + 1) {
                for command in list.iter() {
                    if other_list.contains(command) {
                        warnings.push(format!(
                            "Command '{}' is listed under both commands.{} and commands.{}",
                            command, name, other_name
                        ));
                    }
                }
            }
        }

        if self.build.output_dirs.is_empty() {
            warnings.push("build.output_dirs is empty; build results will report no directory".to_string());
        }

        warnings
    }
}

/// Resolved runtime configuration: the TOML file plus environment and CLI overrides.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub project_dir: PathBuf,
    pub toml: RunnerToml,
    pub verbose: bool,
    /// Whether `artifact-runner.toml` was found.
    pub from_file: bool,
}

impl RunnerConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let from_file = project_dir.join(CONFIG_FILE).exists();
        let toml = RunnerToml::load_or_default(&project_dir)?;
        Ok(Self {
            project_dir,
            toml,
            verbose: false,
            from_file,
        })
    }

    pub fn with_cli_args(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        Ok(config)
    }

    /// Absolute sandbox root.
    pub fn sandbox_root(&self) -> PathBuf {
        let root = &self.toml.sandbox.root;
        if root.is_absolute() {
            root.clone()
        } else {
            self.project_dir.join(root)
        }
    }

    /// Shell used to run commands (env → file).
    pub fn shell(&self) -> String {
        std::env::var("ARTIFACT_RUNNER_SHELL").unwrap_or_else(|_| self.toml.sandbox.shell.clone())
    }

    /// Settling delay after a start action (env → file).
    pub fn start_settle(&self) -> Duration {
        let ms = std::env::var("ARTIFACT_RUNNER_SETTLE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(self.toml.queue.start_settle_ms);
        Duration::from_millis(ms)
    }

    pub fn ready_timeout(&self) -> Option<Duration> {
        match self.toml.start.ready_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
