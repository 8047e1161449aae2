//! Sandbox runtime seams.
//!
//! The runner never touches the filesystem or spawns processes directly. It
//! goes through `SandboxRuntime` for files and port notifications and through
//! `ShellSession` for commands. `LocalRuntime` backs both with a directory on
//! disk; `ScriptedRuntime` is an in-memory double used by tests and dry runs.

pub mod local;
pub mod scripted;

pub use local::LocalRuntime;
pub use scripted::{ScriptedCommand, ScriptedRuntime};

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Capacity of the broadcast channels for terminal output and port events.
pub const CHANNEL_CAPACITY: usize = 256;

/// A server inside the sandbox started listening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortEvent {
    pub port: u16,
    pub url: String,
}

/// Result of one shell command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed or aborted.
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr.
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Files and port notifications of the sandbox.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Write `content` to `path`, relative to the sandbox root. Creates
    /// parent directories.
    async fn write_file(&self, path: &str, content: &str) -> Result<()>;

    async fn path_exists(&self, path: &str) -> Result<bool>;

    fn port_events(&self) -> broadcast::Receiver<PortEvent>;
}

/// Interactive shell of the sandbox. One command at a time per caller.
#[async_trait]
pub trait ShellSession: Send + Sync {
    /// Resolves once the shell accepts commands.
    async fn ready(&self) -> Result<()>;

    /// Run `command` to completion, or until `cancel` fires.
    async fn execute(&self, command: &str, cancel: CancellationToken) -> Result<CommandOutput>;

    /// Live terminal output, line by line.
    fn output(&self) -> broadcast::Receiver<String>;
}

static PORT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:https?://)?(?:localhost|127\.0\.0\.1|0\.0\.0\.0|\[::\]):(\d{2,5})").unwrap()
});

/// Port announced by a line of server output, if any.
pub fn detect_port(line: &str) -> Option<PortEvent> {
    let caps = PORT_PATTERN.captures(line)?;
    let port: u16 = caps.get(1)?.as_str().parse().ok()?;
    if port == 0 {
        return None;
    }
    Some(PortEvent {
        port,
        url: format!("http://localhost:{}", port),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_port_from_dev_server_banners() {
        let cases = [
            ("  ➜  Local:   http://localhost:5173/", 5173),
            ("Server listening on 127.0.0.1:3000", 3000),
            ("ready - started server on 0.0.0.0:8080, url: http://localhost:8080", 8080),
        ];
        for (line, port) in cases {
            let event = detect_port(line).unwrap();
            assert_eq!(event.port, port, "line: {}", line);
            assert_eq!(event.url, format!("http://localhost:{}", port));
        }
    }

    #[test]
    fn test_detect_port_ignores_other_lines() {
        assert!(detect_port("added 120 packages in 3s").is_none());
        assert!(detect_port("see https://example.com:443/docs").is_none());
        assert!(detect_port("localhost:99999").is_none());
    }

    #[test]
    fn test_command_output_success() {
        let ok = CommandOutput {
            exit_code: Some(0),
            output: String::new(),
        };
        assert!(ok.success());
        assert!(!CommandOutput::default().success());
    }
}
