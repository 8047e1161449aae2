//! Runtime backed by a directory on the local machine.

use super::{CHANNEL_CAPACITY, CommandOutput, PortEvent, SandboxRuntime, ShellSession, detect_port};
use crate::errors::SandboxError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// How long to keep collecting output after the process has exited.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Files live under `root`; commands run as `<shell> -c <command>` in `root`.
pub struct LocalRuntime {
    root: PathBuf,
    shell: String,
    output_tx: broadcast::Sender<String>,
    port_tx: broadcast::Sender<PortEvent>,
}

impl LocalRuntime {
    pub fn new(root: impl Into<PathBuf>, shell: impl Into<String>) -> Result<Self, SandboxError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(SandboxError::MissingRoot { path: root });
        }
        let (output_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (port_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Ok(Self {
            root,
            shell: shell.into(),
            output_tx,
            port_tx,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a sandbox-relative path onto the root, refusing anything that
    /// would land outside it.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, SandboxError> {
        let mut relative = PathBuf::new();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => relative.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !relative.pop() {
                        return Err(SandboxError::PathEscape { path: path.into() });
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(SandboxError::PathEscape { path: path.into() });
                }
            }
        }
        if relative.as_os_str().is_empty() {
            return Err(SandboxError::PathEscape { path: path.into() });
        }
        Ok(self.root.join(relative))
    }

    fn record_line(&self, line: &str, output: &mut String) {
        output.push_str(line);
        output.push('\n');
        // No subscribers is fine.
        let _ = self.output_tx.send(line.to_string());
        if let Some(event) = detect_port(line) {
            tracing::debug!(port = event.port, "Detected listening port");
            let _ = self.port_tx.send(event);
        }
    }
}

async fn kill_group(child: &mut AsyncGroupChild, command: &str) {
    if let Err(e) = child.kill().await {
        tracing::warn!(command, error = %e, "Failed to kill aborted command group");
        return;
    }
    if let Err(e) = child.wait().await {
        tracing::debug!(command, error = %e, "Failed to reap aborted command group");
    }
}

fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

#[async_trait]
impl SandboxRuntime for LocalRuntime {
    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        tokio::fs::write(&target, content)
            .await
            .with_context(|| format!("Failed to write {}", target.display()))?;
        tracing::debug!(path, bytes = content.len(), "Wrote file");
        Ok(())
    }

    async fn path_exists(&self, path: &str) -> Result<bool> {
        let target = self.resolve(path)?;
        tokio::fs::try_exists(&target)
            .await
            .with_context(|| format!("Failed to stat {}", target.display()))
    }

    fn port_events(&self) -> broadcast::Receiver<PortEvent> {
        self.port_tx.subscribe()
    }
}

#[async_trait]
impl ShellSession for LocalRuntime {
    async fn ready(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(SandboxError::MissingRoot {
                path: self.root.clone(),
            }
            .into());
        }
        Ok(())
    }

    async fn execute(&self, command: &str, cancel: CancellationToken) -> Result<CommandOutput> {
        tracing::debug!(command, shell = %self.shell, "Spawning command");

        // The shell leads its own process group so cancelling reaches
        // anything it backgrounded as well.
        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .group()
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SandboxError::SpawnFailed {
                shell: self.shell.clone(),
                source,
            })?;

        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.inner().stdout.take() {
            forward_lines(stdout, line_tx.clone());
        }
        if let Some(stderr) = child.inner().stderr.take() {
            forward_lines(stderr, line_tx.clone());
        }
        drop(line_tx);

        let mut output = String::new();
        let status = loop {
            let exited = tokio::select! {
                _ = cancel.cancelled() => None,
                Some(line) = line_rx.recv() => {
                    self.record_line(&line, &mut output);
                    continue;
                }
                status = child.wait() => Some(status),
            };
            match exited {
                Some(status) => {
                    break status.with_context(|| format!("Failed to wait for `{}`", command))?;
                }
                None => {
                    kill_group(&mut child, command).await;
                    return Ok(CommandOutput { exit_code: None, output });
                }
            }
        };

        let drain = async {
            while let Some(line) = line_rx.recv().await {
                self.record_line(&line, &mut output);
            }
        };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            tracing::debug!(command, "Output still open after exit; detaching");
        }

        tracing::debug!(command, exit_code = ?status.code(), "Command finished");
        Ok(CommandOutput {
            exit_code: status.code(),
            output,
        })
    }

    fn output(&self) -> broadcast::Receiver<String> {
        self.output_tx.subscribe()
    }
}
