//! In-memory runtime with scripted command outcomes.
//!
//! Nothing touches the disk and no process is spawned. Commands without a
//! script succeed immediately with empty output. Every write and command is
//! recorded so callers can check ordering afterwards.

use super::{CHANNEL_CAPACITY, CommandOutput, PortEvent, SandboxRuntime, ShellSession};
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Outcome of one scripted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCommand {
    pub exit_code: i32,
    pub output: String,
    pub delay: Duration,
    /// Run until cancelled, like a dev server.
    pub hang: bool,
    pub port: Option<u16>,
}

impl ScriptedCommand {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            output: output.into(),
            delay: Duration::ZERO,
            hang: false,
            port: None,
        }
    }

    pub fn fail(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            ..Self::ok(output)
        }
    }

    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Self::ok("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn announcing_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }
}

pub struct ScriptedRuntime {
    files: Mutex<BTreeMap<String, String>>,
    scripts: Mutex<HashMap<String, ScriptedCommand>>,
    failing_writes: Mutex<HashSet<String>>,
    log: Mutex<Vec<String>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
    output_tx: broadcast::Sender<String>,
    port_tx: broadcast::Sender<PortEvent>,
}

impl Default for ScriptedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        let (output_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (port_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            files: Mutex::default(),
            scripts: Mutex::default(),
            failing_writes: Mutex::default(),
            log: Mutex::default(),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            output_tx,
            port_tx,
        }
    }

    pub fn script(&self, command: &str, outcome: ScriptedCommand) {
        lock(&self.scripts).insert(command.to_string(), outcome);
    }

    /// Make every write to `path` fail.
    pub fn fail_writes_to(&self, path: &str) {
        lock(&self.failing_writes).insert(path.to_string());
    }

    pub fn seed_file(&self, path: &str, content: &str) {
        lock(&self.files).insert(path.to_string(), content.to_string());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        lock(&self.files).get(path).cloned()
    }

    pub fn files(&self) -> BTreeMap<String, String> {
        lock(&self.files).clone()
    }

    /// Every operation in the order it happened: `write:<path>`,
    /// `exec:<command>` and `done:<command>`.
    pub fn log(&self) -> Vec<String> {
        lock(&self.log).clone()
    }

    /// Commands in the order they were started.
    pub fn executed(&self) -> Vec<String> {
        lock(&self.log)
            .iter()
            .filter_map(|entry| entry.strip_prefix("exec:").map(str::to_string))
            .collect()
    }

    /// Highest number of commands that were running at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn record(&self, entry: String) {
        lock(&self.log).push(entry);
    }

    fn emit_line(&self, line: &str) {
        let _ = self.output_tx.send(line.to_string());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl SandboxRuntime for ScriptedRuntime {
    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        if lock(&self.failing_writes).contains(path) {
            bail!("Permission denied: {}", path);
        }
        lock(&self.files).insert(path.to_string(), content.to_string());
        self.record(format!("write:{}", path));
        Ok(())
    }

    async fn path_exists(&self, path: &str) -> Result<bool> {
        Ok(lock(&self.files).contains_key(path))
    }

    fn port_events(&self) -> broadcast::Receiver<PortEvent> {
        self.port_tx.subscribe()
    }
}

#[async_trait]
impl ShellSession for ScriptedRuntime {
    async fn ready(&self) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, command: &str, cancel: CancellationToken) -> Result<CommandOutput> {
        let outcome = lock(&self.scripts)
            .get(command)
            .cloned()
            .unwrap_or_else(|| ScriptedCommand::ok(""));

        self.record(format!("exec:{}", command));
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        for line in outcome.output.lines() {
            self.emit_line(line);
        }
        if let Some(port) = outcome.port {
            self.emit_line(&format!("Local: http://localhost:{}/", port));
            let _ = self.port_tx.send(PortEvent {
                port,
                url: format!("http://localhost:{}", port),
            });
        }

        let finished = async {
            tokio::time::sleep(outcome.delay).await;
            if outcome.hang {
                std::future::pending::<()>().await;
            }
        };
        let cancelled = tokio::select! {
            _ = cancel.cancelled() => true,
            _ = finished => false,
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.record(format!("done:{}", command));

        Ok(CommandOutput {
            exit_code: if cancelled { None } else { Some(outcome.exit_code) },
            output: outcome.output,
        })
    }

    fn output(&self) -> broadcast::Receiver<String> {
        self.output_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unscripted_commands_succeed() {
        let runtime = ScriptedRuntime::new();
        let out = runtime.execute("ls", CancellationToken::new()).await.unwrap();
        assert!(out.success());
        assert_eq!(runtime.executed(), vec!["ls"]);
    }

    #[tokio::test]
    async fn test_scripted_failure_and_output() {
        let runtime = ScriptedRuntime::new();
        runtime.script("npm install", ScriptedCommand::fail(1, "EACCES"));
        let mut lines = runtime.output();

        let out = runtime
            .execute("npm install", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(1));
        assert_eq!(out.output, "EACCES");
        assert_eq!(lines.recv().await.unwrap(), "EACCES");
    }

    #[tokio::test]
    async fn test_hanging_command_stops_on_cancel() {
        let runtime = ScriptedRuntime::new();
        runtime.script("npm run dev", ScriptedCommand::hang().announcing_port(5173));
        let mut ports = runtime.port_events();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let out = runtime.execute("npm run dev", cancel).await.unwrap();
        assert_eq!(out.exit_code, None);
        assert_eq!(ports.recv().await.unwrap().port, 5173);
        assert_eq!(runtime.log(), vec!["exec:npm run dev", "done:npm run dev"]);
    }

    #[tokio::test]
    async fn test_files_and_failing_writes() {
        let runtime = ScriptedRuntime::new();
        runtime.seed_file("a.txt", "old");
        assert!(runtime.path_exists("a.txt").await.unwrap());
        assert!(!runtime.path_exists("b.txt").await.unwrap());

        runtime.write_file("a.txt", "new").await.unwrap();
        assert_eq!(runtime.file("a.txt").as_deref(), Some("new"));

        runtime.fail_writes_to("locked.txt");
        assert!(runtime.write_file("locked.txt", "x").await.is_err());
        assert_eq!(runtime.log(), vec!["write:a.txt"]);
    }
}
