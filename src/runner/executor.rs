//! Execution of a single queued action against the sandbox.

use super::events::{ActionAlert, AlertSource, RunnerEvent, broadcast_event};
use super::status::StatusBook;
use crate::action::{
    Action, ActionId, CommandClassifier, CommandKind, FileAction, FileActionState, ShellAction,
    ShellActionState,
};
use crate::config::RunnerConfig;
use crate::errors::{ActionError, CommandError};
use crate::runtime::{CommandOutput, SandboxRuntime, ShellSession};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;

/// Tunables of the execution queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Pause after launching a start action before the next unit runs.
    pub start_settle: Duration,
    /// Raise a warning if a start action has not opened a port by then.
    pub ready_timeout: Option<Duration>,
    /// Candidate build output directories, in preference order.
    pub output_dirs: Vec<String>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            start_settle: Duration::from_millis(2000),
            ready_timeout: None,
            output_dirs: vec!["dist".into(), "build".into(), "out".into(), ".next".into()],
        }
    }
}

impl RunnerSettings {
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            start_settle: config.start_settle(),
            ready_timeout: config.ready_timeout(),
            output_dirs: config.toml.build.output_dirs.clone(),
        }
    }
}

/// Retained result of the most recent successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub output_dir: String,
    pub output: String,
    pub exit_code: i32,
}

/// What an action did, as seen by the caller awaiting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Written { path: String, created: bool },
    Completed(CommandOutput),
    /// A start action was launched and keeps running in the background.
    Started,
    Aborted,
}

pub(super) type Reply = oneshot::Sender<Result<ActionOutcome, ActionError>>;

/// One unit of work on the queue.
pub(super) struct QueuedAction {
    pub message_id: String,
    pub action_id: ActionId,
    pub action: Action,
    pub cancel: CancellationToken,
    pub reply: Reply,
}

/// Runs actions one at a time. Cheap to clone; start actions take a clone
/// into their background task.
#[derive(Clone)]
pub(super) struct ActionExecutor {
    pub runtime: Arc<dyn SandboxRuntime>,
    pub shell: Arc<dyn ShellSession>,
    pub classifier: Arc<dyn CommandClassifier>,
    pub status: Arc<StatusBook>,
    pub events: broadcast::Sender<RunnerEvent>,
    pub build_result: Arc<Mutex<Option<BuildResult>>>,
    pub settings: RunnerSettings,
    /// Launch counter of start actions. Port events are runtime-wide, so
    /// only the most recently launched start claims them.
    pub latest_start: Arc<AtomicU64>,
}

impl ActionExecutor {
    pub async fn run(&self, queued: QueuedAction) {
        let QueuedAction {
            message_id,
            action_id,
            action,
            cancel,
            reply,
        } = queued;

        let result = if cancel.is_cancelled() {
            tracing::debug!(message_id = %message_id, action_id, "Skipping aborted action");
            Ok(ActionOutcome::Aborted)
        } else {
            match action {
                Action::File(file) => self.run_file(&message_id, action_id, file).await,
                Action::Shell(shell) => self.run_shell(&message_id, action_id, shell, cancel).await,
            }
        };

        if let Err(e) = &result {
            tracing::error!(message_id = %message_id, action_id, error = %e, "Action failed");
        }
        // The caller may have dropped its handle.
        let _ = reply.send(result);
    }

    async fn run_file(
        &self,
        message_id: &str,
        action_id: ActionId,
        file: FileAction,
    ) -> Result<ActionOutcome, ActionError> {
        let existed = match self.runtime.path_exists(&file.path).await {
            Ok(existed) => existed,
            Err(e) => {
                tracing::warn!(path = %file.path, error = %e, "Could not check file; assuming new");
                false
            }
        };
        let (pending, done) = if existed {
            (FileActionState::Updating, FileActionState::Updated)
        } else {
            (FileActionState::Creating, FileActionState::Created)
        };

        self.status.set_file(message_id, action_id, pending);
        match self.runtime.write_file(&file.path, &file.content).await {
            Ok(()) => {
                self.status.set_file(message_id, action_id, done);
                tracing::info!(path = %file.path, state = done.as_str(), "File written");
                Ok(ActionOutcome::Written {
                    path: file.path,
                    created: !existed,
                })
            }
            Err(source) => {
                broadcast_event(
                    &self.events,
                    RunnerEvent::ActionFailed {
                        message_id: message_id.to_string(),
                        action_id,
                        error: format!("{:#}", source),
                    },
                );
                Err(ActionError::FileWrite {
                    path: file.path.into(),
                    source,
                })
            }
        }
    }

    async fn run_shell(
        &self,
        message_id: &str,
        action_id: ActionId,
        shell: ShellAction,
        cancel: CancellationToken,
    ) -> Result<ActionOutcome, ActionError> {
        let kind = shell
            .kind_hint
            .unwrap_or_else(|| self.classifier.classify(&shell.command));

        if !self.status.set_shell(message_id, action_id, ShellActionState::Running) {
            return Ok(ActionOutcome::Aborted);
        }
        tracing::info!(command = %shell.command, kind = kind.as_str(), "Running command");

        if let Err(source) = self.shell.ready().await {
            if !self.status.set_shell(message_id, action_id, ShellActionState::Error) {
                return Ok(ActionOutcome::Aborted);
            }
            return Err(ActionError::Launch {
                command: shell.command,
                source,
            });
        }

        if !kind.blocks_queue() {
            self.launch_start(message_id, action_id, shell.command, cancel);
            tokio::time::sleep(self.settings.start_settle).await;
            return Ok(ActionOutcome::Started);
        }

        let result = self.shell.execute(&shell.command, cancel.clone()).await;
        if cancel.is_cancelled() {
            self.status.set_shell(message_id, action_id, ShellActionState::Aborted);
            return Ok(ActionOutcome::Aborted);
        }

        let output = match result {
            Ok(output) => output,
            Err(source) => {
                if !self.status.set_shell(message_id, action_id, ShellActionState::Error) {
                    return Ok(ActionOutcome::Aborted);
                }
                return Err(ActionError::Launch {
                    command: shell.command,
                    source,
                });
            }
        };

        if !output.success() {
            let error = command_error(&shell.command, &output);
            let source = if kind == CommandKind::Build {
                AlertSource::Build
            } else {
                AlertSource::Terminal
            };
            // An abort that lands after the process exited still wins.
            if !self.status.set_shell(message_id, action_id, ShellActionState::Error) {
                return Ok(ActionOutcome::Aborted);
            }
            self.alert(message_id, action_id, ActionAlert::from_command_error(&error, source));
            return Err(error.into());
        }

        if kind == CommandKind::Build {
            self.record_build(&output).await;
        }
        self.status.set_shell(message_id, action_id, ShellActionState::Completed);
        Ok(ActionOutcome::Completed(output))
    }

    /// Run a start command in the background. Its outcome only reaches
    /// observers through status changes and alerts.
    fn launch_start(
        &self,
        message_id: &str,
        action_id: ActionId,
        command: String,
        cancel: CancellationToken,
    ) {
        let this = self.clone();
        let message_id = message_id.to_string();
        let ports = self.runtime.port_events();
        let launch = self.latest_start.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::spawn(async move {
            this.supervise_start(&message_id, action_id, &command, launch, cancel, ports)
                .await;
        });
    }

    async fn supervise_start(
        &self,
        message_id: &str,
        action_id: ActionId,
        command: &str,
        launch: u64,
        cancel: CancellationToken,
        mut ports: broadcast::Receiver<crate::runtime::PortEvent>,
    ) {
        let execution = self.shell.execute(command, cancel.clone());
        tokio::pin!(execution);

        let ready_timeout = self.settings.ready_timeout;
        let ready_timer = async move {
            match ready_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(ready_timer);

        let mut ports_open = true;
        let mut ready = false;
        let result = loop {
            tokio::select! {
                result = &mut execution => break result,
                event = ports.recv(), if ports_open => match event {
                    Ok(port) if self.latest_start.load(Ordering::SeqCst) != launch => {
                        tracing::debug!(command, port = port.port, "Port belongs to a later start action");
                    }
                    Ok(port) => {
                        ready = true;
                        tracing::info!(command, port = port.port, "Dev server ready");
                        broadcast_event(&self.events, RunnerEvent::ServerReady {
                            message_id: message_id.to_string(),
                            action_id,
                            port: port.port,
                            url: port.url,
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Port events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => ports_open = false,
                },
                _ = &mut ready_timer, if !ready => {
                    ready = true;
                    tracing::warn!(command, "Dev server has not opened a port yet");
                    self.alert(message_id, action_id, ActionAlert::warning(
                        "Dev Server Not Ready",
                        format!("`{}` has not opened a port", command),
                        AlertSource::DevServer,
                    ));
                }
            }
        };

        if cancel.is_cancelled() {
            self.status.set_shell(message_id, action_id, ShellActionState::Aborted);
            return;
        }

        let error = match result {
            Ok(output) if output.success() => {
                self.status.set_shell(message_id, action_id, ShellActionState::Completed);
                return;
            }
            Ok(output) => command_error(command, &output),
            Err(e) => CommandError::new(format!("Failed to launch `{}`", command), format!("{:#}", e), None),
        };
        if !self.status.set_shell(message_id, action_id, ShellActionState::Error) {
            return;
        }
        tracing::error!(command, error = %error, "Dev server exited");
        self.alert(
            message_id,
            action_id,
            ActionAlert::from_command_error(&error, AlertSource::DevServer),
        );
    }

    async fn record_build(&self, output: &CommandOutput) {
        let mut output_dir = None;
        for dir in &self.settings.output_dirs {
            if matches!(self.runtime.path_exists(dir).await, Ok(true)) {
                output_dir = Some(dir.clone());
                break;
            }
        }
        let output_dir = output_dir
            .or_else(|| self.settings.output_dirs.first().cloned())
            .unwrap_or_default();

        tracing::info!(output_dir = %output_dir, "Build finished");
        let result = BuildResult {
            output_dir,
            output: output.output.clone(),
            exit_code: output.exit_code.unwrap_or_default(),
        };
        *self
            .build_result
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(result);
    }

    fn alert(&self, message_id: &str, action_id: ActionId, alert: ActionAlert) {
        tracing::debug!(
            message_id,
            action_id,
            kind = alert.kind.as_str(),
            source = alert.source.as_str(),
            "Raising alert"
        );
        broadcast_event(
            &self.events,
            RunnerEvent::Alert {
                message_id: message_id.to_string(),
                action_id,
                alert,
            },
        );
    }
}

fn command_error(command: &str, output: &CommandOutput) -> CommandError {
    let header = match output.exit_code {
        Some(code) => format!("Command failed with exit code {}: `{}`", code, command),
        None => format!("Command terminated: `{}`", command),
    };
    CommandError::new(header, output.output.clone(), output.exit_code)
}
