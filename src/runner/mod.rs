//! Action execution queue.
//!
//! One worker task drains a channel of jobs, so actions run strictly in
//! enqueue order and at most one blocking action touches the sandbox at a
//! time. Start actions are the exception: they are launched, left running in
//! the background, and the queue moves on after a settling delay.
//!
//! A failing action never stops the queue. Its caller still sees the error
//! through the `ActionHandle` returned by `enqueue`.

pub mod events;
pub mod executor;
pub mod status;

pub use events::{ActionAlert, AlertKind, AlertSource, RunnerEvent};
pub use executor::{ActionOutcome, BuildResult, RunnerSettings};
pub use status::StatusBook;

use crate::action::{
    Action, ActionId, ActionState, CommandClassifier, FileActionState, PatternClassifier,
    ShellActionState,
};
use crate::config::RunnerConfig;
use crate::errors::ActionError;
use crate::runtime::{SandboxRuntime, ShellSession};
use executor::{ActionExecutor, QueuedAction};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Capacity of the runner event channel.
const EVENT_CAPACITY: usize = 1024;

enum Job {
    Run(Box<QueuedAction>),
    /// Resolves once every job sent before it has finished.
    Barrier(oneshot::Sender<()>),
}

/// Aborts one shell action.
#[derive(Clone)]
pub struct AbortHandle {
    message_id: String,
    action_id: ActionId,
    token: CancellationToken,
    status: Arc<StatusBook>,
}

impl AbortHandle {
    /// Mark the action `aborted` and signal its process.
    ///
    /// Returns `false` if the action already reached a terminal state or is
    /// not a shell action.
    pub fn abort(&self) -> bool {
        let aborted = self
            .status
            .set_shell(&self.message_id, self.action_id, ShellActionState::Aborted);
        if aborted {
            tracing::info!(message_id = %self.message_id, action_id = self.action_id, "Aborting action");
            self.token.cancel();
        }
        aborted
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// The caller's view of one enqueued action.
pub struct ActionHandle {
    pub message_id: String,
    pub action_id: ActionId,
    abort: AbortHandle,
    result: oneshot::Receiver<Result<ActionOutcome, ActionError>>,
}

impl ActionHandle {
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn abort(&self) -> bool {
        self.abort.abort()
    }

    /// Wait for the action to finish. For start actions this resolves once
    /// the process has been launched and the queue has settled.
    pub async fn wait(self) -> Result<ActionOutcome, ActionError> {
        self.result.await.unwrap_or(Err(ActionError::RunnerClosed))
    }
}

pub struct ActionRunner {
    jobs: mpsc::UnboundedSender<Job>,
    status: Arc<StatusBook>,
    events: broadcast::Sender<RunnerEvent>,
    build_result: Arc<Mutex<Option<BuildResult>>>,
}

impl ActionRunner {
    /// Start the queue worker. Must be called inside a tokio runtime.
    pub fn new(
        runtime: Arc<dyn SandboxRuntime>,
        shell: Arc<dyn ShellSession>,
        classifier: Arc<dyn CommandClassifier>,
        settings: RunnerSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let status = Arc::new(StatusBook::new(events.clone()));
        let build_result = Arc::new(Mutex::new(None));

        let executor = ActionExecutor {
            runtime,
            shell,
            classifier,
            status: status.clone(),
            events: events.clone(),
            build_result: build_result.clone(),
            settings,
            latest_start: Arc::new(AtomicU64::new(0)),
        };

        let (jobs, receiver) = mpsc::unbounded_channel();
        tokio::spawn(drain_queue(receiver, executor));

        Self {
            jobs,
            status,
            events,
            build_result,
        }
    }

    /// Runner over a runtime that provides both files and shell, with the
    /// classifier and timings from `config`.
    pub fn from_config<R>(runtime: Arc<R>, config: &RunnerConfig) -> Self
    where
        R: SandboxRuntime + ShellSession + 'static,
    {
        Self::new(
            runtime.clone(),
            runtime,
            Arc::new(PatternClassifier::from_config(&config.toml.commands)),
            RunnerSettings::from_config(config),
        )
    }

    /// Append `action` to the queue.
    pub fn enqueue(&self, message_id: &str, action_id: ActionId, action: Action) -> ActionHandle {
        let initial = match &action {
            Action::File(file) => ActionState::File {
                id: action_id,
                path: file.path.clone(),
                state: FileActionState::Creating,
            },
            Action::Shell(shell) => ActionState::Shell {
                id: action_id,
                command: shell.command.clone(),
                state: ShellActionState::Queued,
            },
        };
        let is_shell = matches!(initial, ActionState::Shell { .. });
        self.status.insert(message_id, initial);
        tracing::debug!(message_id, action_id, action = action.label(), "Enqueued action");

        let token = CancellationToken::new();
        if is_shell {
            self.status
                .register_abort(message_id, action_id, token.clone());
        }
        let abort = self.abort_handle(message_id, action_id, token.clone());

        let (reply, result) = oneshot::channel();
        let job = Job::Run(Box::new(QueuedAction {
            message_id: message_id.to_string(),
            action_id,
            action,
            cancel: token,
            reply,
        }));
        if self.jobs.send(job).is_err() {
            tracing::error!(message_id, action_id, "Action queue has shut down");
        }

        ActionHandle {
            message_id: message_id.to_string(),
            action_id,
            abort,
            result,
        }
    }

    /// Abort a shell action by id. Queued actions are skipped when reached.
    pub fn abort(&self, message_id: &str, action_id: ActionId) -> bool {
        match self.status.abort_token(message_id, action_id) {
            Some(token) => self.abort_handle(message_id, action_id, token).abort(),
            None => false,
        }
    }

    /// Release the finished actions of a message, e.g. once it has been
    /// retired. Actions still running stay abortable.
    pub fn forget(&self, message_id: &str) -> usize {
        self.status.forget(message_id)
    }

    pub fn forget_all(&self) -> usize {
        self.status.forget_all()
    }

    /// Resolves once every action enqueued before this call has finished.
    pub async fn idle(&self) {
        let (done, wait) = oneshot::channel();
        if self.jobs.send(Job::Barrier(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// States of a message's actions, in enqueue order.
    pub fn actions(&self, message_id: &str) -> Vec<ActionState> {
        self.status.snapshot(message_id)
    }

    pub fn status(&self, message_id: &str, action_id: ActionId) -> Option<ActionState> {
        self.status.get(message_id, action_id)
    }

    /// Output of the most recent successful build.
    pub fn build_result(&self) -> Option<BuildResult> {
        self.build_result
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunnerEvent> {
        self.events.subscribe()
    }

    fn abort_handle(&self, message_id: &str, action_id: ActionId, token: CancellationToken) -> AbortHandle {
        AbortHandle {
            message_id: message_id.to_string(),
            action_id,
            token,
            status: self.status.clone(),
        }
    }
}

async fn drain_queue(mut jobs: mpsc::UnboundedReceiver<Job>, executor: ActionExecutor) {
    while let Some(job) = jobs.recv().await {
        match job {
            Job::Run(queued) => {
                let unit = executor.clone();
                // A panicking unit must not take the queue down with it.
                if let Err(e) = tokio::spawn(async move { unit.run(*queued).await }).await {
                    tracing::error!(error = %e, "Action unit panicked");
                }
            }
            Job::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Action queue closed");
}
