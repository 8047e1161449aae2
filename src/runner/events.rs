use crate::action::{ActionId, ActionState};
use crate::errors::CommandError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ── Alerts ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Error,
    Warning,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

/// Where the failing output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSource {
    Terminal,
    DevServer,
    Build,
}

impl AlertSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terminal => "terminal",
            Self::DevServer => "dev_server",
            Self::Build => "build",
        }
    }
}

/// A failure worth showing to the user.
///
/// `content` carries the full captured output so the failure can be
/// diagnosed without re-running the command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAlert {
    pub kind: AlertKind,
    pub title: String,
    pub description: String,
    pub content: String,
    pub source: AlertSource,
    pub timestamp: DateTime<Utc>,
}

impl ActionAlert {
    pub fn from_command_error(error: &CommandError, source: AlertSource) -> Self {
        let title = match source {
            AlertSource::Terminal => "Command Failed",
            AlertSource::DevServer => "Dev Server Failed",
            AlertSource::Build => "Build Failed",
        };
        Self {
            kind: AlertKind::Error,
            title: title.to_string(),
            description: error.header.clone(),
            content: error.output.clone(),
            source,
            timestamp: Utc::now(),
        }
    }

    pub fn warning(title: impl Into<String>, description: impl Into<String>, source: AlertSource) -> Self {
        Self {
            kind: AlertKind::Warning,
            title: title.into(),
            description: description.into(),
            content: String::new(),
            source,
            timestamp: Utc::now(),
        }
    }
}

// ── Runner events ────────────────────────────────────────────────────

/// Everything observers of the runner can see, keyed by owning message id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RunnerEvent {
    StatusChanged {
        message_id: String,
        state: ActionState,
    },
    Alert {
        message_id: String,
        action_id: ActionId,
        alert: ActionAlert,
    },
    /// A file action failed. Shell failures show up as `error` status instead.
    ActionFailed {
        message_id: String,
        action_id: ActionId,
        error: String,
    },
    /// A port opened while a start action was running. Not a completion.
    ServerReady {
        message_id: String,
        action_id: ActionId,
        port: u16,
        url: String,
    },
}

/// Send to all subscribers. Having none is not an error.
pub fn broadcast_event(tx: &broadcast::Sender<RunnerEvent>, event: RunnerEvent) {
    if tx.send(event).is_err() {
        tracing::trace!("No runner event subscribers");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ShellActionState;

    #[test]
    fn test_alert_keeps_header_and_output() {
        let err = CommandError::new("Failed to run `npm install`", "EACCES", Some(1));
        let alert = ActionAlert::from_command_error(&err, AlertSource::Terminal);
        assert_eq!(alert.kind, AlertKind::Error);
        assert_eq!(alert.description, "Failed to run `npm install`");
        assert_eq!(alert.content, "EACCES");
        assert_eq!(alert.title, "Command Failed");
    }

    #[test]
    fn test_runner_event_serializes_adjacently_tagged() {
        let event = RunnerEvent::StatusChanged {
            message_id: "m1".into(),
            state: ActionState::Shell {
                id: 0,
                command: "ls".into(),
                state: ShellActionState::Queued,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StatusChanged");
        assert_eq!(json["data"]["message_id"], "m1");
        assert_eq!(json["data"]["state"]["state"], "queued");
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let (tx, _) = broadcast::channel(4);
        broadcast_event(
            &tx,
            RunnerEvent::ActionFailed {
                message_id: "m".into(),
                action_id: 1,
                error: "boom".into(),
            },
        );
    }
}
