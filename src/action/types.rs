//! Action model: the values the parser produces and the runner executes.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifier of an action within one message. Assigned in open order.
pub type ActionId = u32;

/// How a shell command behaves once handed to the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Ordinary,
    Install,
    Build,
    /// Long-running server process; does not block the queue.
    Start,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ordinary => "ordinary",
            Self::Install => "install",
            Self::Build => "build",
            Self::Start => "start",
        }
    }

    /// Whether the runner waits for the command to exit before moving on.
    pub fn blocks_queue(&self) -> bool {
        !matches!(self, Self::Start)
    }
}

impl FromStr for CommandKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ordinary" => Ok(Self::Ordinary),
            "install" => Ok(Self::Install),
            "build" => Ok(Self::Build),
            "start" => Ok(Self::Start),
            _ => Err(format!("Invalid command kind: {}", s)),
        }
    }
}

/// Write `content` to `path` inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAction {
    pub path: String,
    pub content: String,
}

/// Run `command` in the sandbox shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellAction {
    pub command: String,
    /// Forces the classification, bypassing the command classifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind_hint: Option<CommandKind>,
}

impl ShellAction {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            kind_hint: None,
        }
    }
}

/// A complete, executable action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    File(FileAction),
    Shell(ShellAction),
}

impl Action {
    pub fn file(path: impl Into<String>, content: impl Into<String>) -> Self {
        Action::File(FileAction {
            path: path.into(),
            content: content.into(),
        })
    }

    pub fn shell(command: impl Into<String>) -> Self {
        Action::Shell(ShellAction::new(command))
    }

    /// Short label for logs: the path or the command line.
    pub fn label(&self) -> &str {
        match self {
            Action::File(f) => &f.path,
            Action::Shell(s) => &s.command,
        }
    }
}

/// What an action tag announced when it opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartialKind {
    File { path: String },
    Shell { kind_hint: Option<CommandKind> },
    /// Unrecognized `type` attribute; carried through but never executed.
    Opaque { action_type: String },
}

/// An action still being assembled by the parser.
///
/// `content` only grows while the action is open; it is finalized when the
/// close tag is consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialAction {
    pub id: ActionId,
    pub kind: PartialKind,
    pub content: String,
}

impl PartialAction {
    pub fn new(id: ActionId, kind: PartialKind) -> Self {
        Self {
            id,
            kind,
            content: String::new(),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, PartialKind::File { .. })
    }

    pub fn path(&self) -> Option<&str> {
        match &self.kind {
            PartialKind::File { path } => Some(path),
            _ => None,
        }
    }

    /// Convert to an executable action. Opaque actions yield `None`.
    pub fn to_action(&self) -> Option<Action> {
        match &self.kind {
            PartialKind::File { path } => Some(Action::file(path.clone(), self.content.clone())),
            PartialKind::Shell { kind_hint } => Some(Action::Shell(ShellAction {
                command: self.content.clone(),
                kind_hint: *kind_hint,
            })),
            PartialKind::Opaque { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileActionState {
    Creating,
    Created,
    Updating,
    Updated,
}

impl FileActionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Updating => "updating",
            Self::Updated => "updated",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellActionState {
    Queued,
    Running,
    Completed,
    Error,
    Aborted,
}

impl ShellActionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Aborted)
    }
}

impl FromStr for ShellActionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            "aborted" => Ok(Self::Aborted),
            _ => Err(format!("Invalid shell action state: {}", s)),
        }
    }
}

/// Status view of one action, as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionState {
    File {
        id: ActionId,
        path: String,
        state: FileActionState,
    },
    Shell {
        id: ActionId,
        command: String,
        state: ShellActionState,
    },
}

impl ActionState {
    pub fn id(&self) -> ActionId {
        match self {
            ActionState::File { id, .. } | ActionState::Shell { id, .. } => *id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            ActionState::File { state, .. } => state.is_terminal(),
            ActionState::Shell { state, .. } => state.is_terminal(),
        }
    }

    /// Lower-case state name, e.g. `"running"` or `"created"`.
    pub fn state_str(&self) -> &'static str {
        match self {
            ActionState::File { state, .. } => state.as_str(),
            ActionState::Shell { state, .. } => state.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_kind_round_trips_through_str() {
        for kind in [
            CommandKind::Ordinary,
            CommandKind::Install,
            CommandKind::Build,
            CommandKind::Start,
        ] {
            assert_eq!(kind.as_str().parse::<CommandKind>().unwrap(), kind);
        }
        assert!("serve".parse::<CommandKind>().is_err());
    }

    #[test]
    fn test_only_start_is_non_blocking() {
        assert!(CommandKind::Install.blocks_queue());
        assert!(CommandKind::Build.blocks_queue());
        assert!(CommandKind::Ordinary.blocks_queue());
        assert!(!CommandKind::Start.blocks_queue());
    }

    #[test]
    fn test_partial_file_action_converts_with_content() {
        let mut partial = PartialAction::new(
            3,
            PartialKind::File {
                path: "src/a.ts".into(),
            },
        );
        partial.content.push_str("export {}");
        assert_eq!(partial.path(), Some("src/a.ts"));
        assert_eq!(partial.to_action(), Some(Action::file("src/a.ts", "export {}")));
    }

    #[test]
    fn test_partial_shell_action_keeps_hint() {
        let mut partial = PartialAction::new(
            0,
            PartialKind::Shell {
                kind_hint: Some(CommandKind::Start),
            },
        );
        partial.content.push_str("node server.js");
        match partial.to_action() {
            Some(Action::Shell(shell)) => {
                assert_eq!(shell.command, "node server.js");
                assert_eq!(shell.kind_hint, Some(CommandKind::Start));
            }
            other => panic!("Expected shell action, got {:?}", other),
        }
    }

    #[test]
    fn test_opaque_partial_action_is_not_executable() {
        let partial = PartialAction::new(
            1,
            PartialKind::Opaque {
                action_type: "unknown".into(),
            },
        );
        assert!(partial.to_action().is_none());
    }

    #[test]
    fn test_shell_state_terminality() {
        assert!(!ShellActionState::Queued.is_terminal());
        assert!(!ShellActionState::Running.is_terminal());
        assert!(ShellActionState::Completed.is_terminal());
        assert!(ShellActionState::Error.is_terminal());
        assert!(ShellActionState::Aborted.is_terminal());
        assert_eq!("aborted".parse::<ShellActionState>(), Ok(ShellActionState::Aborted));
    }

    #[test]
    fn test_action_state_serializes_with_type_tag() {
        let state = ActionState::Shell {
            id: 4,
            command: "npm install".into(),
            state: ShellActionState::Running,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["type"], "shell");
        assert_eq!(json["state"], "running");
        assert_eq!(state.id(), 4);
        assert_eq!(state.state_str(), "running");
    }
}
