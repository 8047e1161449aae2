//! Action model and shell command classification.

pub mod classify;
pub mod types;

pub use classify::{CommandClassifier, PatternClassifier};
pub use types::{
    Action, ActionId, ActionState, CommandKind, FileAction, FileActionState, PartialAction,
    PartialKind, ShellAction, ShellActionState,
};
