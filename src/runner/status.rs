//! Per-message action status, with sticky terminal states.

use super::events::{RunnerEvent, broadcast_event};
use crate::action::{ActionId, ActionState, FileActionState, ShellActionState};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Book {
    messages: HashMap<String, Vec<ActionState>>,
    /// Cancellation of shell actions that have not reached a terminal state.
    aborts: HashMap<(String, ActionId), CancellationToken>,
}

/// Current `ActionState` of every enqueued action, in enqueue order per
/// message. Every accepted change is broadcast as `RunnerEvent::StatusChanged`.
pub struct StatusBook {
    book: Mutex<Book>,
    events: broadcast::Sender<RunnerEvent>,
}

impl StatusBook {
    pub fn new(events: broadcast::Sender<RunnerEvent>) -> Self {
        Self {
            book: Mutex::new(Book::default()),
            events,
        }
    }

    /// Register a freshly enqueued action. An existing entry with the same
    /// id is replaced, along with its abort token.
    pub fn insert(&self, message_id: &str, state: ActionState) {
        let mut book = self.lock();
        book.aborts.remove(&(message_id.to_string(), state.id()));
        let entries = book.messages.entry(message_id.to_string()).or_default();
        match entries.iter_mut().find(|s| s.id() == state.id()) {
            Some(existing) => *existing = state.clone(),
            None => entries.push(state.clone()),
        }
        broadcast_event(
            &self.events,
            RunnerEvent::StatusChanged {
                message_id: message_id.to_string(),
                state,
            },
        );
    }

    pub fn set_shell(&self, message_id: &str, action_id: ActionId, next: ShellActionState) -> bool {
        self.transition(message_id, action_id, |state| match state {
            ActionState::Shell { state, .. } => {
                *state = next;
                true
            }
            ActionState::File { .. } => false,
        })
    }

    pub fn set_file(&self, message_id: &str, action_id: ActionId, next: FileActionState) -> bool {
        self.transition(message_id, action_id, |state| match state {
            ActionState::File { state, .. } => {
                *state = next;
                true
            }
            ActionState::Shell { .. } => false,
        })
    }

    /// Make a shell action abortable until it reaches a terminal state.
    pub fn register_abort(&self, message_id: &str, action_id: ActionId, token: CancellationToken) {
        self.lock()
            .aborts
            .insert((message_id.to_string(), action_id), token);
    }

    /// Token of a shell action that can still be aborted.
    pub fn abort_token(&self, message_id: &str, action_id: ActionId) -> Option<CancellationToken> {
        self.lock()
            .aborts
            .get(&(message_id.to_string(), action_id))
            .cloned()
    }

    /// Drop every finished action of a message. Actions still in flight stay
    /// tracked so they can report their outcome and be aborted. Returns how
    /// many entries were released.
    pub fn forget(&self, message_id: &str) -> usize {
        let mut book = self.lock();
        let Some(entries) = book.messages.get_mut(message_id) else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|state| !state.is_terminal());
        let released = before - entries.len();
        if entries.is_empty() {
            book.messages.remove(message_id);
        }
        tracing::debug!(message_id, released, "Released finished actions");
        released
    }

    /// `forget` applied to every message.
    pub fn forget_all(&self) -> usize {
        let mut book = self.lock();
        let mut released = 0;
        book.messages.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|state| !state.is_terminal());
            released += before - entries.len();
            !entries.is_empty()
        });
        tracing::debug!(released, "Released finished actions of all messages");
        released
    }

    #[cfg(test)]
    pub(crate) fn abortable(&self) -> usize {
        self.lock().aborts.len()
    }

    /// Apply `change` unless the action is unknown or already terminal.
    /// Returns whether the change was accepted.
    fn transition(
        &self,
        message_id: &str,
        action_id: ActionId,
        change: impl FnOnce(&mut ActionState) -> bool,
    ) -> bool {
        let mut book = self.lock();
        let Some(state) = book
            .messages
            .get_mut(message_id)
            .and_then(|entries| entries.iter_mut().find(|s| s.id() == action_id))
        else {
            tracing::warn!(message_id, action_id, "Status change for unknown action");
            return false;
        };

        if state.is_terminal() {
            tracing::debug!(
                message_id,
                action_id,
                state = state.state_str(),
                "Ignoring status change after terminal state"
            );
            return false;
        }
        if !change(state) {
            return false;
        }

        let state = state.clone();
        if state.is_terminal() {
            book.aborts.remove(&(message_id.to_string(), action_id));
        }
        drop(book);

        broadcast_event(
            &self.events,
            RunnerEvent::StatusChanged {
                message_id: message_id.to_string(),
                state,
            },
        );
        true
    }

    pub fn get(&self, message_id: &str, action_id: ActionId) -> Option<ActionState> {
        self.lock()
            .messages
            .get(message_id)
            .and_then(|entries| entries.iter().find(|s| s.id() == action_id).cloned())
    }

    pub fn snapshot(&self, message_id: &str) -> Vec<ActionState> {
        self.lock()
            .messages
            .get(message_id)
            .cloned()
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Book> {
        self.book
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
