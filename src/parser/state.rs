//! Per-stream parser state and the store that owns it.

use super::events::ArtifactInfo;
use crate::action::{ActionId, PartialAction};
use std::collections::HashMap;

/// Parse progress for one stream id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamState {
    pub(super) cursor: usize,
    pub(super) current_artifact: Option<ArtifactInfo>,
    pub(super) current_action: Option<PartialAction>,
    pub(super) action_sequence: ActionId,
}

impl StreamState {
    /// Offset into the buffer already consumed. Never decreases.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn inside_artifact(&self) -> bool {
        self.current_artifact.is_some()
    }

    pub fn inside_action(&self) -> bool {
        self.current_action.is_some()
    }

    /// The action being assembled, with the content accumulated so far.
    pub fn current_action(&self) -> Option<&PartialAction> {
        self.current_action.as_ref()
    }

    /// Number of actions opened on this stream.
    pub fn action_sequence(&self) -> ActionId {
        self.action_sequence
    }

    pub(super) fn next_action_id(&mut self) -> ActionId {
        let id = self.action_sequence;
        self.action_sequence += 1;
        id
    }
}

/// Owns the state of every active stream.
///
/// The parser itself holds nothing between calls; whoever manages session
/// lifecycle owns a store and hands it to each `parse` call.
#[derive(Debug, Default)]
pub struct ParserStore {
    streams: HashMap<String, StreamState>,
}

impl ParserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stream_id: &str) -> Option<&StreamState> {
        self.streams.get(stream_id)
    }

    pub(super) fn get_or_create(&mut self, stream_id: &str) -> &mut StreamState {
        self.streams.entry(stream_id.to_string()).or_default()
    }

    /// Drop the state of a retired stream.
    pub fn remove(&mut self, stream_id: &str) -> Option<StreamState> {
        self.streams.remove(stream_id)
    }

    /// Discard all in-flight parsing.
    pub fn reset(&mut self) {
        self.streams.clear();
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
