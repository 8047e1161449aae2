//! Parser lifecycle events and the listener interface that receives them.

use crate::action::PartialAction;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Attributes of an artifact envelope. Both may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub id: Option<String>,
    pub title: Option<String>,
}

/// Events emitted by the streaming parser, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ParserEvent {
    ArtifactOpen {
        stream_id: String,
        artifact: ArtifactInfo,
    },
    /// `action.content` is empty at this point.
    ActionOpen {
        stream_id: String,
        artifact_id: Option<String>,
        action: PartialAction,
    },
    /// `action.content` is final.
    ActionClose {
        stream_id: String,
        artifact_id: Option<String>,
        action: PartialAction,
    },
    ArtifactClose {
        stream_id: String,
        artifact: ArtifactInfo,
    },
}

impl ParserEvent {
    pub fn stream_id(&self) -> &str {
        match self {
            ParserEvent::ArtifactOpen { stream_id, .. }
            | ParserEvent::ActionOpen { stream_id, .. }
            | ParserEvent::ActionClose { stream_id, .. }
            | ParserEvent::ArtifactClose { stream_id, .. } => stream_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParserEvent::ArtifactOpen { .. } => "artifact_open",
            ParserEvent::ActionOpen { .. } => "action_open",
            ParserEvent::ActionClose { .. } => "action_close",
            ParserEvent::ArtifactClose { .. } => "artifact_close",
        }
    }
}

/// Receives parser events synchronously during `parse`.
pub trait ParserListener {
    fn on_event(&mut self, event: ParserEvent);
}

impl ParserListener for Vec<ParserEvent> {
    fn on_event(&mut self, event: ParserEvent) {
        self.push(event);
    }
}

impl ParserListener for mpsc::UnboundedSender<ParserEvent> {
    fn on_event(&mut self, event: ParserEvent) {
        if self.send(event).is_err() {
            tracing::debug!("Parser event receiver dropped");
        }
    }
}
