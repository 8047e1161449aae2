//! Streaming artifact parser.
//!
//! `StreamingParser::parse` is called with the whole buffer received so far
//! for a stream id. It resumes from the stored cursor, emits lifecycle events
//! to a listener and returns the plain text found outside any artifact during
//! this call. Input is never re-interpreted: a tag that has not fully arrived
//! stalls the cursor until a later call supplies the rest.
//!
//! Protocol:
//!
//! ```text
//! <artifact id="a1" title="Demo">
//!   <action type="file" path="src/a.ts">...content...</action>
//!   <action type="shell">npm install</action>
//! </artifact>
//! ```

pub mod events;
pub mod fence;
pub mod scanner;
pub mod state;

pub use events::{ArtifactInfo, ParserEvent, ParserListener};
pub use scanner::TagNames;
pub use state::{ParserStore, StreamState};

use crate::action::{CommandKind, PartialAction, PartialKind};
use crate::config::ParserSection;
use scanner::{
    OpenTag, extract_attribute, find_marker, find_open_tag, find_tag_end, is_marker_prefix,
    is_tag_delimiter, partial_marker_start,
};

/// Outcome of one scanning step.
enum Step {
    /// Keep scanning from this offset.
    Continue(usize),
    /// Stop here and wait for more input.
    Stall(usize),
}

#[derive(Debug, Clone)]
pub struct StreamingParser {
    tags: TagNames,
    strip_fences: bool,
}

impl Default for StreamingParser {
    fn default() -> Self {
        Self::new(TagNames::default())
    }
}

impl StreamingParser {
    pub fn new(tags: TagNames) -> Self {
        Self {
            tags,
            strip_fences: true,
        }
    }

    pub fn from_config(section: &ParserSection) -> Self {
        Self::new(TagNames::new(&section.artifact_tag, &section.action_tag))
            .with_fence_stripping(section.strip_fences)
    }

    pub fn with_fence_stripping(mut self, enabled: bool) -> Self {
        self.strip_fences = enabled;
        self
    }

    /// Parse `input` (the full buffer for `stream_id` so far).
    ///
    /// Returns the plain text consumed by this call. Callers must serialize
    /// calls for the same stream id.
    pub fn parse(
        &self,
        store: &mut ParserStore,
        stream_id: &str,
        input: &str,
        listener: &mut dyn ParserListener,
    ) -> String {
        let state = store.get_or_create(stream_id);
        let mut output = String::new();

        if input.len() < state.cursor {
            tracing::warn!(
                stream_id,
                cursor = state.cursor,
                len = input.len(),
                "Buffer is shorter than the consumed prefix; ignoring"
            );
            return output;
        }

        let mut i = state.cursor;
        while i < input.len() {
            let step = if state.current_action.is_some() {
                self.scan_action(stream_id, state, input, i, listener)
            } else if state.current_artifact.is_some() {
                self.scan_artifact(stream_id, state, input, i, listener)
            } else {
                self.scan_text(stream_id, state, input, i, listener, &mut output)
            };
            match step {
                Step::Continue(next) => i = next,
                Step::Stall(at) => {
                    i = at;
                    break;
                }
            }
        }

        state.cursor = i;
        output
    }

    /// Parse a complete text in one call with a throwaway store.
    pub fn parse_complete(&self, input: &str) -> (String, Vec<ParserEvent>) {
        let mut store = ParserStore::new();
        let mut events = Vec::new();
        let output = self.parse(&mut store, "complete", input, &mut events);
        (output, events)
    }

    /// Outside any artifact: copy text, watch for the artifact open marker.
    fn scan_text(
        &self,
        stream_id: &str,
        state: &mut StreamState,
        input: &str,
        i: usize,
        listener: &mut dyn ParserListener,
        output: &mut String,
    ) -> Step {
        let rest = &input[i..];
        let lt = match rest.find('<') {
            None => {
                output.push_str(rest);
                return Step::Continue(input.len());
            }
            Some(0) => i,
            Some(pos) => {
                output.push_str(&rest[..pos]);
                return Step::Continue(i + pos);
            }
        };

        let marker = self.tags.artifact_open.as_str();
        if is_marker_prefix(input, lt, marker) {
            return Step::Stall(lt);
        }
        if !input[lt..].starts_with(marker) {
            output.push('<');
            return Step::Continue(lt + 1);
        }

        let after = lt + marker.len();
        match input.as_bytes().get(after) {
            None => Step::Stall(lt),
            Some(&b) if !is_tag_delimiter(b) => {
                output.push_str(marker);
                Step::Continue(after)
            }
            Some(_) => match find_tag_end(input, after) {
                None => Step::Stall(lt),
                Some(end) => {
                    self.open_artifact(stream_id, state, &input[lt..=end], listener);
                    Step::Continue(end + 1)
                }
            },
        }
    }

    fn open_artifact(
        &self,
        stream_id: &str,
        state: &mut StreamState,
        tag: &str,
        listener: &mut dyn ParserListener,
    ) {
        let info = ArtifactInfo {
            id: extract_attribute(tag, "id").map(str::to_string),
            title: extract_attribute(tag, "title").map(str::to_string),
        };
        if info.id.is_none() {
            tracing::warn!(stream_id, "Artifact id missing");
        }
        if info.title.is_none() {
            tracing::warn!(stream_id, "Artifact title missing");
        }

        state.current_artifact = Some(info.clone());
        listener.on_event(ParserEvent::ArtifactOpen {
            stream_id: stream_id.to_string(),
            artifact: info,
        });
    }

    /// Inside an artifact, between actions.
    fn scan_artifact(
        &self,
        stream_id: &str,
        state: &mut StreamState,
        input: &str,
        i: usize,
        listener: &mut dyn ParserListener,
    ) -> Step {
        let action = find_open_tag(input, &self.tags.action_open, i);
        let close = find_marker(input, &self.tags.artifact_close, i);

        let action_first = match (action, close) {
            (Some(OpenTag::Complete { start, .. } | OpenTag::Partial { start }), Some(c)) => {
                start < c
            }
            (Some(_), None) => true,
            (None, _) => false,
        };

        if action_first {
            return match action {
                Some(OpenTag::Complete { start, end }) => {
                    self.open_action(stream_id, state, &input[start..=end], listener);
                    Step::Continue(end + 1)
                }
                Some(OpenTag::Partial { start }) => Step::Stall(start),
                None => Step::Stall(i),
            };
        }

        if let Some(c) = close {
            let artifact = state.current_artifact.take().unwrap_or_default();
            listener.on_event(ParserEvent::ArtifactClose {
                stream_id: stream_id.to_string(),
                artifact,
            });
            return Step::Continue(c + self.tags.artifact_close.len());
        }

        // Text between actions is discarded; keep only a possible marker start.
        let rest = &input[i..];
        Step::Stall(i + rest.rfind('<').unwrap_or(rest.len()))
    }

    fn open_action(
        &self,
        stream_id: &str,
        state: &mut StreamState,
        tag: &str,
        listener: &mut dyn ParserListener,
    ) {
        let kind = match extract_attribute(tag, "type") {
            Some("file") => match extract_attribute(tag, "path") {
                Some(path) if !path.trim().is_empty() => PartialKind::File {
                    path: path.trim().to_string(),
                },
                _ => {
                    tracing::warn!(stream_id, "File action without a path; ignoring its content");
                    PartialKind::Opaque {
                        action_type: "file".to_string(),
                    }
                }
            },
            Some("shell") => PartialKind::Shell { kind_hint: None },
            Some("start") => PartialKind::Shell {
                kind_hint: Some(CommandKind::Start),
            },
            Some("build") => PartialKind::Shell {
                kind_hint: Some(CommandKind::Build),
            },
            Some(other) => {
                tracing::warn!(stream_id, action_type = other, "Unknown action type");
                PartialKind::Opaque {
                    action_type: other.to_string(),
                }
            }
            None => {
                tracing::warn!(stream_id, "Action type missing");
                PartialKind::Opaque {
                    action_type: String::new(),
                }
            }
        };

        let action = PartialAction::new(state.next_action_id(), kind);
        listener.on_event(ParserEvent::ActionOpen {
            stream_id: stream_id.to_string(),
            artifact_id: artifact_id(state),
            action: action.clone(),
        });
        state.current_action = Some(action);
    }

    /// Inside an action: accumulate content until the close marker.
    fn scan_action(
        &self,
        stream_id: &str,
        state: &mut StreamState,
        input: &str,
        i: usize,
        listener: &mut dyn ParserListener,
    ) -> Step {
        let close_marker = self.tags.action_close.as_str();

        match find_marker(input, close_marker, i) {
            Some(c) => {
                let Some(mut action) = state.current_action.take() else {
                    return Step::Continue(i);
                };
                self.append_content(&mut action, &input[i..c]);
                self.finalize_content(&mut action);
                listener.on_event(ParserEvent::ActionClose {
                    stream_id: stream_id.to_string(),
                    artifact_id: artifact_id(state),
                    action,
                });
                Step::Continue(c + close_marker.len())
            }
            None => {
                // Consume whole lines only, so a fence line or the close
                // marker is never split between two calls.
                let safe = partial_marker_start(input, i, close_marker);
                let Some(nl) = input[i..safe].rfind('\n') else {
                    return Step::Stall(i);
                };
                let end = i + nl + 1;
                if let Some(action) = state.current_action.as_mut() {
                    self.append_content(action, &input[i..end]);
                }
                Step::Stall(end)
            }
        }
    }

    fn append_content(&self, action: &mut PartialAction, chunk: &str) {
        match &action.kind {
            PartialKind::File { path } if self.strip_fences && !fence::keeps_fences(path) => {
                action.content.push_str(&fence::strip_code_fences(chunk));
            }
            _ => action.content.push_str(chunk),
        }
    }

    /// Trim accumulated content once the close tag has been seen.
    fn finalize_content(&self, action: &mut PartialAction) {
        let trimmed = match &action.kind {
            PartialKind::File { path } => {
                let body = trim_leading_blank_lines(&action.content).trim_end();
                if self.strip_fences && !fence::keeps_fences(path) {
                    fence::strip_trailing_fence(body)
                } else {
                    body
                }
            }
            PartialKind::Shell { .. } | PartialKind::Opaque { .. } => action.content.trim(),
        };
        action.content = trimmed.to_string();
    }
}

fn artifact_id(state: &StreamState) -> Option<String> {
    state.current_artifact.as_ref().and_then(|a| a.id.clone())
}

fn trim_leading_blank_lines(s: &str) -> &str {
    let mut rest = s;
    while let Some(nl) = rest.find('\n') {
        if !rest[..nl].trim().is_empty() {
            break;
        }
        rest = &rest[nl + 1..];
    }
    rest
}
