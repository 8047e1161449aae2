//! Glue between the streaming parser and the action queue.
//!
//! The workbench owns the parser store for its session. Each `push` feeds
//! the growing buffer of one message through the parser, turns every closed
//! action into a queued action, and hands back the plain text to render.

use crate::action::{Action, ActionId};
use crate::errors::ActionError;
use crate::parser::{ArtifactInfo, ParserEvent, ParserStore, StreamState, StreamingParser};
use crate::runner::{ActionHandle, ActionOutcome, ActionRunner};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Files and commands to replay without going through the parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub commands: Vec<String>,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot: {}", path.display()))
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.commands.is_empty()
    }
}

/// Final result of one action started by the workbench.
#[derive(Debug)]
pub struct ActionReport {
    pub message_id: String,
    pub action_id: ActionId,
    pub result: Result<ActionOutcome, ActionError>,
}

pub struct Workbench {
    parser: StreamingParser,
    store: ParserStore,
    runner: Arc<ActionRunner>,
    artifacts: HashMap<String, Vec<ArtifactInfo>>,
    pending: Vec<ActionHandle>,
}

impl Workbench {
    pub fn new(parser: StreamingParser, runner: Arc<ActionRunner>) -> Self {
        Self {
            parser,
            store: ParserStore::new(),
            runner,
            artifacts: HashMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn runner(&self) -> &Arc<ActionRunner> {
        &self.runner
    }

    /// Parse the buffer received so far for `message_id` and enqueue every
    /// action that closed. Returns the new plain text.
    pub fn push(&mut self, message_id: &str, buffer: &str) -> String {
        let mut events = Vec::new();
        let text = self
            .parser
            .parse(&mut self.store, message_id, buffer, &mut events);

        for event in events {
            match event {
                ParserEvent::ArtifactOpen { artifact, .. } => {
                    tracing::info!(
                        message_id,
                        id = artifact.id.as_deref().unwrap_or("-"),
                        title = artifact.title.as_deref().unwrap_or("-"),
                        "Artifact opened"
                    );
                    self.artifacts
                        .entry(message_id.to_string())
                        .or_default()
                        .push(artifact);
                }
                ParserEvent::ActionClose { action, .. } => match action.to_action() {
                    Some(executable) => self.enqueue(message_id, action.id, executable),
                    None => {
                        tracing::warn!(message_id, action_id = action.id, "Skipping non-executable action");
                    }
                },
                ParserEvent::ActionOpen { .. } | ParserEvent::ArtifactClose { .. } => {}
            }
        }
        text
    }

    /// Enqueue a snapshot: every file, sorted by path, then every command.
    /// Returns the number of actions enqueued.
    pub fn reapply(&mut self, message_id: &str, snapshot: &Snapshot) -> usize {
        let mut next_id = self.next_action_id(message_id);
        let actions = snapshot
            .files
            .iter()
            .map(|(path, content)| Action::file(path.clone(), content.clone()))
            .chain(snapshot.commands.iter().map(Action::shell))
            .collect::<Vec<_>>();

        let count = actions.len();
        for action in actions {
            self.enqueue(message_id, next_id, action);
            next_id += 1;
        }
        tracing::info!(message_id, count, "Re-applied snapshot");
        count
    }

    /// Wait for every action started so far and collect the results.
    pub async fn settle(&mut self) -> Vec<ActionReport> {
        let mut reports = Vec::with_capacity(self.pending.len());
        for handle in self.pending.drain(..) {
            let message_id = handle.message_id.clone();
            let action_id = handle.action_id;
            reports.push(ActionReport {
                message_id,
                action_id,
                result: handle.wait().await,
            });
        }
        reports
    }

    pub fn artifacts(&self, message_id: &str) -> &[ArtifactInfo] {
        self.artifacts
            .get(message_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn stream_state(&self, message_id: &str) -> Option<&StreamState> {
        self.store.get(message_id)
    }

    /// Forget everything kept for a finished message: parser state,
    /// artifacts and the runner's finished actions.
    pub fn retire(&mut self, message_id: &str) {
        self.store.remove(message_id);
        self.artifacts.remove(message_id);
        self.runner.forget(message_id);
    }

    /// Discard all in-flight parsing, e.g. after a cancelled generation.
    pub fn reset(&mut self) {
        self.store.reset();
        self.artifacts.clear();
        self.runner.forget_all();
    }

    fn enqueue(&mut self, message_id: &str, action_id: ActionId, action: Action) {
        let handle = self.runner.enqueue(message_id, action_id, action);
        self.pending.push(handle);
    }

    /// First id not used by the parser or the runner for this message.
    fn next_action_id(&self, message_id: &str) -> ActionId {
        let parsed = self
            .store
            .get(message_id)
            .map(StreamState::action_sequence)
            .unwrap_or(0);
        let queued = self
            .runner
            .actions(message_id)
            .iter()
            .map(|s| s.id() + 1)
            .max()
            .unwrap_or(0);
        parsed.max(queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::PatternClassifier;
    use crate::runner::RunnerSettings;
    use crate::runtime::ScriptedRuntime;
    use std::time::Duration;

    fn workbench(runtime: Arc<ScriptedRuntime>) -> Workbench {
        let runner = ActionRunner::new(
            runtime.clone(),
            runtime,
            Arc::new(PatternClassifier::default()),
            RunnerSettings {
                start_settle: Duration::from_millis(10),
                ..RunnerSettings::default()
            },
        );
        Workbench::new(StreamingParser::default(), Arc::new(runner))
    }

    #[tokio::test]
    async fn test_push_enqueues_closed_actions() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let mut bench = workbench(runtime.clone());

        let full = "Setting up.\n<artifact id=\"p\" title=\"Project\">\n<action type=\"file\" path=\"index.js\">console.log(1)</action>\n<action type=\"shell\">node index.js</action>\n</artifact>\nDone.";
        let split = full.len() / 2;
        let mut text = bench.push("m1", &full[..split]);
        text.push_str(&bench.push("m1", full));

        assert_eq!(text, "Setting up.\n\nDone.");
        assert_eq!(bench.artifacts("m1")[0].id.as_deref(), Some("p"));

        let reports = bench.settle().await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.result.is_ok()));
        assert_eq!(runtime.log(), vec!["write:index.js", "exec:node index.js", "done:node index.js"]);
    }

    #[tokio::test]
    async fn test_opaque_actions_are_not_enqueued() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let mut bench = workbench(runtime.clone());

        bench.push(
            "m1",
            "<artifact id=\"a\"><action type=\"deploy\">now</action><action type=\"shell\">ls</action></artifact>",
        );
        let reports = bench.settle().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].action_id, 1);
        assert_eq!(runtime.executed(), vec!["ls"]);
    }

    #[tokio::test]
    async fn test_reapply_writes_files_sorted_then_commands() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let mut bench = workbench(runtime.clone());

        let mut snapshot = Snapshot::default();
        snapshot.files.insert("src/b.ts".into(), "b".into());
        snapshot.files.insert("package.json".into(), "{}".into());
        snapshot.commands.push("npm install".into());

        assert_eq!(bench.reapply("m2", &snapshot), 3);
        bench.settle().await;

        assert_eq!(
            runtime.log(),
            vec![
                "write:package.json",
                "write:src/b.ts",
                "exec:npm install",
                "done:npm install"
            ]
        );
        let ids: Vec<_> = bench.runner().actions("m2").iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_reapply_ids_follow_parsed_actions() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let mut bench = workbench(runtime);

        bench.push("m1", "<artifact id=\"a\"><action type=\"shell\">ls</action></artifact>");
        let snapshot = Snapshot {
            commands: vec!["pwd".into()],
            ..Snapshot::default()
        };
        bench.reapply("m1", &snapshot);
        bench.settle().await;

        let ids: Vec<_> = bench.runner().actions("m1").iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_retire_and_reset_drop_parser_state() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let mut bench = workbench(runtime);

        bench.push("m1", "<artifact id=\"a\"><action type=\"shell\">l");
        bench.push("m2", "hi");
        assert!(bench.stream_state("m1").unwrap().inside_action());

        bench.retire("m1");
        assert!(bench.stream_state("m1").is_none());
        bench.reset();
        assert!(bench.stream_state("m2").is_none());
    }

    #[tokio::test]
    async fn test_retire_releases_artifacts_and_actions() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let mut bench = workbench(runtime);

        bench.push(
            "m1",
            r#"<artifact id="a" title="A"><action type="shell">ls</action></artifact>"#,
        );
        bench.push(
            "m2",
            r#"<artifact id="b" title="B"><action type="file" path="b.txt">b</action></artifact>"#,
        );
        bench.settle().await;
        assert_eq!(bench.artifacts("m1").len(), 1);
        assert_eq!(bench.runner().actions("m1").len(), 1);

        bench.retire("m1");
        assert!(bench.artifacts("m1").is_empty());
        assert!(bench.runner().actions("m1").is_empty());
        assert_eq!(bench.artifacts("m2").len(), 1);

        bench.reset();
        assert!(bench.artifacts("m2").is_empty());
        assert!(bench.runner().actions("m2").is_empty());
    }

    #[test]
    fn test_snapshot_parses_partial_json() {
        let snapshot: Snapshot = serde_json::from_str(r#"{"commands": ["npm install"]}"#).unwrap();
        assert!(snapshot.files.is_empty());
        assert!(!snapshot.is_empty());
    }
}
