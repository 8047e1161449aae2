//! `artifact-runner parse`: replay a transcript through the parser only.

use anyhow::{Context, Result};
use artifact_runner::config::RunnerConfig;
use artifact_runner::parser::{ParserEvent, ParserStore, StreamingParser};
use console::style;
use std::path::Path;

use super::chunk_ends;

pub fn cmd_parse(config: &RunnerConfig, file: &Path, chunk_size: usize, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read transcript: {}", file.display()))?;
    let stream_id = stream_id_for(file);

    let parser = StreamingParser::from_config(&config.toml.parser);
    let mut store = ParserStore::new();
    let mut plain_text = String::new();

    for end in chunk_ends(&text, chunk_size) {
        let mut events = Vec::new();
        let delta = parser.parse(&mut store, &stream_id, &text[..end], &mut events);

        if json {
            if !delta.is_empty() {
                println!("{}", serde_json::json!({ "event": "text", "text": delta }));
            }
            for event in &events {
                println!(
                    "{}",
                    serde_json::to_string(event).context("Failed to serialize parser event")?
                );
            }
        } else {
            for event in &events {
                println!("{}", style(describe(event)).dim());
            }
        }
        plain_text.push_str(&delta);
    }

    if !json {
        println!();
        println!("{}", style("Plain text:").bold());
        println!("{}", plain_text);
    }

    if let Some(state) = store.get(&stream_id)
        && (state.inside_artifact() || state.inside_action())
    {
        tracing::warn!(
            stream_id = %stream_id,
            cursor = state.cursor(),
            "Transcript ended inside an unfinished artifact"
        );
    }
    Ok(())
}

/// Stream id derived from the transcript file name.
pub fn stream_id_for(file: &Path) -> String {
    file.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "transcript".to_string())
}

fn describe(event: &ParserEvent) -> String {
    match event {
        ParserEvent::ArtifactOpen { artifact, .. } | ParserEvent::ArtifactClose { artifact, .. } => {
            format!(
                "[{}] id={} title={}",
                event.name(),
                artifact.id.as_deref().unwrap_or("-"),
                artifact.title.as_deref().unwrap_or("-")
            )
        }
        ParserEvent::ActionOpen { action, .. } => match action.path() {
            Some(path) => format!("[{}] #{} file {}", event.name(), action.id, path),
            None => format!("[{}] #{}", event.name(), action.id),
        },
        ParserEvent::ActionClose { action, .. } => match action.to_action() {
            Some(executable) if action.is_file() => format!(
                "[{}] #{} file {} ({} bytes)",
                event.name(),
                action.id,
                executable.label(),
                action.content.len()
            ),
            Some(executable) => {
                format!("[{}] #{} shell {}", event.name(), action.id, executable.label())
            }
            None => format!("[{}] #{} ignored", event.name(), action.id),
        },
    }
}
