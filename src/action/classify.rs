//! Shell command classification.
//!
//! The runner never inspects command strings itself; it asks a
//! `CommandClassifier`. The default `PatternClassifier` compares the last
//! `&&`-separated segment of a command against the configured lists.

use super::types::CommandKind;
use crate::config::CommandsSection;

pub trait CommandClassifier: Send + Sync {
    fn classify(&self, command: &str) -> CommandKind;
}

impl<F> CommandClassifier for F
where
    F: Fn(&str) -> CommandKind + Send + Sync,
{
    fn classify(&self, command: &str) -> CommandKind {
        self(command)
    }
}

/// Exact-match classifier over known command lines.
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    install: Vec<String>,
    build: Vec<String>,
    start: Vec<String>,
}

impl PatternClassifier {
    pub fn new(install: Vec<String>, build: Vec<String>, start: Vec<String>) -> Self {
        Self {
            install: install.iter().map(|c| normalize(c)).collect(),
            build: build.iter().map(|c| normalize(c)).collect(),
            start: start.iter().map(|c| normalize(c)).collect(),
        }
    }

    pub fn from_config(commands: &CommandsSection) -> Self {
        Self::new(
            commands.install.clone(),
            commands.build.clone(),
            commands.start.clone(),
        )
    }
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self::from_config(&CommandsSection::default())
    }
}

impl CommandClassifier for PatternClassifier {
    fn classify(&self, command: &str) -> CommandKind {
        let key = normalize(last_segment(command));
        if self.start.contains(&key) {
            CommandKind::Start
        } else if self.build.contains(&key) {
            CommandKind::Build
        } else if self.install.contains(&key) {
            CommandKind::Install
        } else {
            CommandKind::Ordinary
        }
    }
}

/// `cd app && npm install && npm run dev` → `npm run dev`
fn last_segment(command: &str) -> &str {
    command.rsplit("&&").next().unwrap_or(command)
}

/// Collapse runs of whitespace so `npm   run dev` matches `npm run dev`.
fn normalize(command: &str) -> String {
    command.split_whitespace().collect::<Vec<_>>().join(" ")
}
