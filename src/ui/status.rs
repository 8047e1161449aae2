//! Line-oriented rendering of runner events for the terminal.

use crate::action::{ActionState, FileActionState, ShellActionState};
use crate::runner::{ActionAlert, AlertKind, RunnerEvent};
use crate::ui::icons::{CHECK, CROSS, FILE_MOD, FILE_NEW, QUEUED, RUNNING, SERVER, STOP, WARN};
use console::style;

/// Prints one line per runner event. Intermediate states (queued, creating,
/// updating) only show when verbose.
pub struct StatusPrinter {
    verbose: bool,
}

impl StatusPrinter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn print(&self, event: &RunnerEvent) {
        if let Some(line) = self.render(event) {
            println!("{}", line);
        }
    }

    pub fn render(&self, event: &RunnerEvent) -> Option<String> {
        match event {
            RunnerEvent::StatusChanged { state, .. } => self.render_state(state),
            RunnerEvent::Alert { alert, .. } => Some(render_alert(alert)),
            RunnerEvent::ActionFailed { error, .. } => {
                Some(format!("{}{}", CROSS, style(error).red()))
            }
            RunnerEvent::ServerReady { url, .. } => {
                Some(format!("{}Server ready at {}", SERVER, style(url).cyan().underlined()))
            }
        }
    }

    fn render_state(&self, state: &ActionState) -> Option<String> {
        match state {
            ActionState::File { path, state, .. } => match state {
                FileActionState::Created => Some(format!("{}{}", FILE_NEW, style(path).green())),
                FileActionState::Updated => Some(format!("{}{}", FILE_MOD, style(path).yellow())),
                FileActionState::Creating | FileActionState::Updating if self.verbose => {
                    Some(format!("{}{} {}", QUEUED, state.as_str(), style(path).dim()))
                }
                _ => None,
            },
            ActionState::Shell { command, state, .. } => match state {
                ShellActionState::Queued if !self.verbose => None,
                ShellActionState::Queued => Some(format!("{}{}", QUEUED, style(command).dim())),
                ShellActionState::Running => Some(format!("{}{}", RUNNING, style(command).bold())),
                ShellActionState::Completed => Some(format!("{}{}", CHECK, command)),
                ShellActionState::Error => Some(format!("{}{}", CROSS, style(command).red())),
                ShellActionState::Aborted => Some(format!("{}{}", STOP, style(command).dim())),
            },
        }
    }
}

fn render_alert(alert: &ActionAlert) -> String {
    let icon = match alert.kind {
        AlertKind::Error => &CROSS,
        AlertKind::Warning => &WARN,
    };
    let mut line = format!(
        "{}{}: {}",
        icon,
        style(&alert.title).bold(),
        alert.description
    );
    let output = alert.content.trim_end();
    if !output.is_empty() {
        for out in output.lines() {
            line.push_str(&format!("\n    {}", style(out).dim()));
        }
    }
    line
}
