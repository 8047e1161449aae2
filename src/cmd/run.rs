//! `artifact-runner run` and `artifact-runner apply`: execute actions in the
//! sandbox.

use anyhow::{Context, Result, bail};
use artifact_runner::config::RunnerConfig;
use artifact_runner::parser::StreamingParser;
use artifact_runner::runner::{ActionOutcome, ActionRunner, RunnerEvent};
use artifact_runner::runtime::{LocalRuntime, ScriptedRuntime, ShellSession};
use artifact_runner::ui::StatusPrinter;
use artifact_runner::ui::icons::PACKAGE;
use artifact_runner::workbench::{ActionReport, Snapshot, Workbench};
use console::style;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::chunk_ends;
use super::parse::stream_id_for;

pub async fn cmd_run(config: &RunnerConfig, file: &Path, chunk_size: usize, dry_run: bool) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read transcript: {}", file.display()))?;
    let message_id = stream_id_for(file);

    let mut session = Session::open(config, dry_run)?;
    let mut stdout = std::io::stdout();
    for end in chunk_ends(&text, chunk_size) {
        let delta = session.workbench.push(&message_id, &text[..end]);
        if !delta.is_empty() {
            write!(stdout, "{}", delta).context("Failed to write to stdout")?;
            stdout.flush().context("Failed to flush stdout")?;
        }
    }
    println!();

    if let Some(state) = session.workbench.stream_state(&message_id)
        && state.inside_artifact()
    {
        tracing::warn!(message_id = %message_id, "Transcript ended inside an unfinished artifact");
    }

    session.finish().await
}

pub async fn cmd_apply(config: &RunnerConfig, snapshot_path: &Path, dry_run: bool) -> Result<()> {
    let snapshot = Snapshot::load(snapshot_path)?;
    if snapshot.is_empty() {
        println!("Snapshot {} has nothing to apply.", snapshot_path.display());
        return Ok(());
    }

    let mut session = Session::open(config, dry_run)?;
    let count = session
        .workbench
        .reapply(&stream_id_for(snapshot_path), &snapshot);
    println!("{}Applying {} actions from {}", PACKAGE, count, snapshot_path.display());

    session.finish().await
}

/// A workbench plus the background task that prints its events.
struct Session {
    workbench: Workbench,
    printer: JoinHandle<()>,
    stop: CancellationToken,
    scripted: Option<Arc<ScriptedRuntime>>,
}

impl Session {
    fn open(config: &RunnerConfig, dry_run: bool) -> Result<Self> {
        tracing::debug!(
            project_dir = %config.project_dir.display(),
            from_file = config.from_file,
            dry_run,
            "Opening session"
        );
        let (runner, output, scripted) = if dry_run {
            let runtime = Arc::new(ScriptedRuntime::new());
            let output = runtime.output();
            (
                ActionRunner::from_config(runtime.clone(), config),
                output,
                Some(runtime),
            )
        } else {
            let root = config.sandbox_root();
            let runtime = Arc::new(
                LocalRuntime::new(&root, config.shell())
                    .with_context(|| format!("Cannot use sandbox root {}", root.display()))?,
            );
            let output = runtime.output();
            (ActionRunner::from_config(runtime, config), output, None)
        };

        let runner = Arc::new(runner);
        let stop = CancellationToken::new();
        let printer = tokio::spawn(print_events(
            runner.subscribe(),
            output,
            StatusPrinter::new(config.verbose),
            stop.clone(),
        ));
        let workbench = Workbench::new(StreamingParser::from_config(&config.toml.parser), runner);

        Ok(Self {
            workbench,
            printer,
            stop,
            scripted,
        })
    }

    /// Wait for every action, keep dev servers alive until Ctrl+C, and fail
    /// if any action failed.
    async fn finish(mut self) -> Result<()> {
        let reports = self.workbench.settle().await;

        let servers: Vec<&ActionReport> = reports
            .iter()
            .filter(|r| matches!(r.result, Ok(ActionOutcome::Started)))
            .collect();
        if !servers.is_empty() && self.scripted.is_none() {
            println!(
                "{}",
                style("Dev server running. Press Ctrl+C to stop.").bold()
            );
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl+C")?;
            for report in &servers {
                self.workbench
                    .runner()
                    .abort(&report.message_id, report.action_id);
            }
        }

        self.stop.cancel();
        if let Err(e) = self.printer.await {
            tracing::warn!(error = %e, "Event printer task failed");
        }

        if let Some(runtime) = &self.scripted {
            print_dry_run(runtime);
        }

        let failed = reports.iter().filter(|r| r.result.is_err()).count();
        if failed > 0 {
            bail!("{} of {} actions failed", failed, reports.len());
        }
        Ok(())
    }
}

async fn print_events(
    mut events: broadcast::Receiver<RunnerEvent>,
    mut output: broadcast::Receiver<String>,
    printer: StatusPrinter,
    stop: CancellationToken,
) {
    let print_line = |line: &str| println!("    {}", style(line).dim());
    let mut output_open = true;

    loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Ok(event) => printer.print(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Dropped runner events");
                }
                Err(RecvError::Closed) => break,
            },
            line = output.recv(), if output_open => match line {
                Ok(line) => print_line(&line),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => output_open = false,
            },
            _ = stop.cancelled() => {
                while let Ok(line) = output.try_recv() {
                    print_line(&line);
                }
                while let Ok(event) = events.try_recv() {
                    printer.print(&event);
                }
                break;
            }
        }
    }
}

fn print_dry_run(runtime: &ScriptedRuntime) {
    println!();
    println!("{}", style("Dry run: nothing was written or executed.").bold());
    for (path, content) in runtime.files() {
        println!("  would write {} ({} bytes)", path, content.len());
    }
    for command in runtime.executed() {
        println!("  would run   {}", command);
    }
}
