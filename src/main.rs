use anyhow::{Context, Result};
use artifact_runner::config::RunnerConfig;
use artifact_runner::logging::{self, LogFormat};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "artifact-runner")]
#[command(version, about = "Parse streamed artifact tags and run their actions in a sandbox")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Also write logs to a daily-rolling file in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a transcript through the parser and print its events
    Parse {
        file: PathBuf,

        /// Feed the transcript in chunks of this many bytes (0 = all at once)
        #[arg(long, default_value = "64")]
        chunk_size: usize,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Replay a transcript and execute its actions in the sandbox
    Run {
        file: PathBuf,

        #[arg(long, default_value = "64")]
        chunk_size: usize,

        /// Use an in-memory sandbox; nothing is written or executed
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-apply a JSON snapshot of files and commands
    Apply {
        snapshot: PathBuf,

        #[arg(long)]
        dry_run: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    Show,
    Validate,
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose, cli.log_format, cli.log_dir.as_deref())?;

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Parse {
            file,
            chunk_size,
            json,
        } => {
            let config = RunnerConfig::with_cli_args(project_dir, cli.verbose)?;
            cmd::cmd_parse(&config, file, *chunk_size, *json)?;
        }
        Commands::Run {
            file,
            chunk_size,
            dry_run,
        } => {
            let config = RunnerConfig::with_cli_args(project_dir, cli.verbose)?;
            cmd::cmd_run(&config, file, *chunk_size, *dry_run).await?;
        }
        Commands::Apply { snapshot, dry_run } => {
            let config = RunnerConfig::with_cli_args(project_dir, cli.verbose)?;
            cmd::cmd_apply(&config, snapshot, *dry_run).await?;
        }
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
