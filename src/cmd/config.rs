//! Configuration view and validation commands: `artifact-runner config`.

use anyhow::Result;
use artifact_runner::config::{CONFIG_FILE, RunnerConfig, RunnerToml};
use std::path::Path;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = project_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Artifact Runner Configuration");
            println!("=============================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                RunnerToml::load(&config_path)?
            } else {
                println!("No {} found at {}", CONFIG_FILE, project_dir.display());
                println!("Using default configuration:");
                RunnerToml::default()
            };
            println!();
            print_toml(&toml);

            println!("Effective values (with env overrides):");
            let config = RunnerConfig::new(project_dir.to_path_buf())?;
            println!("  sandbox_root = \"{}\"", config.sandbox_root().display());
            println!("  shell = \"{}\"", config.shell());
            println!("  start_settle_ms = {}", config.start_settle().as_millis());
            println!();

            if !config_path.exists() {
                println!("Run 'artifact-runner config init' to create {}.", CONFIG_FILE);
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE);
                return Ok(());
            }

            let toml = RunnerToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            RunnerToml::default().save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [parser] tag names and fence stripping");
            println!("  - [commands] install, build and start command lists");
            println!("  - [sandbox] root directory and shell");
            println!();
        }
    }

    Ok(())
}

fn print_toml(toml: &RunnerToml) {
    println!("[parser]");
    println!("  artifact_tag = \"{}\"", toml.parser.artifact_tag);
    println!("  action_tag = \"{}\"", toml.parser.action_tag);
    println!("  strip_fences = {}", toml.parser.strip_fences);
    println!();

    println!("[commands]");
    println!("  install = {:?}", toml.commands.install);
    println!("  build = {:?}", toml.commands.build);
    println!("  start = {:?}", toml.commands.start);
    println!();

    println!("[queue]");
    println!("  start_settle_ms = {}", toml.queue.start_settle_ms);
    println!();

    println!("[start]");
    println!("  ready_timeout_secs = {}", toml.start.ready_timeout_secs);
    println!();

    println!("[build]");
    println!("  output_dirs = {:?}", toml.build.output_dirs);
    println!();

    println!("[sandbox]");
    println!("  root = \"{}\"", toml.sandbox.root.display());
    println!("  shell = \"{}\"", toml.sandbox.shell);
    println!();
}
