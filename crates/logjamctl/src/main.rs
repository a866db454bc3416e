//! Logjam Control - operator entry point for recovery
//!
//! Loads the configuration once, wires the host providers into the
//! orchestrator and maps the outcome to an exit status.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use logjam_common::{logging, Component, Config, HostSystem, RunContext, TerminalConfirm};
use logjamctl::cli::{Cli, Commands};
use logjamctl::errors::{EXIT_CONFIG_ERROR, EXIT_FATAL, EXIT_SUCCESS};
use logjamctl::{Recovery, RunOutcome};
use owo_colors::OwoColorize;
use std::process;

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            process::exit(EXIT_CONFIG_ERROR);
        }
    };

    let interactive = logging::is_interactive();
    logging::init(interactive, &config.logging.level);

    let code = match run(cli.command, &config, interactive) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            EXIT_FATAL
        }
    };
    process::exit(code);
}

fn run(command: Commands, config: &Config, interactive: bool) -> Result<i32> {
    match command {
        Commands::Config => {
            let rendered = config.to_toml().context("rendering configuration")?;
            print!("{}", rendered);
            Ok(EXIT_SUCCESS)
        }
        Commands::Recover { skip_backup } => recover(config, skip_backup, interactive),
    }
}

fn recover(config: &Config, skip_backup: bool, interactive: bool) -> Result<i32> {
    let host = HostSystem::new();
    let confirm = TerminalConfirm;
    let ctx = RunContext::new(Component::Recovery, config, Local::now(), interactive);
    let recovery = Recovery::new(config, &host, &host, &confirm, ctx);

    let result = recovery.run(skip_backup);

    match &result.outcome {
        RunOutcome::Success => {
            println!("{} recovery completed", "✓".green().bold());
        }
        RunOutcome::AbortedByOperator(phase, reason) => {
            eprintln!("{} aborted in {}: {}", "!".yellow().bold(), phase, reason);
        }
        RunOutcome::FatalError(phase, reason) => {
            eprintln!("{} {} failed: {}", "✗".red().bold(), phase.bold(), reason);
        }
    }
    if let Some(dir) = &result.backup_dir {
        println!("  backups: {}", dir.display());
    }
    match &result.report_path {
        Some(path) => println!("  report:  {}", path.display()),
        None => println!("  report:  not written"),
    }
    if let Some(path) = &result.log_path {
        println!("  log:     {}", path.display());
    }
    if result.write_failures > 0 {
        eprintln!(
            "{} {} report or log writes failed",
            "!".yellow().bold(),
            result.write_failures
        );
    }

    Ok(result.outcome.exit_code())
}
