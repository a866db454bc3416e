//! Logjam Monitor - one monitoring pass per invocation
//!
//! Meant for cron or a systemd timer. Exits 0 after a completed pass
//! whatever the classification, 75 when a previous pass still holds the
//! lock.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use logjam_common::{logging, Config, HostSystem};
use logjam_monitor::cli::Cli;
use logjam_monitor::errors::{
    EXIT_ALREADY_RUNNING, EXIT_CONFIG_ERROR, EXIT_ERROR, EXIT_SUCCESS,
};
use logjam_monitor::{MonitorOutcome, MonitorRunner};
use std::process;

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("logjam-monitor: {}", e);
            process::exit(EXIT_CONFIG_ERROR);
        }
    };

    let interactive = logging::is_interactive();
    logging::init(interactive, &config.logging.level);

    let code = match run(&config, interactive) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("logjam-monitor: {:#}", e);
            EXIT_ERROR
        }
    };
    process::exit(code);
}

fn run(config: &Config, interactive: bool) -> Result<i32> {
    let host = HostSystem::new();
    let runner = MonitorRunner::new(config, &host, &host, interactive);
    let pass = runner
        .run_at(Local::now())
        .context("monitor pass failed")?;

    match pass.outcome {
        MonitorOutcome::Completed(classification) => {
            if interactive {
                match &pass.report_path {
                    Some(report) => println!("{}: {}", classification, report.display()),
                    None => println!("{}: no report written", classification),
                }
            }
            if pass.write_failures > 0 {
                eprintln!(
                    "logjam-monitor: {} report or log writes failed",
                    pass.write_failures
                );
            }
            Ok(EXIT_SUCCESS)
        }
        MonitorOutcome::AlreadyRunning => {
            eprintln!(
                "logjam-monitor: another pass holds {}",
                config.monitor.lock_path.display()
            );
            Ok(EXIT_ALREADY_RUNNING)
        }
    }
}
