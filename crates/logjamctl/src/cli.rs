//! CLI - Command-line argument parsing
//!
//! Defines the CLI structure using clap.
//! Keeps argument parsing separate from execution logic.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Logjam recovery control
#[derive(Parser, Debug)]
#[command(name = "logjamctl")]
#[command(about = "Logjam - reclaim a partition filled by a runaway log", long_about = None)]
#[command(version = env!("LOGJAM_VERSION"))]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Configuration file (overrides $LOGJAM_CONFIG and /etc/logjam/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the phased recovery: preflight, backup and reclaim, service
    /// restoration, preventive configuration
    Recover {
        /// Truncate without copying the oversized file first
        #[arg(long)]
        skip_backup: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_recover_flags() {
        let cli = Cli::parse_from(["logjamctl", "recover", "--skip-backup"]);
        assert!(cli.config.is_none());
        assert!(matches!(cli.command, Commands::Recover { skip_backup: true }));

        let cli = Cli::parse_from(["logjamctl", "recover", "--config", "/tmp/l.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/l.toml")));
        assert!(matches!(cli.command, Commands::Recover { skip_backup: false }));
    }

    #[test]
    fn test_config_before_subcommand() {
        let cli = Cli::parse_from(["logjamctl", "--config", "x.toml", "config"]);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Commands::Config));
    }
}
