//! CLI - Command-line argument parsing

use clap::Parser;
use std::path::PathBuf;

/// One monitoring pass; meant to be run by a scheduler
#[derive(Parser, Debug)]
#[command(name = "logjam-monitor")]
#[command(about = "Logjam monitor - partition usage report and threshold alerts", long_about = None)]
#[command(version = env!("LOGJAM_VERSION"))]
pub struct Cli {
    /// Configuration file (overrides $LOGJAM_CONFIG and /etc/logjam/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
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
    fn test_config_flag() {
        let cli = Cli::parse_from(["logjam-monitor"]);
        assert!(cli.config.is_none());
        let cli = Cli::parse_from(["logjam-monitor", "--config", "/etc/l.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/l.toml")));
    }
}
