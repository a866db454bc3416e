//! Host providers
//!
//! `SystemFacts` answers point-in-time, read-only questions about the host.
//! `SystemControl` performs the mutating actions. Every mutation is
//! re-checkable through `SystemFacts`, which is how the recovery phases
//! verify their own work.
//!
//! `HostSystem` is the production implementation and shells out to the
//! usual tools (df, systemctl, logger). Tests use `fake::FakeHost`.

pub mod exec;
pub mod system;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use exec::CommandOutcome;
pub use system::HostSystem;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Space usage of the filesystem containing a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    /// Percent full as reported by df
    pub percent_used: u8,
}

/// Runtime state of a service unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Active,
    Failed,
    Inactive,
    Activating,
    /// Unit missing or state not recognised
    Unknown(String),
}

impl ServiceState {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "active" => ServiceState::Active,
            "failed" => ServiceState::Failed,
            "inactive" => ServiceState::Inactive,
            "activating" | "reloading" => ServiceState::Activating,
            other => ServiceState::Unknown(other.to_string()),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ServiceState::Active)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ServiceState::Active => "active",
            ServiceState::Failed => "failed",
            ServiceState::Inactive => "inactive",
            ServiceState::Activating => "activating",
            ServiceState::Unknown(s) if s.is_empty() => "unknown",
            ServiceState::Unknown(s) => s,
        }
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One directory and its recursive size
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirUsage {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Result of ranking directories by size
#[derive(Debug, Clone, Default)]
pub struct ConsumerScan {
    /// Largest first
    pub entries: Vec<DirUsage>,
    /// Entries that could not be read
    pub skipped: usize,
}

/// Syslog priority used for alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    /// Facility.priority understood by logger(1)
    pub fn priority(&self) -> &'static str {
        match self {
            Severity::Warning => "user.warning",
            Severity::Critical => "user.crit",
        }
    }
}

/// Read-only host queries
pub trait SystemFacts {
    /// Effective uid is root
    fn is_privileged(&self) -> bool;

    /// Resolve `name` on PATH
    fn command_available(&self, name: &str) -> bool;

    fn disk_usage(&self, path: &Path) -> Result<DiskUsage>;

    /// Size in bytes, `None` when the file does not exist
    fn file_size(&self, path: &Path) -> io::Result<Option<u64>>;

    fn service_state(&self, service: &str) -> ServiceState;

    /// Entries of `dir` whose file name matches `pattern` (`*` and `?`).
    /// `None` when `dir` itself does not exist.
    fn matching_entries(&self, dir: &Path, pattern: &str) -> io::Result<Option<Vec<PathBuf>>>;

    /// Immediate subdirectories of `root` ranked by recursive size
    fn top_consumers(&self, root: &Path, limit: usize) -> ConsumerScan;

    /// Last `lines` lines of a text file
    fn tail(&self, path: &Path, lines: usize) -> io::Result<Vec<String>>;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn hostname(&self) -> String;
}

/// Mutating host actions
pub trait SystemControl {
    /// Copy `from` to `to`, returning bytes written
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64>;

    /// Truncate to zero length in place, keeping the inode
    fn truncate(&self, path: &Path) -> io::Result<()>;

    /// Replace file contents
    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()>;

    fn append_file(&self, path: &Path, contents: &str) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn restart_service(&self, service: &str, timeout: Option<Duration>) -> CommandOutcome;

    /// Run an arbitrary command vector
    fn run(&self, argv: &[String], timeout: Option<Duration>) -> CommandOutcome;

    /// Emit a message to the host's system log
    fn syslog(&self, severity: Severity, message: &str) -> CommandOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_state_parse() {
        assert_eq!(ServiceState::parse("active\n"), ServiceState::Active);
        assert_eq!(ServiceState::parse("failed"), ServiceState::Failed);
        assert_eq!(ServiceState::parse("inactive"), ServiceState::Inactive);
        assert_eq!(ServiceState::parse("activating"), ServiceState::Activating);
        assert_eq!(
            ServiceState::parse("bogus"),
            ServiceState::Unknown("bogus".to_string())
        );
        assert_eq!(ServiceState::Unknown(String::new()).as_str(), "unknown");
    }
}
