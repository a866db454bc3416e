//! Command execution with optional timeout
//!
//! Captures exit code, stdout, stderr and duration. Does not interpret
//! output; callers decide what a non-zero exit means for them.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Maximum output length to capture per stream
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Exit code 0
    Success,
    NonZeroExit,
    CommandNotFound,
    PermissionDenied,
    /// Killed after exceeding its timeout
    Timeout,
    OsError,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NonZeroExit => "non-zero exit",
            Self::CommandNotFound => "command not found",
            Self::PermissionDenied => "permission denied",
            Self::Timeout => "timeout",
            Self::OsError => "OS error",
        }
    }
}

/// Result of a command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub command: String,
    /// -1 when the process never produced an exit code
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub status: ExecutionStatus,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Build an outcome without running anything
    pub fn synthetic(command: &str, status: ExecutionStatus, stderr: &str) -> Self {
        Self {
            command: command.to_string(),
            exit_code: if status == ExecutionStatus::Success { 0 } else { 1 },
            stdout: String::new(),
            stderr: stderr.to_string(),
            duration_ms: 0,
            status,
        }
    }

    /// One-line description for reports
    pub fn summary(&self) -> String {
        if self.success() {
            return format!("`{}` ok ({}ms)", self.command, self.duration_ms);
        }
        let detail = self.stderr.lines().next().unwrap_or("").trim();
        if detail.is_empty() {
            format!(
                "`{}` {} (exit {})",
                self.command,
                self.status.as_str(),
                self.exit_code
            )
        } else {
            format!(
                "`{}` {} (exit {}): {}",
                self.command,
                self.status.as_str(),
                self.exit_code,
                detail
            )
        }
    }
}

/// Run `argv`, killing it if it outlives `timeout`
pub fn run_command(argv: &[String], timeout: Option<Duration>) -> CommandOutcome {
    let start = Instant::now();
    let command = argv.join(" ");

    let Some((program, args)) = argv.split_first() else {
        return CommandOutcome::synthetic("", ExecutionStatus::OsError, "empty command");
    };

    let spawned = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            let status = match e.kind() {
                std::io::ErrorKind::NotFound => ExecutionStatus::CommandNotFound,
                std::io::ErrorKind::PermissionDenied => ExecutionStatus::PermissionDenied,
                _ => ExecutionStatus::OsError,
            };
            return CommandOutcome {
                command,
                exit_code: -1,
                stdout: String::new(),
                stderr: format!("OS error: {}", e),
                duration_ms: start.elapsed().as_millis() as u64,
                status,
            };
        }
    };

    // Drain pipes on threads so a chatty child cannot block on a full pipe
    let stdout_handle = child.stdout.take().map(|s| thread::spawn(move || read_limited(s)));
    let stderr_handle = child.stderr.take().map(|s| thread::spawn(move || read_limited(s)));

    let mut timed_out = false;
    let waited = match timeout {
        Some(limit) => match child.wait_timeout(limit) {
            Ok(Some(status)) => Ok(status),
            Ok(None) => {
                warn!(command = %command, timeout_secs = limit.as_secs(), "command timed out, killing");
                timed_out = true;
                let _ = child.kill();
                child.wait()
            }
            Err(e) => Err(e),
        },
        None => child.wait(),
    };

    let stdout = stdout_handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    let stderr = stderr_handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    let duration_ms = start.elapsed().as_millis() as u64;

    match waited {
        Ok(exit) => {
            let status = if timed_out {
                ExecutionStatus::Timeout
            } else if exit.success() {
                ExecutionStatus::Success
            } else if stderr.contains("Permission denied") || stderr.contains("Access denied") {
                ExecutionStatus::PermissionDenied
            } else {
                ExecutionStatus::NonZeroExit
            };
            debug!(command = %command, exit_code = ?exit.code(), status = status.as_str(), "command finished");
            CommandOutcome {
                command,
                exit_code: exit.code().unwrap_or(-1),
                stdout,
                stderr,
                duration_ms,
                status,
            }
        }
        Err(e) => CommandOutcome {
            command,
            exit_code: -1,
            stdout,
            stderr: format!("OS error: {}", e),
            duration_ms,
            status: ExecutionStatus::OsError,
        },
    }
}

fn read_limited<R: Read>(mut reader: R) -> String {
    let mut kept = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = MAX_OUTPUT_BYTES.saturating_sub(kept.len());
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    String::from_utf8_lossy(&kept).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_successful_command() {
        let outcome = run_command(&argv(&["sh", "-c", "echo logjam-ok"]), None);
        assert!(outcome.success());
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.stdout.contains("logjam-ok"));
    }

    #[test]
    fn test_non_zero_exit() {
        let outcome = run_command(&argv(&["sh", "-c", "echo nope >&2; exit 3"]), None);
        assert_eq!(outcome.status, ExecutionStatus::NonZeroExit);
        assert_eq!(outcome.exit_code, 3);
        assert!(outcome.summary().contains("nope"));
    }

    #[test]
    fn test_missing_binary() {
        let outcome = run_command(&argv(&["logjam-definitely-not-installed"]), None);
        assert_eq!(outcome.status, ExecutionStatus::CommandNotFound);
        assert!(!outcome.success());
    }

    #[test]
    fn test_timeout_kills_child() {
        let outcome = run_command(
            &argv(&["sh", "-c", "exec sleep 5"]),
            Some(Duration::from_millis(200)),
        );
        assert_eq!(outcome.status, ExecutionStatus::Timeout);
        assert!(outcome.duration_ms < 5000);
    }

    #[test]
    fn test_empty_argv() {
        let outcome = run_command(&[], None);
        assert_eq!(outcome.status, ExecutionStatus::OsError);
    }
}
