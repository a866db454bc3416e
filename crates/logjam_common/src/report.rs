//! Report sink
//!
//! Two append-only outputs per run:
//! - the human-readable report, one file per invocation
//! - the structured run log (JSONL), one file per day per component
//!
//! Every write is flushed before returning, so a run that halts leaves a
//! readable partial report. Write failures are reported through tracing and
//! counted; they never halt a run on their own.
//!
//! `AlertLog` is the flat, cross-run alerts file. It is only ever appended.

use crate::context::{Component, RunContext};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Log level for run log entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// A structured run log entry (JSONL format)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: Component,
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    pub message: String,
}

impl LogEntry {
    /// Serialize to JSONL (single line JSON)
    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"timestamp":"{}","level":"{}","message":"serialization_error"}}"#,
                self.timestamp.to_rfc3339(),
                self.level.as_str()
            )
        })
    }
}

/// Format bytes to human-readable (KB, MB, GB)
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.1}GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.1}MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{}B", bytes)
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

pub struct ReportSink {
    component: Component,
    run_id: String,
    report_path: PathBuf,
    log_path: PathBuf,
    report: Option<File>,
    log: Option<File>,
    write_failures: usize,
}

impl ReportSink {
    /// Create the report and open the day's run log.
    ///
    /// Never fails. A side that cannot be opened is warned about once and
    /// every later write to it is dropped and counted.
    pub fn open(ctx: &RunContext) -> Self {
        let mut write_failures = 0;
        let mut open = |path: &Path, what: &str| match open_append(path) {
            Ok(file) => Some(file),
            Err(e) => {
                write_failures += 1;
                warn!(path = %path.display(), error = %e, "cannot open {}", what);
                None
            }
        };
        let report = open(&ctx.report_path, "report");
        let log = open(&ctx.log_path, "run log");

        Self {
            component: ctx.component,
            run_id: ctx.run_id.clone(),
            report_path: ctx.report_path.clone(),
            log_path: ctx.log_path.clone(),
            report,
            log,
            write_failures,
        }
    }

    /// The run log, if it could be opened
    pub fn log_path(&self) -> Option<&Path> {
        self.log.as_ref().map(|_| self.log_path.as_path())
    }

    /// Opens and writes that did not reach disk
    pub fn write_failures(&self) -> usize {
        self.write_failures
    }

    fn write_report(&mut self, text: &str) {
        let Some(report) = self.report.as_mut() else {
            self.write_failures += 1;
            return;
        };
        let result = report
            .write_all(text.as_bytes())
            .and_then(|_| report.flush());
        if let Err(e) = result {
            self.write_failures += 1;
            warn!(path = %self.report_path.display(), error = %e, "report write failed");
        }
    }

    /// Start a labeled section
    pub fn section(&mut self, title: &str) {
        let rule = "=".repeat(title.len().max(8));
        self.write_report(&format!("\n{}\n{}\n", title, rule));
    }

    pub fn line(&mut self, text: &str) {
        self.write_report(&format!("{}\n", text));
    }

    pub fn kv(&mut self, key: &str, value: impl std::fmt::Display) {
        self.write_report(&format!("{:<24} {}\n", format!("{}:", key), value));
    }

    /// Record an event in the run log and mirror it to the console
    pub fn event(&mut self, level: LogLevel, phase: Option<&str>, message: &str) {
        match level {
            LogLevel::Info => info!(component = %self.component, phase, "{}", message),
            LogLevel::Warn => warn!(component = %self.component, phase, "{}", message),
            LogLevel::Error => error!(component = %self.component, phase, "{}", message),
        }

        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            component: self.component,
            run_id: self.run_id.clone(),
            phase: phase.map(str::to_string),
            message: message.to_string(),
        };
        let Some(log) = self.log.as_mut() else {
            self.write_failures += 1;
            return;
        };
        let result = writeln!(log, "{}", entry.to_jsonl()).and_then(|_| log.flush());
        if let Err(e) = result {
            self.write_failures += 1;
            warn!(path = %self.log_path.display(), error = %e, "run log write failed");
        }
    }

    pub fn info(&mut self, phase: Option<&str>, message: &str) {
        self.event(LogLevel::Info, phase, message);
    }

    pub fn warn(&mut self, phase: Option<&str>, message: &str) {
        self.event(LogLevel::Warn, phase, message);
    }

    pub fn error(&mut self, phase: Option<&str>, message: &str) {
        self.event(LogLevel::Error, phase, message);
    }

    /// Finish the report; nothing can be written afterwards.
    /// Returns the report path, or `None` if the report was never created.
    pub fn close(mut self) -> Option<PathBuf> {
        let closed = Local::now().format("%Y-%m-%d %H:%M:%S %Z").to_string();
        self.write_report(&format!("\n-- report closed {} --\n", closed));
        if let Some(log) = &self.log {
            let _ = log.sync_all();
        }
        let report = self.report.take()?;
        let _ = report.sync_all();
        Some(self.report_path)
    }
}

/// One line in the alerts file
#[derive(Debug, Clone)]
pub struct Alert {
    pub timestamp: DateTime<Local>,
    pub host: String,
    pub level: String,
    pub mount_point: PathBuf,
    pub percent_used: u8,
    pub detail: String,
}

impl Alert {
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {}% {}",
            self.timestamp.to_rfc3339(),
            self.host,
            self.level,
            self.mount_point.display(),
            self.percent_used,
            self.detail
        )
    }
}

/// Flat alerts file, appended across runs and days, never truncated
#[derive(Debug, Clone)]
pub struct AlertLog {
    path: PathBuf,
}

impl AlertLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, alert: &Alert) -> io::Result<()> {
        let mut file = open_append(&self.path)?;
        writeln!(file, "{}", alert.to_line())?;
        file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> RunContext {
        let mut config = Config::default();
        config.paths.report_root = temp.path().join("reports");
        config.paths.log_root = temp.path().join("logs");
        RunContext::new(Component::Monitor, &config, Local::now(), false)
    }

    #[test]
    fn test_sections_are_written_immediately() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        let mut sink = ReportSink::open(&ctx);

        sink.section("Disk usage");
        sink.kv("Mount point", "/var");

        // Readable before close
        let partial = fs::read_to_string(&ctx.report_path).unwrap();
        assert!(partial.contains("Disk usage"));
        assert!(partial.ends_with('\n'));

        let path = sink.close().unwrap();
        let done = fs::read_to_string(path).unwrap();
        assert!(done.contains("report closed"));
    }

    #[test]
    fn test_run_log_is_jsonl() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        let mut sink = ReportSink::open(&ctx);

        sink.info(Some("PreFlight"), "checking privileges");
        sink.warn(None, "usage still high");
        sink.close();

        let log = fs::read_to_string(&ctx.log_path).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: LogEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.level, LogLevel::Info);
        assert_eq!(first.phase.as_deref(), Some("PreFlight"));
        assert_eq!(first.run_id, ctx.run_id);
        assert!(lines[1].contains("\"level\":\"warn\""));
        assert!(!lines[1].contains("phase"));
    }

    #[test]
    fn test_run_log_appends_across_runs() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);

        for _ in 0..2 {
            let mut sink = ReportSink::open(&ctx);
            sink.info(None, "pass");
            sink.close();
        }

        let log = fs::read_to_string(&ctx.log_path).unwrap();
        assert_eq!(log.lines().count(), 2);
    }

    #[test]
    fn test_unwritable_root_degrades() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        // A regular file where the day directory should go
        let blocked = temp.path().join("blocked");
        fs::write(&blocked, "").unwrap();
        config.paths.report_root = blocked.clone();
        config.paths.log_root = blocked;
        let ctx = RunContext::new(Component::Monitor, &config, Local::now(), false);

        let mut sink = ReportSink::open(&ctx);
        assert_eq!(sink.write_failures(), 2);
        assert!(sink.log_path().is_none());

        sink.section("Disk usage");
        sink.warn(None, "still running");
        assert_eq!(sink.write_failures(), 4);
        assert!(sink.close().is_none());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0B");
        assert_eq!(format_bytes(2048), "2.0KB");
        assert_eq!(format_bytes(5 * 1_048_576), "5.0MB");
        assert_eq!(format_bytes(3 * 1_073_741_824), "3.0GB");
    }

    #[test]
    fn test_alert_log_only_appends() {
        let temp = TempDir::new().unwrap();
        let log = AlertLog::new(&temp.path().join("state/alerts.log"));
        let alert = Alert {
            timestamp: Local::now(),
            host: "web1".to_string(),
            level: "CRITICAL".to_string(),
            mount_point: PathBuf::from("/var"),
            percent_used: 93,
            detail: "critical>=90".to_string(),
        };

        log.append(&alert).unwrap();
        log.append(&alert).unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("web1 CRITICAL /var 93% critical>=90"));
    }
}
