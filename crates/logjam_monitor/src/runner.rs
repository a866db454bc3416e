//! Monitor runner
//!
//! One pass per invocation, scheduled externally:
//! lock -> header -> usage -> top consumers -> log samples -> verdict
//! (and alerts) -> retention cleanup -> unlock.
//!
//! The lock is taken before anything is written. A pass that finds the lock
//! held leaves no report behind.

use chrono::{DateTime, Local};
use logjam_common::retention;
use logjam_common::{
    format_bytes, Alert, AlertLog, Classification, Component, Config, LogLevel, ReportSink,
    Result, RunContext, RunLock, Severity, SystemControl, SystemFacts,
};
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    Completed(Classification),
    /// Another pass holds the lock; nothing was written
    AlreadyRunning,
}

/// What a pass left behind
#[derive(Debug, Clone)]
pub struct PassRecord {
    pub outcome: MonitorOutcome,
    /// `None` when the pass was skipped or the report could not be created
    pub report_path: Option<PathBuf>,
    pub alert_written: bool,
    /// Report and run log writes that did not reach disk
    pub write_failures: usize,
}

pub struct MonitorRunner<'a> {
    config: &'a Config,
    facts: &'a dyn SystemFacts,
    control: &'a dyn SystemControl,
    interactive: bool,
}

impl<'a> MonitorRunner<'a> {
    pub fn new(
        config: &'a Config,
        facts: &'a dyn SystemFacts,
        control: &'a dyn SystemControl,
        interactive: bool,
    ) -> Self {
        Self {
            config,
            facts,
            control,
            interactive,
        }
    }

    pub fn run(&self) -> Result<MonitorOutcome> {
        Ok(self.run_at(Local::now())?.outcome)
    }

    pub fn run_at(&self, started_at: DateTime<Local>) -> Result<PassRecord> {
        let lock_path = &self.config.monitor.lock_path;
        let Some(lock) = RunLock::try_acquire(lock_path)? else {
            warn!(lock = %lock_path.display(), "another monitor pass is running");
            return Ok(PassRecord {
                outcome: MonitorOutcome::AlreadyRunning,
                report_path: None,
                alert_written: false,
                write_failures: 0,
            });
        };
        debug!(lock = %lock.path().display(), "lock acquired");

        let ctx = RunContext::new(Component::Monitor, self.config, started_at, self.interactive);
        let mut sink = ReportSink::open(&ctx);
        sink.info(None, "monitor pass started");

        self.header(&mut sink, &ctx);

        let percent = match self.usage(&mut sink) {
            Ok(percent) => percent,
            Err(e) => {
                sink.error(None, &format!("monitor pass failed: {}", e));
                sink.close();
                return Err(e);
            }
        };

        self.top_consumers(&mut sink);
        self.log_samples(&mut sink);
        let classification = Classification::classify(percent, &self.config.thresholds);
        let alert_written = self.verdict(&mut sink, classification, percent, started_at);
        self.cleanup(&mut sink, &ctx);

        sink.info(
            None,
            &format!("monitor pass completed: {} at {}%", classification, percent),
        );
        let write_failures = sink.write_failures();
        if write_failures > 0 {
            warn!(write_failures, "report or run log incomplete");
        }
        let report_path = sink.close();
        drop(lock);

        Ok(PassRecord {
            outcome: MonitorOutcome::Completed(classification),
            report_path,
            alert_written,
            write_failures,
        })
    }

    fn header(&self, sink: &mut ReportSink, ctx: &RunContext) {
        sink.section("Logjam monitor");
        sink.kv("Host", self.facts.hostname());
        sink.kv("Time", ctx.started_at.format("%Y-%m-%d %H:%M:%S %Z"));
        sink.kv("Run id", &ctx.run_id);
    }

    fn usage(&self, sink: &mut ReportSink) -> Result<u8> {
        let mount = &self.config.target.mount_point;
        sink.section("Disk usage");

        let usage = match self.facts.disk_usage(mount) {
            Ok(usage) => usage,
            Err(e) => {
                sink.line(&format!("unable to read usage of {}: {}", mount.display(), e));
                return Err(e);
            }
        };

        sink.kv("Mount point", mount.display());
        sink.kv("Size", format_bytes(usage.total_bytes));
        sink.kv("Used", format_bytes(usage.used_bytes));
        sink.kv("Available", format_bytes(usage.available_bytes));
        sink.kv("Use%", format!("{}%", usage.percent_used));
        Ok(usage.percent_used)
    }

    fn top_consumers(&self, sink: &mut ReportSink) {
        let monitor = &self.config.monitor;
        sink.section(&format!(
            "Top {} directories under {}",
            monitor.top_consumers,
            monitor.scan_root.display()
        ));

        let scan = self.facts.top_consumers(&monitor.scan_root, monitor.top_consumers);
        if scan.entries.is_empty() {
            sink.line("(no readable directories)");
        }
        for entry in &scan.entries {
            sink.line(&format!("{:>10}  {}", format_bytes(entry.bytes), entry.path.display()));
        }
        if scan.skipped > 0 {
            sink.line(&format!("({} unreadable entries skipped)", scan.skipped));
        }
    }

    /// Missing or unreadable logs are recorded, never fatal
    fn log_samples(&self, sink: &mut ReportSink) {
        let monitor = &self.config.monitor;
        sink.section("Log samples");

        for path in &monitor.sample_logs {
            match self.facts.file_size(path) {
                Ok(Some(size)) => sink.kv(&path.display().to_string(), format_bytes(size)),
                Ok(None) => {
                    sink.kv(&path.display().to_string(), "not found");
                    continue;
                }
                Err(e) => {
                    sink.kv(
                        &path.display().to_string(),
                        format!("unable to read ({})", e),
                    );
                    continue;
                }
            }

            sink.line(&format!(
                "--- last {} lines of {} ---",
                monitor.tail_lines,
                path.display()
            ));
            match self.facts.tail(path, monitor.tail_lines) {
                Ok(lines) => {
                    for line in &lines {
                        sink.line(line);
                    }
                }
                Err(e) => sink.line(&format!("unable to read: {}", e)),
            }
        }
    }

    /// Write the verdict; warning and critical fan out to every alert sink.
    /// Returns whether an alert line was appended.
    fn verdict(
        &self,
        sink: &mut ReportSink,
        classification: Classification,
        percent: u8,
        at: DateTime<Local>,
    ) -> bool {
        let thresholds = &self.config.thresholds;
        let mount = &self.config.target.mount_point;

        sink.section("Threshold");
        sink.kv(
            "Thresholds",
            format!(
                "warning >= {}%, critical >= {}%",
                thresholds.warn_percent, thresholds.critical_percent
            ),
        );
        sink.kv("Classification", classification);

        let (severity, level, detail) = match classification {
            Classification::Ok => {
                sink.line("usage within limits");
                return false;
            }
            Classification::Warning => (
                Severity::Warning,
                LogLevel::Warn,
                format!("warning>={}", thresholds.warn_percent),
            ),
            Classification::Critical => (
                Severity::Critical,
                LogLevel::Error,
                format!("critical>={}", thresholds.critical_percent),
            ),
        };

        let message = format!(
            "{} {} at {}% ({})",
            classification,
            mount.display(),
            percent,
            detail
        );
        sink.line(&format!("ALERT: {}", message));
        sink.event(level, None, &message);

        let sent = self.control.syslog(severity, &message);
        if !sent.success() {
            sink.warn(None, &format!("syslog emission failed: {}", sent.summary()));
        }

        let alerts = AlertLog::new(&self.config.monitor.alerts_file);
        let alert = Alert {
            timestamp: at,
            host: self.facts.hostname(),
            level: classification.as_str().to_string(),
            mount_point: mount.clone(),
            percent_used: percent,
            detail,
        };
        match alerts.append(&alert) {
            Ok(()) => true,
            Err(e) => {
                sink.warn(
                    None,
                    &format!("cannot append to {}: {}", alerts.path().display(), e),
                );
                false
            }
        }
    }

    fn cleanup(&self, sink: &mut ReportSink, ctx: &RunContext) {
        let days = self.config.monitor.retention_days;
        let paths = &self.config.paths;
        sink.section("Cleanup");
        sink.kv("Retention", format!("{} days", days));

        let now = SystemTime::now();
        for root in [&paths.report_root, &paths.log_root] {
            match retention::sweep(root, days, now, &ctx.day) {
                Ok(outcome) => {
                    sink.kv(
                        &root.display().to_string(),
                        format!("{} removed", outcome.removed.len()),
                    );
                    for removed in &outcome.removed {
                        sink.line(&format!("removed {}", removed.display()));
                    }
                    for (path, reason) in &outcome.failed {
                        sink.warn(
                            None,
                            &format!("cannot remove {}: {}", path.display(), reason),
                        );
                    }
                }
                Err(e) => sink.warn(None, &format!("cannot sweep {}: {}", root.display(), e)),
            }
        }
    }
}
