//! Monitor passes against the scriptable host

use chrono::Local;
use logjam_common::host::fake::{usage_at, FakeHost};
use logjam_common::{Classification, Config, RunLock, Severity};
use logjam_monitor::{MonitorOutcome, MonitorRunner, PassRecord};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

struct Fixture {
    temp: TempDir,
    config: Config,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let mut config = Config::default();
        config.target.mount_point = root.join("var");
        config.monitor.scan_root = root.join("var");
        config.monitor.sample_logs = vec![
            root.join("var/log/syslog"),
            root.join("var/log/missing.log"),
        ];
        config.monitor.lock_path = root.join("run/monitor.lock");
        config.monitor.alerts_file = root.join("state/alerts.log");
        config.paths.report_root = root.join("reports");
        config.paths.log_root = root.join("logs");

        fs::create_dir_all(root.join("var/log")).unwrap();
        fs::create_dir_all(root.join("var/lib")).unwrap();
        fs::create_dir_all(root.join("var/cache")).unwrap();
        let syslog: String = (1..=30).map(|i| format!("line {}\n", i)).collect();
        fs::write(root.join("var/log/syslog"), syslog).unwrap();
        fs::write(root.join("var/lib/big.db"), vec![0u8; 5000]).unwrap();
        fs::write(root.join("var/cache/small"), vec![0u8; 1000]).unwrap();

        Self {
            temp,
            config,
        }
    }

    fn pass(&self, host: &FakeHost) -> PassRecord {
        MonitorRunner::new(&self.config, host, host, false)
            .run_at(Local::now())
            .unwrap()
    }

    fn alerts(&self) -> Vec<String> {
        match fs::read_to_string(&self.config.monitor.alerts_file) {
            Ok(content) => content.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }
}

fn at(percent: u8) -> FakeHost {
    FakeHost::new().with_default_usage(usage_at(percent))
}

fn report(pass: &PassRecord) -> String {
    fs::read_to_string(pass.report_path.as_ref().unwrap()).unwrap()
}

fn aged_dir(root: &Path, name: &str, age_days: u64) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    let mtime = SystemTime::now() - Duration::from_secs(age_days * 24 * 60 * 60);
    File::open(&dir).unwrap().set_modified(mtime).unwrap();
    dir
}

#[test]
fn test_low_usage_writes_no_alert() {
    let fx = Fixture::new();
    let host = at(10);

    let pass = fx.pass(&host);

    assert_eq!(pass.outcome, MonitorOutcome::Completed(Classification::Ok));
    assert!(!pass.alert_written);
    assert_eq!(pass.write_failures, 0);
    assert!(fx.alerts().is_empty());
    assert!(!fx.config.monitor.alerts_file.exists());
    assert!(host.syslog_messages().is_empty());
    assert!(report(&pass).contains("usage within limits"));
}

#[test]
fn test_alerts_survive_unwritable_report_tree() {
    let mut fx = Fixture::new();
    let blocked = fx.temp.path().join("blocked");
    fs::write(&blocked, "").unwrap();
    fx.config.paths.report_root = blocked.clone();
    fx.config.paths.log_root = blocked;
    let host = at(97);

    let pass = fx.pass(&host);

    assert_eq!(
        pass.outcome,
        MonitorOutcome::Completed(Classification::Critical)
    );
    assert!(pass.report_path.is_none());
    assert!(pass.write_failures > 0);
    assert!(pass.alert_written);
    assert_eq!(fx.alerts().len(), 1);
    assert!(fx.alerts()[0].ends_with("97% critical>=90"));
    assert_eq!(host.syslog_messages().len(), 1);
    assert_eq!(host.syslog_messages()[0].0, Severity::Critical);
}

#[test]
fn test_report_sections() {
    let fx = Fixture::new();
    let pass = fx.pass(&at(42));
    let text = report(&pass);

    assert!(text.contains("Host:"));
    assert!(text.contains("testhost"));
    assert!(text.contains("Use%:"));
    assert!(text.contains("42%"));

    // Largest first
    let lib = text.find("/var/lib").unwrap();
    let cache = text.find("/var/cache").unwrap();
    assert!(lib < cache);

    // Tail of the sampled log, explicit marker for the missing one
    assert!(text.contains("--- last 20 lines of"));
    assert!(text.contains("line 30\n"));
    assert!(text.contains("line 11\n"));
    assert!(!text.contains("line 10\n"));
    assert!(text.contains("missing.log"));
    assert!(text.contains("not found"));
    assert!(text.contains("Cleanup"));
}

#[test]
fn test_warning_fans_out_to_every_sink() {
    let fx = Fixture::new();
    let host = at(85);

    let pass = fx.pass(&host);

    assert_eq!(
        pass.outcome,
        MonitorOutcome::Completed(Classification::Warning)
    );
    assert!(pass.alert_written);

    let alerts = fx.alerts();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].contains(" testhost WARNING "));
    assert!(alerts[0].ends_with("85% warning>=80"));

    let syslog = host.syslog_messages();
    assert_eq!(syslog.len(), 1);
    assert_eq!(syslog[0].0, Severity::Warning);

    assert!(report(&pass).contains("ALERT: WARNING"));

    let day = Local::now().format("%Y-%m-%d").to_string();
    let log = fs::read_to_string(fx.config.paths.log_root.join(day).join("monitor.log")).unwrap();
    assert!(log
        .lines()
        .any(|l| l.contains("\"level\":\"warn\"") && l.contains("WARNING")));
}

#[test]
fn test_critical_alert() {
    let fx = Fixture::new();
    let host = at(95);

    let pass = fx.pass(&host);

    assert_eq!(
        pass.outcome,
        MonitorOutcome::Completed(Classification::Critical)
    );
    assert_eq!(host.syslog_messages()[0].0, Severity::Critical);
    assert!(fx.alerts()[0].contains(" CRITICAL "));
    assert!(fx.alerts()[0].ends_with("95% critical>=90"));
}

#[test]
fn test_threshold_boundaries() {
    let fx = Fixture::new();
    let cases = [
        (79, Classification::Ok),
        (80, Classification::Warning),
        (89, Classification::Warning),
        (90, Classification::Critical),
    ];
    for (percent, expected) in cases {
        let pass = fx.pass(&at(percent));
        assert_eq!(pass.outcome, MonitorOutcome::Completed(expected), "{}%", percent);
    }
    // One alert line per alerting pass, none for OK
    assert_eq!(fx.alerts().len(), 3);
}

#[test]
fn test_alerts_file_only_grows() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.config.monitor.alerts_file.parent().unwrap()).unwrap();
    fs::write(&fx.config.monitor.alerts_file, "earlier line\n").unwrap();

    fx.pass(&at(95));
    fx.pass(&at(10));
    fx.pass(&at(95));

    let alerts = fx.alerts();
    assert_eq!(alerts.len(), 3);
    assert_eq!(alerts[0], "earlier line");
}

#[test]
fn test_held_lock_returns_already_running_without_report() {
    let fx = Fixture::new();
    let held = RunLock::try_acquire(&fx.config.monitor.lock_path)
        .unwrap()
        .unwrap();

    let pass = fx.pass(&at(95));

    assert_eq!(pass.outcome, MonitorOutcome::AlreadyRunning);
    assert!(pass.report_path.is_none());
    assert!(!fx.config.paths.report_root.exists());
    assert!(fx.alerts().is_empty());

    drop(held);
    let pass = fx.pass(&at(10));
    assert_eq!(pass.outcome, MonitorOutcome::Completed(Classification::Ok));
}

#[test]
fn test_run_reports_outcome_only() {
    let fx = Fixture::new();
    let host = at(10);
    let outcome = MonitorRunner::new(&fx.config, &host, &host, false)
        .run()
        .unwrap();
    assert_eq!(outcome, MonitorOutcome::Completed(Classification::Ok));
}

#[test]
fn test_retention_removes_only_expired_partitions() {
    let fx = Fixture::new();
    let reports = &fx.config.paths.report_root;
    let logs = &fx.config.paths.log_root;
    let old_report = aged_dir(reports, "2020-01-01", 31);
    let young_report = aged_dir(reports, "2020-01-02", 5);
    let old_log = aged_dir(logs, "2020-01-01", 45);
    let unrelated = aged_dir(reports, "keep-me", 400);

    let pass = fx.pass(&at(10));

    assert!(!old_report.exists());
    assert!(!old_log.exists());
    assert!(young_report.exists());
    assert!(unrelated.exists());
    // Today's report survives its own cleanup
    assert!(pass.report_path.unwrap().exists());
}
