//! Logjam Configuration
//!
//! Read once at process entry and passed by reference into every component.
//! Configuration lives in /etc/logjam/config.toml unless `LOGJAM_CONFIG` or
//! an explicit `--config` path says otherwise.
//!
//! Every field has a default, so a partial file yields a complete value.
//! The shipped defaults target a Debian-family host running rsyslog,
//! postfix and a Proxmox-style control daemon; all of it is configurable.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// System configuration directory
pub const SYSTEM_CONFIG_DIR: &str = "/etc/logjam";
const CONFIG_FILE: &str = "config.toml";

/// Environment override for the config location
pub const CONFIG_ENV: &str = "LOGJAM_CONFIG";

/// The partition and the file that filled it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_mount_point")]
    pub mount_point: PathBuf,

    #[serde(default = "default_oversized_file")]
    pub oversized_file: PathBuf,
}

fn default_mount_point() -> PathBuf {
    PathBuf::from("/var")
}

fn default_oversized_file() -> PathBuf {
    PathBuf::from("/var/log/syslog")
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            mount_point: default_mount_point(),
            oversized_file: default_oversized_file(),
        }
    }
}

/// Where the reclaimed file and pristine config copies are preserved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_root")]
    pub root: PathBuf,

    /// Minimum free bytes on the backup filesystem (default 5 GiB)
    #[serde(default = "default_min_free_bytes")]
    pub min_free_bytes: u64,
}

fn default_backup_root() -> PathBuf {
    PathBuf::from("/root/logjam-backups")
}

fn default_min_free_bytes() -> u64 {
    5 * 1024 * 1024 * 1024
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            root: default_backup_root(),
            min_free_bytes: default_min_free_bytes(),
        }
    }
}

/// Usage boundaries in percent, warn < critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_warn_percent")]
    pub warn_percent: u8,

    #[serde(default = "default_critical_percent")]
    pub critical_percent: u8,
}

fn default_warn_percent() -> u8 {
    80
}

fn default_critical_percent() -> u8 {
    90
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warn_percent: default_warn_percent(),
            critical_percent: default_critical_percent(),
        }
    }
}

/// Dependent services and the commands that talk to them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_logger")]
    pub logger: String,

    #[serde(default = "default_control_daemon")]
    pub control_daemon: String,

    #[serde(default = "default_mail_transport")]
    pub mail_transport: String,

    #[serde(default = "default_mail_flush_command")]
    pub mail_flush_command: Vec<String>,

    /// Lightweight query proving the control plane answers
    #[serde(default = "default_control_status_command")]
    pub control_status_command: Vec<String>,

    #[serde(default = "default_control_spool_dir")]
    pub control_spool_dir: PathBuf,

    /// Glob matched against file names inside `control_spool_dir`
    #[serde(default = "default_control_spool_pattern")]
    pub control_spool_pattern: String,
}

fn default_logger() -> String {
    "rsyslog".to_string()
}

fn default_control_daemon() -> String {
    "pvedaemon".to_string()
}

fn default_mail_transport() -> String {
    "postfix".to_string()
}

fn default_mail_flush_command() -> Vec<String> {
    vec!["postqueue".to_string(), "-f".to_string()]
}

fn default_control_status_command() -> Vec<String> {
    vec!["pvesh".to_string(), "get".to_string(), "/version".to_string()]
}

fn default_control_spool_dir() -> PathBuf {
    PathBuf::from("/var/run/pvedaemon")
}

fn default_control_spool_pattern() -> String {
    "*.lock".to_string()
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            logger: default_logger(),
            control_daemon: default_control_daemon(),
            mail_transport: default_mail_transport(),
            mail_flush_command: default_mail_flush_command(),
            control_status_command: default_control_status_command(),
            control_spool_dir: default_control_spool_dir(),
            control_spool_pattern: default_control_spool_pattern(),
        }
    }
}

/// Bounds for the control daemon restart loop and related waits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_status_timeout_secs")]
    pub status_timeout_secs: u64,

    /// Pause between truncation and re-reading usage
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
}

fn default_attempts() -> u32 {
    3
}

fn default_attempt_timeout_secs() -> u64 {
    90
}

fn default_retry_delay_secs() -> u64 {
    10
}

fn default_status_timeout_secs() -> u64 {
    30
}

fn default_settle_secs() -> u64 {
    5
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            retry_delay_secs: default_retry_delay_secs(),
            status_timeout_secs: default_status_timeout_secs(),
            settle_secs: default_settle_secs(),
        }
    }
}

/// Replacement log-rotation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    #[serde(default = "default_rotation_config_path")]
    pub config_path: PathBuf,

    /// Log files the rewritten stanza covers
    #[serde(default = "default_rotated_logs")]
    pub rotated_logs: Vec<PathBuf>,

    #[serde(default = "default_max_size")]
    pub max_size: String,

    #[serde(default = "default_rotate_count")]
    pub rotate_count: u32,

    /// Dry-run validator; the config path is appended as the last argument
    #[serde(default = "default_rotation_validate_command")]
    pub validate_command: Vec<String>,
}

fn default_rotation_config_path() -> PathBuf {
    PathBuf::from("/etc/logrotate.d/rsyslog")
}

fn default_rotated_logs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/var/log/syslog"),
        PathBuf::from("/var/log/mail.log"),
        PathBuf::from("/var/log/daemon.log"),
    ]
}

fn default_max_size() -> String {
    "100M".to_string()
}

fn default_rotate_count() -> u32 {
    7
}

fn default_rotation_validate_command() -> Vec<String> {
    vec!["logrotate".to_string(), "-d".to_string()]
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            config_path: default_rotation_config_path(),
            rotated_logs: default_rotated_logs(),
            max_size: default_max_size(),
            rotate_count: default_rotate_count(),
            validate_command: default_rotation_validate_command(),
        }
    }
}

/// Logger rate limiting directives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_logger_config_path")]
    pub logger_config_path: PathBuf,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u32,

    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Logger syntax check; the config path is appended as the last argument.
    /// Empty disables the check.
    #[serde(default = "default_logger_validate_command")]
    pub validate_command: Vec<String>,
}

fn default_logger_config_path() -> PathBuf {
    PathBuf::from("/etc/rsyslog.conf")
}

fn default_interval_secs() -> u32 {
    5
}

fn default_burst() -> u32 {
    500
}

fn default_logger_validate_command() -> Vec<String> {
    vec!["rsyslogd".to_string(), "-N1".to_string(), "-f".to_string()]
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            logger_config_path: default_logger_config_path(),
            interval_secs: default_interval_secs(),
            burst: default_burst(),
            validate_command: default_logger_validate_command(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Commands that must resolve on PATH before anything is touched
    #[serde(default = "default_required_commands")]
    pub required_commands: Vec<String>,
}

fn default_required_commands() -> Vec<String> {
    ["systemctl", "df", "logrotate", "logger"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            required_commands: default_required_commands(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Directory whose children are ranked by size
    #[serde(default = "default_scan_root")]
    pub scan_root: PathBuf,

    #[serde(default = "default_top_consumers")]
    pub top_consumers: usize,

    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,

    #[serde(default = "default_sample_logs")]
    pub sample_logs: Vec<PathBuf>,

    #[serde(default = "default_retention_days")]
    pub retention_days: u64,

    #[serde(default = "default_lock_path")]
    pub lock_path: PathBuf,

    /// Never rotated, never truncated
    #[serde(default = "default_alerts_file")]
    pub alerts_file: PathBuf,
}

fn default_scan_root() -> PathBuf {
    PathBuf::from("/var")
}

fn default_top_consumers() -> usize {
    10
}

fn default_tail_lines() -> usize {
    20
}

fn default_sample_logs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/var/log/syslog"),
        PathBuf::from("/var/log/mail.log"),
        PathBuf::from("/var/log/daemon.log"),
    ]
}

fn default_retention_days() -> u64 {
    30
}

fn default_lock_path() -> PathBuf {
    PathBuf::from("/run/logjam/monitor.lock")
}

fn default_alerts_file() -> PathBuf {
    PathBuf::from("/var/lib/logjam/alerts.log")
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            scan_root: default_scan_root(),
            top_consumers: default_top_consumers(),
            tail_lines: default_tail_lines(),
            sample_logs: default_sample_logs(),
            retention_days: default_retention_days(),
            lock_path: default_lock_path(),
            alerts_file: default_alerts_file(),
        }
    }
}

/// Day-partitioned output areas
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_report_root")]
    pub report_root: PathBuf,

    #[serde(default = "default_log_root")]
    pub log_root: PathBuf,
}

fn default_report_root() -> PathBuf {
    PathBuf::from("/var/lib/logjam/reports")
}

fn default_log_root() -> PathBuf {
    PathBuf::from("/var/lib/logjam/logs")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            report_root: default_report_root(),
            log_root: default_log_root(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Console level (trace, debug, info, warn, error); RUST_LOG wins
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Complete Logjam configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub restart: RestartConfig,

    #[serde(default)]
    pub rotation: RotationConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub logging: LogConfig,
}

impl Config {
    /// Default config path, honoring `LOGJAM_CONFIG`
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(SYSTEM_CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the default location is
    /// tried and a missing file yields the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                Self::from_file(path)?
            }
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse without validating
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        if t.critical_percent > 100 {
            return Err(ConfigError::Invalid(format!(
                "critical_percent {} exceeds 100",
                t.critical_percent
            )));
        }
        if t.warn_percent >= t.critical_percent {
            return Err(ConfigError::Invalid(format!(
                "warn_percent ({}) must be below critical_percent ({})",
                t.warn_percent, t.critical_percent
            )));
        }
        if self.restart.attempts == 0 {
            return Err(ConfigError::Invalid(
                "restart.attempts must be at least 1".to_string(),
            ));
        }
        if self.monitor.retention_days == 0 {
            return Err(ConfigError::Invalid(
                "monitor.retention_days must be at least 1".to_string(),
            ));
        }

        let commands = [
            ("services.mail_flush_command", &self.services.mail_flush_command),
            (
                "services.control_status_command",
                &self.services.control_status_command,
            ),
            ("rotation.validate_command", &self.rotation.validate_command),
        ];
        for (name, argv) in commands {
            if argv.is_empty() {
                return Err(ConfigError::Invalid(format!("{} is empty", name)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds.warn_percent, 80);
        assert_eq!(config.thresholds.critical_percent, 90);
        assert_eq!(config.monitor.retention_days, 30);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = Config::from_toml(
            r#"
            [thresholds]
            warn_percent = 70

            [services]
            control_daemon = "webmin"
            "#,
        )
        .unwrap();

        assert_eq!(config.thresholds.warn_percent, 70);
        assert_eq!(config.thresholds.critical_percent, 90);
        assert_eq!(config.services.control_daemon, "webmin");
        assert_eq!(config.services.logger, "rsyslog");
        assert_eq!(config.restart.attempts, 3);
    }

    #[test]
    fn test_warn_must_be_below_critical() {
        let mut config = Config::default();
        config.thresholds.warn_percent = 90;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.thresholds.warn_percent = 95;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_critical_over_100_rejected() {
        let mut config = Config::default();
        config.thresholds.critical_percent = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = Config::default();
        config.restart.attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[monitor]\nretention_days = 7\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.monitor.retention_days, 7);
    }

    #[test]
    fn test_toml_roundtrip_keeps_values() {
        let mut config = Config::default();
        config.backup.min_free_bytes = 1234;
        let text = config.to_toml().unwrap();
        let parsed = Config::from_toml(&text).unwrap();
        assert_eq!(parsed.backup.min_free_bytes, 1234);
    }
}
