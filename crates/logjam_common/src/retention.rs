//! Retention sweep for day-partitioned trees
//!
//! Deletes whole `YYYY-MM-DD` directories whose modification time is older
//! than the policy. Anything not named like a day partition is left alone,
//! and the current day's directory is never removed.

use chrono::NaiveDate;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

pub fn is_day_partition(name: &str) -> bool {
    name.len() == 10 && NaiveDate::parse_from_str(name, "%Y-%m-%d").is_ok()
}

/// Remove day partitions under `root` older than `retention_days`.
///
/// A missing root is an empty sweep. `today` names the active partition.
pub fn sweep(
    root: &Path,
    retention_days: u64,
    now: SystemTime,
    today: &str,
) -> io::Result<SweepOutcome> {
    let mut outcome = SweepOutcome::default();
    let max_age = Duration::from_secs(retention_days * SECS_PER_DAY);

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(outcome),
        Err(e) => return Err(e),
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name == today || !is_day_partition(&name) {
            continue;
        }
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }

        let path = entry.path();
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                outcome.failed.push((path, e.to_string()));
                continue;
            }
        };

        // A future mtime reads as age zero
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= max_age {
            continue;
        }

        debug!(path = %path.display(), age_days = age.as_secs() / SECS_PER_DAY, "removing expired partition");
        match fs::remove_dir_all(&path) {
            Ok(()) => outcome.removed.push(path),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove expired partition");
                outcome.failed.push((path, e.to_string()));
            }
        }
    }

    outcome.removed.sort();
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn day_dir(root: &Path, name: &str, age_days: u64, now: SystemTime) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("monitor-120000.txt"), "report").unwrap();
        let mtime = now - Duration::from_secs(age_days * SECS_PER_DAY);
        File::open(&dir).unwrap().set_modified(mtime).unwrap();
        dir
    }

    #[test]
    fn test_only_expired_partition_removed() {
        let temp = TempDir::new().unwrap();
        let now = SystemTime::now();
        let today = day_dir(temp.path(), "2026-10-16", 0, now);
        let five = day_dir(temp.path(), "2026-10-11", 5, now);
        let ten = day_dir(temp.path(), "2026-10-06", 10, now);
        let old = day_dir(temp.path(), "2026-09-15", 31, now);

        let outcome = sweep(temp.path(), 30, now, "2026-10-16").unwrap();

        assert_eq!(outcome.removed, vec![old.clone()]);
        assert!(outcome.failed.is_empty());
        assert!(today.exists() && five.exists() && ten.exists());
        assert!(!old.exists());
    }

    #[test]
    fn test_today_survives_even_with_old_mtime() {
        let temp = TempDir::new().unwrap();
        let now = SystemTime::now();
        let today = day_dir(temp.path(), "2026-10-16", 90, now);

        let outcome = sweep(temp.path(), 30, now, "2026-10-16").unwrap();
        assert!(outcome.removed.is_empty());
        assert!(today.exists());
    }

    #[test]
    fn test_non_partition_entries_untouched() {
        let temp = TempDir::new().unwrap();
        let now = SystemTime::now();
        let other = day_dir(temp.path(), "archive", 400, now);
        fs::write(temp.path().join("2020-01-01"), "a file, not a dir").unwrap();

        let outcome = sweep(temp.path(), 30, now, "2026-10-16").unwrap();
        assert!(outcome.removed.is_empty());
        assert!(other.exists());
        assert!(temp.path().join("2020-01-01").exists());
    }

    #[test]
    fn test_missing_root_is_empty_sweep() {
        let temp = TempDir::new().unwrap();
        let outcome = sweep(&temp.path().join("none"), 30, SystemTime::now(), "x").unwrap();
        assert!(outcome.removed.is_empty());
    }

    #[test]
    fn test_is_day_partition() {
        assert!(is_day_partition("2026-10-16"));
        assert!(!is_day_partition("2026-13-01"));
        assert!(!is_day_partition("20261016"));
        assert!(!is_day_partition("2026-1-6"));
    }
}
