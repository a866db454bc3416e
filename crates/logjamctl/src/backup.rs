//! Backup records and the per-run manifest
//!
//! Every preserved copy made during recovery gets one `BackupRecord`.
//! Records are never edited after they are pushed; the manifest written at
//! the end of the run is the audit trail an operator reads before deciding
//! to delete a backup directory. Nothing here ever deletes a backup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

pub const MANIFEST_NAME: &str = "manifest.json";

/// Suffix for pristine copies of config files
pub const PRISTINE_SUFFIX: &str = "pre-recovery";

/// How a backup was (or was not) verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    /// Destination at least as large as the source before the copy
    Verified,
    /// Destination smaller than the source before the copy
    SizeMismatch,
    /// Source did not exist
    NotFound,
    /// Backup skipped on request
    SkippedByOperator,
    /// Copy failed and the operator chose to continue without it
    CopyFailedOverridden,
}

impl Verification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verification::Verified => "verified",
            Verification::SizeMismatch => "size_mismatch",
            Verification::NotFound => "not_found",
            Verification::SkippedByOperator => "skipped_by_operator",
            Verification::CopyFailedOverridden => "copy_failed_overridden",
        }
    }
}

impl std::fmt::Display for Verification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub source: PathBuf,
    /// `None` when no copy was attempted
    pub destination: Option<PathBuf>,
    /// Source size observed right before the copy
    pub observed_size: Option<u64>,
    /// Destination size observed right after the copy
    pub copied_size: Option<u64>,
    pub verification: Verification,
    pub recorded_at: DateTime<Utc>,
}

impl BackupRecord {
    pub fn new(
        source: &Path,
        destination: Option<&Path>,
        observed_size: Option<u64>,
        copied_size: Option<u64>,
        verification: Verification,
    ) -> Self {
        Self {
            source: source.to_path_buf(),
            destination: destination.map(Path::to_path_buf),
            observed_size,
            copied_size,
            verification,
            recorded_at: Utc::now(),
        }
    }

    /// One line for the report
    pub fn describe(&self) -> String {
        let dest = self
            .destination
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        let sizes = match (self.observed_size, self.copied_size) {
            (Some(before), Some(after)) => format!("{} -> {} bytes", before, after),
            (Some(before), None) => format!("{} bytes, not copied", before),
            _ => "no size".to_string(),
        };
        format!(
            "{} => {} [{}] ({})",
            self.source.display(),
            dest,
            self.verification,
            sizes
        )
    }
}

/// Compare sizes for a copy of a file that may still be growing.
/// Smaller than the pre-copy size is the only failure.
pub fn verify_copy(observed: u64, copied: u64) -> Verification {
    if copied >= observed {
        Verification::Verified
    } else {
        Verification::SizeMismatch
    }
}

/// Destination for the pristine copy of a config file.
///
/// The whole source path is folded into the name, so two configs sharing a
/// basename never overwrite each other's copy.
pub fn pristine_path(backup_dir: &Path, source: &Path) -> PathBuf {
    let name = source
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("_");
    let name = if name.is_empty() { "config".to_string() } else { name };
    backup_dir.join(format!("{}.{}", name, PRISTINE_SUFFIX))
}

/// Write the records as pretty JSON into the backup directory
pub fn write_manifest(backup_dir: &Path, records: &[BackupRecord]) -> io::Result<PathBuf> {
    let path = backup_dir.join(MANIFEST_NAME);
    let json = serde_json::to_string_pretty(records)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(&path, json + "\n")?;
    Ok(path)
}
