//! Backup&Reclaim: preserve the oversized file, then truncate it in place.
//!
//! The source may still be written to while it is copied, so the backup
//! only has to be at least as large as the size seen before the copy.
//! Truncation has no override: a file that is not empty afterwards is fatal.

use super::{Halt, Recovery};
use crate::backup::{verify_copy, BackupRecord, Verification};
use logjam_common::format_bytes;
use std::path::Path;

pub(super) fn run(rec: &mut Recovery<'_>) -> Result<(), Halt> {
    let config = rec.config;
    let target = &config.target.oversized_file;

    let observed = match rec.facts.file_size(target) {
        Ok(Some(size)) => size,
        Ok(None) => {
            rec.warn(&format!(
                "{} not found, nothing to back up or truncate",
                target.display()
            ));
            rec.push_record(BackupRecord::new(
                target,
                None,
                None,
                None,
                Verification::NotFound,
            ));
            report_usage(rec);
            return Ok(());
        }
        Err(e) => return Err(rec.fatal(&format!("cannot stat {}: {}", target.display(), e))),
    };
    rec.sink.kv(
        "Oversized file",
        format!("{} ({})", target.display(), format_bytes(observed)),
    );

    if rec.skip_backup {
        rec.warn("data backup skipped on request, the file contents will be lost");
        rec.push_record(BackupRecord::new(
            target,
            None,
            Some(observed),
            None,
            Verification::SkippedByOperator,
        ));
    } else {
        back_up(rec, target, observed)?;
    }

    truncate(rec, target)?;
    report_usage(rec);
    Ok(())
}

fn back_up(rec: &mut Recovery<'_>, target: &Path, observed: u64) -> Result<(), Halt> {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "oversized".to_string());
    let dest = rec.backup_dir.join(name);
    rec.step(&format!(
        "copying {} ({}) to {}",
        target.display(),
        format_bytes(observed),
        dest.display()
    ));

    if let Err(e) = rec.control.copy_file(target, &dest) {
        let reason = format!("copy of {} failed: {}", target.display(), e);
        rec.warn(&reason);
        let prompt = format!(
            "{}. Continue WITHOUT a backup and truncate {}?",
            reason,
            target.display()
        );
        if !rec.ask(&prompt) {
            return Err(rec.abort(&format!("{}, operator declined to continue", reason)));
        }
        rec.push_record(BackupRecord::new(
            target,
            None,
            Some(observed),
            None,
            Verification::CopyFailedOverridden,
        ));
        rec.warn("continuing without a backup at operator request");
        return Ok(());
    }

    let copied = rec.facts.file_size(&dest).ok().flatten().unwrap_or(0);
    let verification = verify_copy(observed, copied);
    rec.push_record(BackupRecord::new(
        target,
        Some(&dest),
        Some(observed),
        Some(copied),
        verification,
    ));

    if verification == Verification::Verified {
        rec.step(&format!(
            "backup verified: {} bytes copied, {} observed before the copy",
            copied, observed
        ));
        return Ok(());
    }

    let reason = format!(
        "backup is {} bytes, smaller than the {} bytes observed before the copy",
        copied, observed
    );
    rec.warn(&reason);
    let prompt = format!(
        "{}. Continue and truncate {} without a verified backup?",
        reason,
        target.display()
    );
    if !rec.ask(&prompt) {
        return Err(rec.abort(&format!("{}, operator declined to continue", reason)));
    }
    rec.warn("continuing with an unverified backup at operator request");
    Ok(())
}

fn truncate(rec: &mut Recovery<'_>, target: &Path) -> Result<(), Halt> {
    if let Err(e) = rec.control.truncate(target) {
        return Err(rec.fatal(&format!("truncate of {} failed: {}", target.display(), e)));
    }

    match rec.facts.file_size(target) {
        Ok(Some(0)) => {
            rec.step(&format!("{} truncated to 0 bytes", target.display()));
            Ok(())
        }
        Ok(Some(size)) => Err(rec.fatal(&format!(
            "{} is still {} bytes after truncation",
            target.display(),
            size
        ))),
        Ok(None) => Err(rec.fatal(&format!(
            "{} disappeared during truncation",
            target.display()
        ))),
        Err(e) => Err(rec.fatal(&format!(
            "cannot verify truncation of {}: {}",
            target.display(),
            e
        ))),
    }
}

/// Remaining high usage is a warning; other large files may exist
fn report_usage(rec: &mut Recovery<'_>) {
    let config = rec.config;
    let mount = &config.target.mount_point;
    let warn = config.thresholds.warn_percent;

    rec.pause(config.restart.settle_secs);
    match rec.facts.disk_usage(mount) {
        Ok(usage) => {
            rec.sink.kv("Usage after reclaim", format!("{}%", usage.percent_used));
            if usage.percent_used >= warn {
                rec.warn(&format!(
                    "{} is still {}% full (warning threshold {}%), other large files remain",
                    mount.display(),
                    usage.percent_used,
                    warn
                ));
            } else {
                rec.step(&format!(
                    "{} now {}% full, below the warning threshold",
                    mount.display(),
                    usage.percent_used
                ));
            }
        }
        Err(e) => rec.warn(&format!("cannot re-read usage of {}: {}", mount.display(), e)),
    }
}
