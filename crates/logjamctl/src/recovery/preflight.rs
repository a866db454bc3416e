//! PreFlight: read-only checks before anything on the host changes.
//!
//! The only side effect is the run's backup directory, created last. It is
//! created even with `--skip-backup` because config backups still land there.

use super::{Halt, Recovery};
use logjam_common::format_bytes;
use std::path::{Path, PathBuf};

pub(super) fn run(rec: &mut Recovery<'_>) -> Result<(), Halt> {
    check_privileges(rec)?;
    check_commands(rec)?;
    check_usage(rec)?;
    record_services(rec);
    if rec.skip_backup {
        rec.step("backup space check skipped, data backup disabled");
    } else {
        check_backup_space(rec)?;
    }
    create_backup_dir(rec)
}

fn check_privileges(rec: &mut Recovery<'_>) -> Result<(), Halt> {
    if !rec.facts.is_privileged() {
        return Err(rec.fatal("root privileges are required"));
    }
    rec.step("running with root privileges");
    Ok(())
}

fn check_commands(rec: &mut Recovery<'_>) -> Result<(), Halt> {
    let config = rec.config;
    let facts = rec.facts;
    let required = &config.recovery.required_commands;

    let missing: Vec<&str> = required
        .iter()
        .filter(|name| !facts.command_available(name))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(rec.fatal(&format!(
            "required commands not found: {}",
            missing.join(", ")
        )));
    }

    rec.step(&format!("required commands present: {}", required.join(", ")));
    Ok(())
}

fn check_usage(rec: &mut Recovery<'_>) -> Result<(), Halt> {
    let config = rec.config;
    let mount = &config.target.mount_point;
    let warn = config.thresholds.warn_percent;

    let usage = match rec.facts.disk_usage(mount) {
        Ok(usage) => usage,
        Err(e) => {
            return Err(rec.fatal(&format!(
                "cannot read usage of {}: {}",
                mount.display(),
                e
            )))
        }
    };
    rec.sink.kv(
        "Usage",
        format!(
            "{}% of {} ({} available)",
            usage.percent_used,
            mount.display(),
            format_bytes(usage.available_bytes)
        ),
    );

    if usage.percent_used < warn {
        rec.warn(&format!(
            "{} is {}% full, below the {}% warning threshold",
            mount.display(),
            usage.percent_used,
            warn
        ));
        let prompt = format!(
            "{} is only {}% full. Continue with recovery anyway?",
            mount.display(),
            usage.percent_used
        );
        if !rec.ask(&prompt) {
            return Err(rec.abort("usage below warning threshold, operator declined to continue"));
        }
    }
    Ok(())
}

/// Informative only: a missing or failed unit is recorded, never fatal
fn record_services(rec: &mut Recovery<'_>) {
    let config = rec.config;
    let services = &config.services;
    for service in [
        &services.logger,
        &services.control_daemon,
        &services.mail_transport,
    ] {
        let state = rec.facts.service_state(service);
        rec.sink.kv(service, &state);
        if !state.is_active() {
            rec.step(&format!("{} is {} before recovery", service, state));
        }
        rec.services_before.push((service.clone(), state));
    }
}

fn check_backup_space(rec: &mut Recovery<'_>) -> Result<(), Halt> {
    let config = rec.config;
    let probe = existing_ancestor(&config.backup.root);
    let required = config.backup.min_free_bytes;

    let usage = match rec.facts.disk_usage(&probe) {
        Ok(usage) => usage,
        Err(e) => {
            return Err(rec.fatal(&format!(
                "cannot read free space for {}: {}",
                probe.display(),
                e
            )))
        }
    };
    rec.sink.kv("Backup free space", format_bytes(usage.available_bytes));

    if usage.available_bytes < required {
        return Err(rec.fatal(&format!(
            "only {} free for backups at {}, {} required",
            format_bytes(usage.available_bytes),
            probe.display(),
            format_bytes(required)
        )));
    }

    if let Ok(Some(size)) = rec.facts.file_size(&config.target.oversized_file) {
        if size > usage.available_bytes {
            rec.warn(&format!(
                "{} is {}, more than the {} free for backups; the copy will likely fail",
                config.target.oversized_file.display(),
                format_bytes(size),
                format_bytes(usage.available_bytes)
            ));
        }
    }
    Ok(())
}

fn create_backup_dir(rec: &mut Recovery<'_>) -> Result<(), Halt> {
    let dir = rec.backup_dir.clone();
    if let Err(e) = rec.control.create_dir_all(&dir) {
        return Err(rec.fatal(&format!(
            "cannot create backup directory {}: {}",
            dir.display(),
            e
        )));
    }
    rec.backup_dir_ready = true;
    rec.sink.kv("Backup directory", dir.display());
    Ok(())
}

/// Nearest existing ancestor; df needs a path that exists
fn existing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|p| p.exists())
        .unwrap_or_else(|| Path::new("/"))
        .to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_existing_ancestor() {
        let temp = TempDir::new().unwrap();
        let deep = temp.path().join("a/b/c");
        assert_eq!(existing_ancestor(&deep), temp.path());
        assert_eq!(existing_ancestor(temp.path()), temp.path());
    }
}
