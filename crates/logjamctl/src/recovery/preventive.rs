//! PreventiveConfig: bound future log growth.
//!
//! Every config file is copied to `<path>.pre-recovery` in the backup
//! directory before it is touched. If a rewritten file fails validation the
//! pristine copy goes back over it and the run halts; the run never exits
//! with an unvalidated config in place.

use super::{Halt, Recovery};
use crate::backup::{pristine_path, BackupRecord, Verification};
use logjam_common::config::{RateLimitConfig, RotationConfig};
use std::path::{Path, PathBuf};

/// Marker line written above the appended directives
pub const RATE_LIMIT_MARKER: &str = "# logjam: rate limit local log ingestion";

pub(super) fn run(rec: &mut Recovery<'_>) -> Result<(), Halt> {
    let config = rec.config;

    // Log rotation
    let rotation_path = &config.rotation.config_path;
    let pristine = preserve(rec, rotation_path)?;
    let stanza = render_rotation(&config.rotation, &config.services.logger);
    if let Err(e) = rec.control.write_file(rotation_path, &stanza) {
        restore(rec, &pristine, rotation_path);
        return Err(rec.fatal(&format!(
            "cannot write {}: {}",
            rotation_path.display(),
            e
        )));
    }
    rec.step(&format!(
        "{} rewritten: maxsize {}, rotate {}",
        rotation_path.display(),
        config.rotation.max_size,
        config.rotation.rotate_count
    ));
    validate_or_restore(
        rec,
        &config.rotation.validate_command,
        &pristine,
        rotation_path,
    )?;

    // Logger rate limiting
    let logger_conf = &config.rate_limit.logger_config_path;
    let pristine = preserve(rec, logger_conf)?;
    let current = match rec.facts.read_to_string(logger_conf) {
        Ok(content) => content,
        Err(e) => {
            return Err(rec.fatal(&format!(
                "cannot read {}: {}",
                logger_conf.display(),
                e
            )))
        }
    };

    if has_rate_limit(&current) {
        rec.warn(&format!(
            "rate limiting already configured in {}, not appending",
            logger_conf.display()
        ));
    } else {
        let block = rate_limit_block(&config.rate_limit, &current);
        if let Err(e) = rec.control.append_file(logger_conf, &block) {
            restore(rec, &pristine, logger_conf);
            return Err(rec.fatal(&format!(
                "cannot append to {}: {}",
                logger_conf.display(),
                e
            )));
        }
        rec.step(&format!(
            "rate limit appended to {}: interval {}s, burst {}",
            logger_conf.display(),
            config.rate_limit.interval_secs,
            config.rate_limit.burst
        ));
        if !config.rate_limit.validate_command.is_empty() {
            validate_or_restore(
                rec,
                &config.rate_limit.validate_command,
                &pristine,
                logger_conf,
            )?;
        }
    }

    let logger = config.services.logger.clone();
    rec.restart_verified(&logger)
}

/// Copy `source` to its pristine path. Missing source or a bad copy is fatal.
fn preserve(rec: &mut Recovery<'_>, source: &Path) -> Result<PathBuf, Halt> {
    let observed = match rec.facts.file_size(source) {
        Ok(Some(size)) => size,
        Ok(None) => {
            return Err(rec.fatal(&format!(
                "{} does not exist, refusing to modify without a backup",
                source.display()
            )))
        }
        Err(e) => return Err(rec.fatal(&format!("cannot stat {}: {}", source.display(), e))),
    };

    let dest = pristine_path(&rec.backup_dir, source);
    if let Err(e) = rec.control.copy_file(source, &dest) {
        return Err(rec.fatal(&format!(
            "backup of {} failed: {}",
            source.display(),
            e
        )));
    }

    // Config files are not appended to concurrently: sizes must match exactly
    let copied = rec.facts.file_size(&dest).ok().flatten();
    if copied != Some(observed) {
        rec.push_record(BackupRecord::new(
            source,
            Some(&dest),
            Some(observed),
            copied,
            Verification::SizeMismatch,
        ));
        return Err(rec.fatal(&format!(
            "backup of {} is incomplete ({} of {} bytes)",
            source.display(),
            copied.unwrap_or(0),
            observed
        )));
    }

    rec.push_record(BackupRecord::new(
        source,
        Some(&dest),
        Some(observed),
        copied,
        Verification::Verified,
    ));
    Ok(dest)
}

/// Run `command <live>`; on failure put the pristine copy back and halt
fn validate_or_restore(
    rec: &mut Recovery<'_>,
    command: &[String],
    pristine: &Path,
    live: &Path,
) -> Result<(), Halt> {
    let mut argv = command.to_vec();
    argv.push(live.display().to_string());

    let outcome = rec.control.run(&argv, None);
    if outcome.success() {
        rec.step(&format!("{} validated", live.display()));
        return Ok(());
    }

    rec.warn(&format!("validation failed: {}", outcome.summary()));
    let reason = if restore(rec, pristine, live) {
        format!(
            "{} failed validation, original restored from {}",
            live.display(),
            pristine.display()
        )
    } else {
        format!(
            "{} failed validation and could not be restored, pristine copy is at {}",
            live.display(),
            pristine.display()
        )
    };
    Err(rec.fatal(&reason))
}

fn restore(rec: &mut Recovery<'_>, pristine: &Path, live: &Path) -> bool {
    match rec.control.copy_file(pristine, live) {
        Ok(_) => {
            rec.step(&format!(
                "restored {} from {}",
                live.display(),
                pristine.display()
            ));
            true
        }
        Err(e) => {
            rec.sink.line(&format!("RESTORE FAILED: {}: {}", live.display(), e));
            rec.sink.error(
                Some(rec.phase.name()),
                &format!("restore of {} failed: {}", live.display(), e),
            );
            false
        }
    }
}

/// logrotate stanza with size-bounded daily rotation
pub fn render_rotation(rotation: &RotationConfig, logger: &str) -> String {
    let mut out = String::new();
    out.push_str("# Managed by logjam recovery; previous version kept as *.pre-recovery\n");
    for log in &rotation.rotated_logs {
        out.push_str(&format!("{}\n", log.display()));
    }
    out.push_str("{\n");
    out.push_str("\tdaily\n");
    out.push_str(&format!("\tmaxsize {}\n", rotation.max_size));
    out.push_str(&format!("\trotate {}\n", rotation.rotate_count));
    out.push_str("\tmissingok\n");
    out.push_str("\tnotifempty\n");
    out.push_str("\tcompress\n");
    out.push_str("\tdelaycompress\n");
    out.push_str("\tsharedscripts\n");
    out.push_str("\tpostrotate\n");
    out.push_str(&format!(
        "\t\tsystemctl kill -s HUP {}.service >/dev/null 2>&1 || true\n",
        logger
    ));
    out.push_str("\tendscript\n");
    out.push_str("}\n");
    out
}

/// An active (uncommented) rate-limit interval directive, in either the
/// legacy `$...RateLimitInterval` or the `RateLimit.Interval` form
pub fn has_rate_limit(content: &str) -> bool {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .any(|line| {
            let lower = line.to_ascii_lowercase();
            lower.contains("ratelimitinterval") || lower.contains("ratelimit.interval")
        })
}

/// Directives to append to `existing`
pub fn rate_limit_block(rate_limit: &RateLimitConfig, existing: &str) -> String {
    let mut block = String::new();
    if !existing.is_empty() && !existing.ends_with('\n') {
        block.push('\n');
    }
    block.push('\n');
    block.push_str(RATE_LIMIT_MARKER);
    block.push('\n');
    block.push_str(&format!(
        "$SystemLogRateLimitInterval {}\n",
        rate_limit.interval_secs
    ));
    block.push_str(&format!("$SystemLogRateLimitBurst {}\n", rate_limit.burst));
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_rotation() {
        let rotation = RotationConfig::default();
        let stanza = render_rotation(&rotation, "rsyslog");

        assert!(stanza.starts_with("# Managed by logjam"));
        assert!(stanza.contains("/var/log/syslog\n"));
        assert!(stanza.contains("\tmaxsize 100M\n"));
        assert!(stanza.contains("\trotate 7\n"));
        assert!(stanza.contains("systemctl kill -s HUP rsyslog.service"));
        assert_eq!(stanza.matches('{').count(), 1);
        assert!(stanza.ends_with("}\n"));
    }

    #[test]
    fn test_has_rate_limit_ignores_comments() {
        assert!(!has_rate_limit(""));
        assert!(!has_rate_limit("# $SystemLogRateLimitInterval 5\n"));
        assert!(has_rate_limit("$SystemLogRateLimitInterval 5\n"));
        assert!(has_rate_limit("  $imjournalRatelimitInterval 10"));
        assert!(has_rate_limit(
            "module(load=\"imuxsock\" SysSock.RateLimit.Interval=\"5\")"
        ));
        assert!(!has_rate_limit("*.* /var/log/syslog\n$FileCreateMode 0640\n"));
    }

    #[test]
    fn test_appended_block_is_detected() {
        let config = RateLimitConfig::default();
        let original = "*.* /var/log/syslog";
        let block = rate_limit_block(&config, original);
        let updated = format!("{}{}", original, block);

        assert!(updated.contains("syslog\n\n# logjam"));
        assert!(has_rate_limit(&updated));
        assert!(updated.contains("$SystemLogRateLimitBurst 500\n"));
    }
}
