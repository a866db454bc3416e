//! ServiceRestoration: bring the logger, mail queue and control daemon back.
//!
//! Only the control daemon restart is retried, and only up to the
//! configured bound.

use super::{Halt, Recovery};
use std::time::Duration;

pub(super) fn run(rec: &mut Recovery<'_>) -> Result<(), Halt> {
    let logger = rec.config.services.logger.clone();
    rec.restart_verified(&logger)?;
    flush_mail_queue(rec);
    clear_spool(rec);
    restart_control_daemon(rec)?;
    check_control_plane(rec)
}

/// Off the critical path: failure is a warning
fn flush_mail_queue(rec: &mut Recovery<'_>) {
    let config = rec.config;
    let outcome = rec.control.run(&config.services.mail_flush_command, None);
    if outcome.success() {
        rec.step(&format!("{} queue flushed", config.services.mail_transport));
    } else {
        rec.warn(&format!("mail queue flush failed: {}", outcome.summary()));
    }
}

fn clear_spool(rec: &mut Recovery<'_>) {
    let config = rec.config;
    let dir = &config.services.control_spool_dir;
    let pattern = &config.services.control_spool_pattern;

    let entries = match rec.facts.matching_entries(dir, pattern) {
        Ok(Some(entries)) => entries,
        Ok(None) => {
            rec.step(&format!("spool directory {} absent, nothing to clear", dir.display()));
            return;
        }
        Err(e) => {
            rec.warn(&format!("cannot list {}: {}", dir.display(), e));
            return;
        }
    };

    if entries.is_empty() {
        rec.step(&format!("no stale {} artifacts in {}", pattern, dir.display()));
        return;
    }

    let mut removed = 0;
    for entry in &entries {
        match rec.control.remove_file(entry) {
            Ok(()) => removed += 1,
            Err(e) => rec.warn(&format!("cannot remove {}: {}", entry.display(), e)),
        }
    }
    rec.step(&format!(
        "removed {} of {} stale artifacts from {}",
        removed,
        entries.len(),
        dir.display()
    ));
}

/// Bounded retry; exhausting the attempts is fatal and never retried further
fn restart_control_daemon(rec: &mut Recovery<'_>) -> Result<(), Halt> {
    let config = rec.config;
    let daemon = &config.services.control_daemon;
    let attempts = config.restart.attempts;
    let timeout = Duration::from_secs(config.restart.attempt_timeout_secs);

    for attempt in 1..=attempts {
        let outcome = rec.control.restart_service(daemon, Some(timeout));
        if rec.facts.service_state(daemon).is_active() {
            rec.step(&format!(
                "{} active after attempt {}/{}",
                daemon, attempt, attempts
            ));
            return Ok(());
        }
        rec.warn(&format!(
            "attempt {}/{}: {} not active ({})",
            attempt,
            attempts,
            daemon,
            outcome.summary()
        ));

        if attempt < attempts {
            rec.pause(config.restart.retry_delay_secs);
            if rec.facts.service_state(daemon).is_active() {
                rec.step(&format!("{} became active after the retry delay", daemon));
                return Ok(());
            }
        }
    }

    let state = rec.facts.service_state(daemon);
    Err(rec.fatal(&format!(
        "{} still {} after {} restart attempts",
        daemon, state, attempts
    )))
}

/// Restoring operator access is the point of the run: failure is fatal
fn check_control_plane(rec: &mut Recovery<'_>) -> Result<(), Halt> {
    let config = rec.config;
    let timeout = Duration::from_secs(config.restart.status_timeout_secs);
    let outcome = rec
        .control
        .run(&config.services.control_status_command, Some(timeout));

    if !outcome.success() {
        return Err(rec.fatal(&format!(
            "control plane unreachable: {}",
            outcome.summary()
        )));
    }
    rec.step(&format!("control plane reachable: {}", outcome.summary()));
    Ok(())
}
