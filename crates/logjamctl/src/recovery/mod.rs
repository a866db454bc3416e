//! Recovery orchestrator
//!
//! One-shot phased recovery of a partition filled by a runaway log:
//!
//! PreFlight -> Backup&Reclaim -> ServiceRestoration -> PreventiveConfig
//!
//! Each phase returns a tagged outcome. The driver stops at the first phase
//! that does not complete; no later phase runs after an abort or a fatal
//! halt, and there is no resumption. A second run starts from PreFlight.
//!
//! Inside a phase, steps return `Result<_, Halt>` and propagate with `?`;
//! the phase boundary folds that into a `PhaseOutcome`.

mod preflight;
mod preventive;
mod reclaim;
mod services;

pub use preventive::{has_rate_limit, rate_limit_block, render_rotation};

use crate::backup::{self, BackupRecord};
use crate::errors::{EXIT_ABORTED, EXIT_FATAL, EXIT_SUCCESS};
use logjam_common::{
    Config, Confirm, LogLevel, ReportSink, RunContext, ServiceState, SystemControl, SystemFacts,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Recovery phases in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    PreFlight,
    BackupReclaim,
    ServiceRestoration,
    PreventiveConfig,
}

impl Phase {
    /// Fixed order; never reordered or skipped
    pub const ORDER: [Phase; 4] = [
        Phase::PreFlight,
        Phase::BackupReclaim,
        Phase::ServiceRestoration,
        Phase::PreventiveConfig,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::PreFlight => "PreFlight",
            Phase::BackupReclaim => "Backup&Reclaim",
            Phase::ServiceRestoration => "ServiceRestoration",
            Phase::PreventiveConfig => "PreventiveConfig",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Result of a single phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    Completed,
    Aborted(String),
    Fatal(String),
}

/// Early exit from a phase step
#[derive(Debug, Error)]
pub(crate) enum Halt {
    #[error("aborted by operator: {0}")]
    Abort(String),
    #[error("{0}")]
    Fatal(String),
}

impl From<Result<(), Halt>> for PhaseOutcome {
    fn from(result: Result<(), Halt>) -> Self {
        match result {
            Ok(()) => PhaseOutcome::Completed,
            Err(Halt::Abort(reason)) => PhaseOutcome::Aborted(reason),
            Err(Halt::Fatal(reason)) => PhaseOutcome::Fatal(reason),
        }
    }
}

/// Result of a whole run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    AbortedByOperator(Phase, String),
    FatalError(Phase, String),
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Success => EXIT_SUCCESS,
            RunOutcome::AbortedByOperator(..) => EXIT_ABORTED,
            RunOutcome::FatalError(..) => EXIT_FATAL,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RunOutcome::Success => "success".to_string(),
            RunOutcome::AbortedByOperator(phase, reason) => {
                format!("aborted by operator in {}: {}", phase, reason)
            }
            RunOutcome::FatalError(phase, reason) => format!("fatal in {}: {}", phase, reason),
        }
    }
}

/// Everything the caller needs after a run
#[derive(Debug, Clone)]
pub struct RecoveryResult {
    pub outcome: RunOutcome,
    pub completed: Vec<Phase>,
    pub records: Vec<BackupRecord>,
    /// Set when PreFlight got as far as creating it
    pub backup_dir: Option<PathBuf>,
    /// `None` when the report tree could not be written
    pub report_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub write_failures: usize,
}

pub struct Recovery<'a> {
    config: &'a Config,
    facts: &'a dyn SystemFacts,
    control: &'a dyn SystemControl,
    confirm: &'a dyn Confirm,
    ctx: RunContext,
    sink: ReportSink,
    backup_dir: PathBuf,
    backup_dir_ready: bool,
    skip_backup: bool,
    phase: Phase,
    records: Vec<BackupRecord>,
    services_before: Vec<(String, ServiceState)>,
}

impl<'a> Recovery<'a> {
    /// Open the report and run log for `ctx`. Nothing on the host changes.
    pub fn new(
        config: &'a Config,
        facts: &'a dyn SystemFacts,
        control: &'a dyn SystemControl,
        confirm: &'a dyn Confirm,
        ctx: RunContext,
    ) -> Self {
        let sink = ReportSink::open(&ctx);
        let backup_dir = ctx
            .backup_dir
            .clone()
            .unwrap_or_else(|| config.backup.root.join(&ctx.run_id));

        Self {
            config,
            facts,
            control,
            confirm,
            ctx,
            sink,
            backup_dir,
            backup_dir_ready: false,
            skip_backup: false,
            phase: Phase::PreFlight,
            records: Vec::new(),
            services_before: Vec::new(),
        }
    }

    pub fn run(mut self, skip_backup: bool) -> RecoveryResult {
        self.skip_backup = skip_backup;
        self.header();

        let mut outcome = RunOutcome::Success;
        let mut completed = Vec::new();

        for phase in Phase::ORDER {
            self.phase = phase;
            self.sink.section(phase.name());
            self.sink.info(Some(phase.name()), "phase started");
            debug!(phase = phase.name(), skip_backup, "dispatching phase");

            let result = match phase {
                Phase::PreFlight => preflight::run(&mut self),
                Phase::BackupReclaim => reclaim::run(&mut self),
                Phase::ServiceRestoration => services::run(&mut self),
                Phase::PreventiveConfig => preventive::run(&mut self),
            };

            match PhaseOutcome::from(result) {
                PhaseOutcome::Completed => {
                    self.sink.info(Some(phase.name()), "phase completed");
                    completed.push(phase);
                }
                PhaseOutcome::Aborted(reason) => {
                    outcome = RunOutcome::AbortedByOperator(phase, reason);
                    break;
                }
                PhaseOutcome::Fatal(reason) => {
                    outcome = RunOutcome::FatalError(phase, reason);
                    break;
                }
            }
        }

        self.finish(outcome, completed)
    }

    fn header(&mut self) {
        let config = self.config;
        self.sink.section("Logjam recovery");
        self.sink.kv("Host", self.facts.hostname());
        self.sink.kv("Started", self.ctx.started_at.to_rfc3339());
        self.sink.kv("Run id", &self.ctx.run_id);
        self.sink.kv("Mount point", config.target.mount_point.display());
        self.sink.kv("Oversized file", config.target.oversized_file.display());
        self.sink.kv("Skip backup", self.skip_backup);
        self.sink.info(None, "recovery started");
    }

    fn finish(mut self, outcome: RunOutcome, completed: Vec<Phase>) -> RecoveryResult {
        self.sink.section("Summary");
        self.sink.kv("Outcome", outcome.describe());
        let names: Vec<&str> = completed.iter().map(Phase::name).collect();
        self.sink.kv("Phases completed", format!("{}/4 {}", completed.len(), names.join(" ")));

        let before = std::mem::take(&mut self.services_before);
        for (service, was) in &before {
            let now = self.facts.service_state(service);
            self.sink.kv(service, format!("{} -> {}", was, now));
        }

        for record in &self.records {
            self.sink.line(&format!("backup: {}", record.describe()));
        }

        let backup_dir = if self.backup_dir_ready {
            match backup::write_manifest(&self.backup_dir, &self.records) {
                Ok(path) => self.sink.kv("Backup manifest", path.display()),
                Err(e) => self.sink.warn(None, &format!("failed to write backup manifest: {}", e)),
            }
            Some(self.backup_dir.clone())
        } else {
            None
        };

        match &outcome {
            RunOutcome::Success => self.sink.info(None, "recovery completed"),
            RunOutcome::AbortedByOperator(phase, reason) => self.sink.event(
                LogLevel::Warn,
                Some(phase.name()),
                &format!("recovery aborted: {}", reason),
            ),
            RunOutcome::FatalError(phase, reason) => self.sink.event(
                LogLevel::Error,
                Some(phase.name()),
                &format!("recovery halted: {}", reason),
            ),
        }

        let log_path = self.sink.log_path().map(|p| p.to_path_buf());
        if let Some(path) = &log_path {
            self.sink.kv("Run log", path.display());
        }
        let write_failures = self.sink.write_failures();
        if write_failures > 0 {
            self.sink.kv("Write failures", write_failures);
        }
        let report_path = self.sink.close();

        RecoveryResult {
            outcome,
            completed,
            records: self.records,
            backup_dir,
            report_path,
            log_path,
            write_failures,
        }
    }

    // Step helpers shared by the phases. Each writes the report line and
    // the run log entry for the current phase.

    fn step(&mut self, message: &str) {
        self.sink.line(message);
        self.sink.info(Some(self.phase.name()), message);
    }

    fn warn(&mut self, message: &str) {
        self.sink.line(&format!("WARNING: {}", message));
        self.sink.warn(Some(self.phase.name()), message);
    }

    fn fatal(&mut self, reason: &str) -> Halt {
        self.sink.line(&format!("FATAL: {}", reason));
        self.sink.error(Some(self.phase.name()), reason);
        Halt::Fatal(reason.to_string())
    }

    fn abort(&mut self, reason: &str) -> Halt {
        self.sink.line(&format!("ABORTED: {}", reason));
        self.sink.warn(Some(self.phase.name()), reason);
        Halt::Abort(reason.to_string())
    }

    /// Operator decision; unattended runs always decline
    fn ask(&mut self, prompt: &str) -> bool {
        let answer = self.confirm.confirm(prompt, false);
        let decision = if answer { "continue" } else { "decline" };
        self.step(&format!("operator decision: {} ({})", decision, prompt));
        answer
    }

    fn push_record(&mut self, record: BackupRecord) {
        self.sink.line(&format!("backup record: {}", record.describe()));
        self.records.push(record);
    }

    fn pause(&self, secs: u64) {
        if secs > 0 {
            debug!(phase = self.phase.name(), secs, "pausing");
            std::thread::sleep(Duration::from_secs(secs));
        }
    }

    /// Restart a service and require it to be active right after
    fn restart_verified(&mut self, service: &str) -> Result<(), Halt> {
        let outcome = self.control.restart_service(service, None);
        let state = self.facts.service_state(service);
        if state.is_active() {
            self.step(&format!("{} restarted and active", service));
            return Ok(());
        }
        Err(self.fatal(&format!(
            "{} is {} after restart ({})",
            service,
            state,
            outcome.summary()
        )))
    }
}
