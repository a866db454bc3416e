//! Scriptable host for tests
//!
//! File operations go to the real filesystem (point the config at a
//! TempDir). Everything that would touch the machine itself is scripted:
//! usage readings, service states, command results, privilege. Failures can
//! be injected into copy, truncate and write to reach every halt path.

use super::exec::{CommandOutcome, ExecutionStatus};
use super::system::{list_matching, metadata_size, read_tail, scan_consumers};
use super::{ConsumerScan, DiskUsage, ServiceState, Severity, SystemControl, SystemFacts};
use crate::error::Result;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Injected misbehaviour for file actions
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Copies whose source ends with this file name fail
    pub copy_fails_for: Option<String>,
    /// Copies of this file name are short by this many bytes
    pub copy_short_for: Option<(String, u64)>,
    /// Truncate reports success but leaves the file alone
    pub truncate_is_noop: bool,
    /// Writes to this file name fail
    pub write_fails_for: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    usage: HashMap<PathBuf, VecDeque<DiskUsage>>,
    services: HashMap<String, ServiceState>,
    after_restart: HashMap<String, VecDeque<ServiceState>>,
    command_results: HashMap<String, VecDeque<CommandOutcome>>,
    commands_run: Vec<String>,
    restarts: Vec<String>,
    syslog: Vec<(Severity, String)>,
}

#[derive(Debug)]
pub struct FakeHost {
    privileged: bool,
    missing_commands: HashSet<String>,
    default_usage: DiskUsage,
    faults: Faults,
    state: Mutex<State>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

/// Usage with a given percent on a 100 GiB filesystem
pub fn usage_at(percent: u8) -> DiskUsage {
    let total = 100 * 1024 * 1024 * 1024u64;
    let used = total / 100 * percent as u64;
    DiskUsage {
        total_bytes: total,
        used_bytes: used,
        available_bytes: total - used,
        percent_used: percent,
    }
}

impl FakeHost {
    /// Privileged, every command present, 50% everywhere, services active
    pub fn new() -> Self {
        Self {
            privileged: true,
            missing_commands: HashSet::new(),
            default_usage: usage_at(50),
            faults: Faults::default(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn unprivileged(mut self) -> Self {
        self.privileged = false;
        self
    }

    pub fn without_command(mut self, name: &str) -> Self {
        self.missing_commands.insert(name.to_string());
        self
    }

    pub fn with_default_usage(mut self, usage: DiskUsage) -> Self {
        self.default_usage = usage;
        self
    }

    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    /// Successive readings for `path`; the last one repeats
    pub fn script_usage(self, path: &Path, readings: &[DiskUsage]) -> Self {
        self.lock()
            .usage
            .insert(path.to_path_buf(), readings.iter().copied().collect());
        self
    }

    pub fn with_service(self, service: &str, state: ServiceState) -> Self {
        self.lock().services.insert(service.to_string(), state);
        self
    }

    /// States the service lands in after each restart; the last one repeats
    pub fn script_restarts(self, service: &str, states: &[ServiceState]) -> Self {
        self.lock()
            .after_restart
            .insert(service.to_string(), states.iter().cloned().collect());
        self
    }

    /// Results for commands whose program is `program`; the last one repeats
    pub fn script_command(self, program: &str, results: &[ExecutionStatus]) -> Self {
        let outcomes = results
            .iter()
            .map(|status| CommandOutcome::synthetic(program, *status, "scripted failure"))
            .collect();
        self.lock()
            .command_results
            .insert(program.to_string(), outcomes);
        self
    }

    pub fn commands_run(&self) -> Vec<String> {
        self.lock().commands_run.clone()
    }

    pub fn restarts(&self) -> Vec<String> {
        self.lock().restarts.clone()
    }

    pub fn syslog_messages(&self) -> Vec<(Severity, String)> {
        self.lock().syslog.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn name_matches(path: &Path, name: &Option<String>) -> bool {
        match (name, path.file_name()) {
            (Some(expected), Some(actual)) => actual.to_string_lossy() == expected.as_str(),
            _ => false,
        }
    }

    fn next_scripted<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl SystemFacts for FakeHost {
    fn is_privileged(&self) -> bool {
        self.privileged
    }

    fn command_available(&self, name: &str) -> bool {
        !self.missing_commands.contains(name)
    }

    fn disk_usage(&self, path: &Path) -> Result<DiskUsage> {
        let mut state = self.lock();
        let scripted = state
            .usage
            .get_mut(path)
            .and_then(|queue| Self::next_scripted(queue));
        Ok(scripted.unwrap_or(self.default_usage))
    }

    fn file_size(&self, path: &Path) -> io::Result<Option<u64>> {
        metadata_size(path)
    }

    fn service_state(&self, service: &str) -> ServiceState {
        self.lock()
            .services
            .get(service)
            .cloned()
            .unwrap_or(ServiceState::Active)
    }

    fn matching_entries(&self, dir: &Path, pattern: &str) -> io::Result<Option<Vec<PathBuf>>> {
        list_matching(dir, pattern)
    }

    fn top_consumers(&self, root: &Path, limit: usize) -> ConsumerScan {
        scan_consumers(root, limit)
    }

    fn tail(&self, path: &Path, lines: usize) -> io::Result<Vec<String>> {
        read_tail(path, lines)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn hostname(&self) -> String {
        "testhost".to_string()
    }
}

impl SystemControl for FakeHost {
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        if Self::name_matches(from, &self.faults.copy_fails_for) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected copy failure"));
        }
        let copied = fs::copy(from, to)?;
        if let Some((name, short_by)) = &self.faults.copy_short_for {
            if Self::name_matches(from, &Some(name.clone())) {
                let kept = copied.saturating_sub(*short_by);
                OpenOptions::new().write(true).open(to)?.set_len(kept)?;
                return Ok(kept);
            }
        }
        Ok(copied)
    }

    fn truncate(&self, path: &Path) -> io::Result<()> {
        if self.faults.truncate_is_noop {
            return Ok(());
        }
        OpenOptions::new().write(true).open(path)?.set_len(0)
    }

    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        if Self::name_matches(path, &self.faults.write_fails_for) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
        }
        fs::write(path, contents)
    }

    fn append_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        if Self::name_matches(path, &self.faults.write_fails_for) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
        }
        let mut file = OpenOptions::new().append(true).open(path)?;
        file.write_all(contents.as_bytes())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn restart_service(&self, service: &str, _timeout: Option<Duration>) -> CommandOutcome {
        let mut state = self.lock();
        state.restarts.push(service.to_string());

        let next = state
            .after_restart
            .get_mut(service)
            .and_then(|queue| Self::next_scripted(queue))
            .unwrap_or(ServiceState::Active);
        let status = if next.is_active() {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::NonZeroExit
        };
        state.services.insert(service.to_string(), next);

        CommandOutcome::synthetic(&format!("systemctl restart {}", service), status, "")
    }

    fn run(&self, argv: &[String], _timeout: Option<Duration>) -> CommandOutcome {
        let command = argv.join(" ");
        let mut state = self.lock();
        state.commands_run.push(command.clone());

        let program = argv.first().cloned().unwrap_or_default();
        let scripted = state
            .command_results
            .get_mut(&program)
            .and_then(|queue| Self::next_scripted(queue));

        match scripted {
            Some(mut outcome) => {
                outcome.command = command;
                outcome
            }
            None => CommandOutcome::synthetic(&command, ExecutionStatus::Success, ""),
        }
    }

    fn syslog(&self, severity: Severity, message: &str) -> CommandOutcome {
        self.lock().syslog.push((severity, message.to_string()));
        CommandOutcome::synthetic("logger", ExecutionStatus::Success, "")
    }
}
