//! Logjam Common - shared plumbing for recovery and monitoring
//!
//! Configuration, run context, report sink, host providers, operator
//! confirmation, usage classification, retention and the run lock.

pub mod config;
pub mod confirm;
pub mod context;
pub mod error;
pub mod host;
pub mod lock;
pub mod logging;
pub mod report;
pub mod retention;
pub mod threshold;

pub use config::Config;
pub use confirm::{Confirm, ScriptedConfirm, TerminalConfirm};
pub use context::{Component, RunContext};
pub use error::{ConfigError, LogjamError, Result};
pub use host::{
    CommandOutcome, DiskUsage, HostSystem, ServiceState, Severity, SystemControl, SystemFacts,
};
pub use lock::RunLock;
pub use report::{format_bytes, Alert, AlertLog, LogLevel, ReportSink};
pub use threshold::Classification;
