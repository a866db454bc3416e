//! Logjamctl library - recovery orchestrator, exposed for integration tests

pub mod backup;
pub mod cli;
pub mod errors;
pub mod recovery;

pub use backup::{BackupRecord, Verification};
pub use recovery::{Phase, PhaseOutcome, Recovery, RecoveryResult, RunOutcome};
