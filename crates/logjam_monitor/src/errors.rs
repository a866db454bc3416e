//! Exit status for logjam-monitor
//!
//! The classification is reported, never encoded in the exit status: a
//! completed pass exits 0 whether usage is OK, WARNING or CRITICAL.

pub const EXIT_SUCCESS: i32 = 0;

/// The pass could not complete
pub const EXIT_ERROR: i32 = 1;

/// Another instance holds the lock (EX_TEMPFAIL)
pub const EXIT_ALREADY_RUNNING: i32 = 75;

/// Configuration could not be loaded or failed validation (EX_CONFIG)
pub const EXIT_CONFIG_ERROR: i32 = 78;
