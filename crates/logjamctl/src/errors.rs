//! Exit status for logjamctl
//!
//! Scripts wrapping a recovery run branch on these, so they are stable.

/// All four phases completed
pub const EXIT_SUCCESS: i32 = 0;

/// A phase halted on a fatal condition
pub const EXIT_FATAL: i32 = 1;

/// The operator declined to continue at a decision point
pub const EXIT_ABORTED: i32 = 2;

/// Configuration could not be loaded or failed validation (EX_CONFIG)
pub const EXIT_CONFIG_ERROR: i32 = 78;
