//! Console tracing
//!
//! The persistent record of a run is the report and the JSONL run log
//! (`report` module). This subscriber is only the console mirror: full
//! progress on stderr for interactive runs, warnings and errors otherwise.
//! `RUST_LOG` overrides the configured level.

use std::io::IsTerminal;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// stderr attached to a terminal
pub fn is_interactive() -> bool {
    std::io::stderr().is_terminal()
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(interactive: bool, level: &str) {
    let default_level = if interactive { level } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init();
}
