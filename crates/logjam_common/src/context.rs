//! Per-invocation run context
//!
//! Created once at the start of a recovery or monitor run and dropped at
//! exit. Resolves every path the run will write to.

use crate::config::Config;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which program owns the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Recovery,
    Monitor,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Recovery => "recovery",
            Component::Monitor => "monitor",
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RunContext {
    pub component: Component,
    pub started_at: DateTime<Local>,
    /// Date and time, e.g. 20261016-093015
    pub run_id: String,
    /// Day partition name, e.g. 2026-10-16
    pub day: String,
    pub report_path: PathBuf,
    pub log_path: PathBuf,
    /// Timestamped backup directory; recovery runs only
    pub backup_dir: Option<PathBuf>,
    /// Mirror progress to the console
    pub interactive: bool,
}

impl RunContext {
    pub fn new(
        component: Component,
        config: &Config,
        started_at: DateTime<Local>,
        interactive: bool,
    ) -> Self {
        let run_id = started_at.format("%Y%m%d-%H%M%S").to_string();
        let day = started_at.format("%Y-%m-%d").to_string();
        let time_of_day = started_at.format("%H%M%S").to_string();

        let report_path = config
            .paths
            .report_root
            .join(&day)
            .join(format!("{}-{}.txt", component.as_str(), time_of_day));
        let log_path = config
            .paths
            .log_root
            .join(&day)
            .join(format!("{}.log", component.as_str()));
        let backup_dir = match component {
            Component::Recovery => Some(config.backup.root.join(&run_id)),
            Component::Monitor => None,
        };

        Self {
            component,
            started_at,
            run_id,
            day,
            report_path,
            log_path,
            backup_dir,
            interactive,
        }
    }
}
