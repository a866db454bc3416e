//! Logjam monitor library - one periodic monitoring pass

pub mod cli;
pub mod errors;
pub mod runner;

pub use runner::{MonitorOutcome, MonitorRunner, PassRecord};
