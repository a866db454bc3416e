//! Usage classification
//!
//! Derived per run from one reading; nothing is remembered between runs.

use crate::config::Thresholds;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    Ok,
    Warning,
    Critical,
}

impl Classification {
    /// critical ≥ X, warn ≥ Y, else OK
    pub fn classify(percent: u8, thresholds: &Thresholds) -> Self {
        if percent >= thresholds.critical_percent {
            Classification::Critical
        } else if percent >= thresholds.warn_percent {
            Classification::Warning
        } else {
            Classification::Ok
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Ok => "OK",
            Classification::Warning => "WARNING",
            Classification::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds {
            warn_percent: 80,
            critical_percent: 90,
        }
    }

    #[test]
    fn test_boundaries() {
        let t = thresholds();
        assert_eq!(Classification::classify(79, &t), Classification::Ok);
        assert_eq!(Classification::classify(80, &t), Classification::Warning);
        assert_eq!(Classification::classify(89, &t), Classification::Warning);
        assert_eq!(Classification::classify(90, &t), Classification::Critical);
        assert_eq!(Classification::classify(100, &t), Classification::Critical);
        assert_eq!(Classification::classify(0, &t), Classification::Ok);
    }

    #[test]
    fn test_every_percentage_matches_definition() {
        let t = thresholds();
        for p in 0..=100u8 {
            let expected = if p >= t.critical_percent {
                Classification::Critical
            } else if p >= t.warn_percent {
                Classification::Warning
            } else {
                Classification::Ok
            };
            assert_eq!(Classification::classify(p, &t), expected, "percent {}", p);
        }
    }
}
