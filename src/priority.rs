//! # Session Priority
//!
//! The coarse priority tier assigned to a browsing session. The string form
//! (`"unknown"`, `"low"`, `"high"`) is what gets persisted to the priority
//! store and recorded by the audit logger, so downstream admission control
//! reads exactly these values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Priority tier of a session.
///
/// `Unknown` is the fallback and is never treated as a rule match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Unknown,
    Low,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Unknown => "unknown",
            Priority::Low => "low",
            Priority::High => "high",
        }
    }

    /// Whether this tier can be produced by a classification rule.
    pub fn is_rule_result(&self) -> bool {
        matches!(self, Priority::Low | Priority::High)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known priority tier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid priority '{0}': expected one of unknown, low, high")]
pub struct ParsePriorityError(pub String);

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(Priority::Unknown),
            "low" => Ok(Priority::Low),
            "high" => Ok(Priority::High),
            _ => Err(ParsePriorityError(s.to_string())),
        }
    }
}
