//! Configuration Error Types
//!
//! Errors raised while loading and validating the profiler configuration.
//! All of them are fatal at startup: the profiler never runs with invalid rules.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A single semantic validation failure, addressed by its dotted field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Configuration file not found at the expected location
    #[error("Configuration file not found at '{}'. Is the config mounted?", .path.display())]
    ConfigFileNotFound { path: PathBuf },

    /// The file or environment layer could not be read or deserialized
    #[error("Failed to read configuration from '{source_name}': {error}")]
    ParseError { source_name: String, error: String },

    /// Missing required configuration field
    #[error("Missing required configuration field '{field}' in {context}")]
    MissingRequiredField { field: String, context: String },

    /// Semantic validation failed; carries every issue found, not just the first
    #[error("Configuration validation failed: {}", format_issues(.issues))]
    Validation { issues: Vec<ValidationIssue> },
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConfigurationError {
    pub fn config_file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigFileNotFound { path: path.into() }
    }

    pub fn parse_error<S: Into<String>, E: fmt::Display>(source_name: S, error: E) -> Self {
        Self::ParseError {
            source_name: source_name.into(),
            error: error.to_string(),
        }
    }

    pub fn missing_required_field<F: Into<String>, C: Into<String>>(field: F, context: C) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }

    pub fn validation(issues: Vec<ValidationIssue>) -> Self {
        Self::Validation { issues }
    }

    /// Validation issues carried by this error, if any
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            Self::Validation { issues } => issues,
            _ => &[],
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(field) => {
                Self::missing_required_field(field, "profiler configuration")
            }
            other => Self::parse_error("profiler configuration", other),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;
