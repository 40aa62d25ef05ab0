//! # Profiler Configuration
//!
//! Typed view of `config/profiler.yaml`. Sections other than `connections` and
//! `rules` are optional and fall back to the values in [`crate::constants`].
//!
//! ## Layout
//!
//! ```yaml
//! connections:
//!   store:   { url: postgresql://..., max_connections: 5 }
//!   queue:   { url: postgresql://... }
//!   history: { url: postgresql://... }
//! profiling:
//!   interval_seconds: 10
//!   history_window_seconds: 3600
//!   min_session_requests: 10
//! rules:
//!   - description: "many logins"
//!     method: { should_match_all: false, method: POST }
//!     path: /login
//!     occurrences: 5
//!     result: low
//! ```
//!
//! Any field can be overridden through `PROFILER_<SECTION>__<FIELD>`
//! environment variables (see [`loader`]).

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants;
use crate::profiling::rules::RuleSet;

pub use error::{ConfigResult, ConfigurationError, ValidationIssue};
pub use loader::ConfigManager;

/// Root configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilerConfig {
    pub connections: ConnectionsConfig,
    #[serde(default)]
    pub profiling: ProfilingConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// Connection settings for each external collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionsConfig {
    pub store: DatabaseConnectionConfig,
    pub queue: DatabaseConnectionConfig,
    pub history: DatabaseConnectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConnectionConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_seconds")]
    pub acquire_timeout_seconds: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_seconds() -> u64 {
    5
}

impl DatabaseConnectionConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    /// Cadence at which upstream re-enqueues sessions. Informational only;
    /// the profiler reacts to queue deliveries, not to this timer.
    pub interval_seconds: u64,
    pub history_window_seconds: u64,
    pub min_session_requests: usize,
    pub priority_ttl_seconds: u64,
    pub purge_interval_seconds: u64,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: constants::profiling::PROFILING_INTERVAL_SECONDS,
            history_window_seconds: constants::profiling::HISTORY_WINDOW.as_secs(),
            min_session_requests: constants::profiling::MIN_SESSION_REQUESTS,
            priority_ttl_seconds: constants::profiling::PRIORITY_TTL.as_secs(),
            purge_interval_seconds: constants::profiling::PURGE_INTERVAL.as_secs(),
        }
    }
}

impl ProfilingConfig {
    pub fn history_window(&self) -> Duration {
        Duration::from_secs(self.history_window_seconds)
    }

    pub fn priority_ttl(&self) -> Duration {
        Duration::from_secs(self.priority_ttl_seconds)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub name: String,
    pub consumer_tag: String,
    pub prefetch_limit: usize,
    pub poll_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub liveness_window_seconds: u64,
    pub reclaim_interval_seconds: u64,
    pub heartbeat_error_limit: u32,
    pub shutdown_timeout_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: constants::queue::QUEUE_NAME.to_string(),
            consumer_tag: constants::queue::CONSUMER_TAG.to_string(),
            prefetch_limit: constants::queue::PREFETCH_LIMIT,
            poll_interval_ms: constants::queue::POLL_INTERVAL.as_millis() as u64,
            heartbeat_interval_ms: constants::queue::HEARTBEAT_INTERVAL.as_millis() as u64,
            liveness_window_seconds: constants::queue::LIVENESS_WINDOW.as_secs(),
            reclaim_interval_seconds: constants::queue::RECLAIM_INTERVAL.as_secs(),
            heartbeat_error_limit: constants::queue::HEARTBEAT_ERROR_LIMIT,
            shutdown_timeout_seconds: constants::queue::SHUTDOWN_TIMEOUT.as_secs(),
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness_window_seconds)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub channel_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: constants::audit::BATCH_SIZE,
            flush_interval_ms: constants::audit::FLUSH_INTERVAL.as_millis() as u64,
            channel_capacity: constants::audit::CHANNEL_CAPACITY,
        }
    }
}

impl AuditConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Raw rule as written in YAML. Every field is optional here so validation
/// can report all missing fields at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleConfig {
    pub description: Option<String>,
    pub method: Option<MethodConfig>,
    pub path: Option<String>,
    pub occurrences: Option<i64>,
    pub result: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodConfig {
    pub should_match_all: Option<bool>,
    pub method: Option<String>,
}

impl ProfilerConfig {
    /// Validate every section and compile the rule list.
    ///
    /// Issues are collected across all sections; the returned error carries
    /// the full list rather than stopping at the first problem.
    pub fn validate(&self) -> ConfigResult<RuleSet> {
        let mut issues = Vec::new();

        for (name, conn) in [
            ("store", &self.connections.store),
            ("queue", &self.connections.queue),
            ("history", &self.connections.history),
        ] {
            if conn.url.trim().is_empty() {
                issues.push(ValidationIssue::new(
                    format!("connections.{name}.url"),
                    "must not be empty",
                ));
            }
            if conn.max_connections == 0 {
                issues.push(ValidationIssue::new(
                    format!("connections.{name}.max_connections"),
                    "must be greater than 0",
                ));
            }
        }

        if self.profiling.interval_seconds == 0 {
            issues.push(ValidationIssue::new(
                "profiling.interval_seconds",
                "must be greater than 0",
            ));
        }
        if self.profiling.history_window_seconds == 0 {
            issues.push(ValidationIssue::new(
                "profiling.history_window_seconds",
                "must be greater than 0",
            ));
        }
        if self.profiling.priority_ttl_seconds == 0 {
            issues.push(ValidationIssue::new(
                "profiling.priority_ttl_seconds",
                "must be greater than 0",
            ));
        } else if self.profiling.priority_ttl() > constants::profiling::MAX_PRIORITY_TTL {
            issues.push(ValidationIssue::new(
                "profiling.priority_ttl_seconds",
                format!(
                    "must be at most {}",
                    constants::profiling::MAX_PRIORITY_TTL.as_secs()
                ),
            ));
        }
        if self.profiling.purge_interval_seconds == 0 {
            issues.push(ValidationIssue::new(
                "profiling.purge_interval_seconds",
                "must be greater than 0",
            ));
        }

        if self.queue.name.trim().is_empty() {
            issues.push(ValidationIssue::new("queue.name", "must not be empty"));
        }
        if self.queue.prefetch_limit == 0 {
            issues.push(ValidationIssue::new(
                "queue.prefetch_limit",
                "must be greater than 0",
            ));
        }
        if self.queue.poll_interval_ms == 0 {
            issues.push(ValidationIssue::new(
                "queue.poll_interval_ms",
                "must be greater than 0",
            ));
        }
        if self.queue.heartbeat_interval_ms == 0 {
            issues.push(ValidationIssue::new(
                "queue.heartbeat_interval_ms",
                "must be greater than 0",
            ));
        }
        if self.queue.reclaim_interval_seconds == 0 {
            issues.push(ValidationIssue::new(
                "queue.reclaim_interval_seconds",
                "must be greater than 0",
            ));
        }
        if self.queue.heartbeat_error_limit == 0 {
            issues.push(ValidationIssue::new(
                "queue.heartbeat_error_limit",
                "must be greater than 0",
            ));
        }
        if self.queue.liveness_window() <= self.queue.heartbeat_interval() {
            issues.push(ValidationIssue::new(
                "queue.liveness_window_seconds",
                "must be longer than queue.heartbeat_interval_ms",
            ));
        }

        if self.audit.enabled {
            if self.audit.batch_size == 0 {
                issues.push(ValidationIssue::new(
                    "audit.batch_size",
                    "must be greater than 0",
                ));
            } else if self.audit.batch_size > constants::audit::MAX_BATCH_SIZE {
                issues.push(ValidationIssue::new(
                    "audit.batch_size",
                    format!(
                        "must be at most {} to fit one insert statement",
                        constants::audit::MAX_BATCH_SIZE
                    ),
                ));
            }
            if self.audit.flush_interval_ms == 0 {
                issues.push(ValidationIssue::new(
                    "audit.flush_interval_ms",
                    "must be greater than 0",
                ));
            }
            if self.audit.channel_capacity == 0 {
                issues.push(ValidationIssue::new(
                    "audit.channel_capacity",
                    "must be greater than 0",
                ));
            }
        }

        let rules = match RuleSet::from_configs(&self.rules) {
            Ok(rules) => Some(rules),
            Err(rule_issues) => {
                issues.extend(rule_issues);
                None
            }
        };

        match rules {
            Some(rules) if issues.is_empty() => Ok(rules),
            _ => Err(ConfigurationError::validation(issues)),
        }
    }
}
