//! # System Constants
//!
//! Defaults and fixed names that define the operational boundaries of the
//! session profiler. Configuration values fall back to these when a field
//! is omitted from the profiler YAML.

use std::time::Duration;

/// Profiling defaults
pub mod profiling {
    use super::Duration;

    /// Minimum number of session requests in the trailing window before a
    /// session can be profiled. Sessions below this stay `Unknown`.
    pub const MIN_SESSION_REQUESTS: usize = 10;

    /// Trailing window used to bound history fetches
    pub const HISTORY_WINDOW: Duration = Duration::from_secs(60 * 60);

    /// Lifetime of a persisted priority before it ages out
    pub const PRIORITY_TTL: Duration = Duration::from_secs(60 * 60);

    /// Upper bound accepted for the priority TTL (one year)
    pub const MAX_PRIORITY_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

    /// How often upstream re-enqueues sessions for profiling (seconds)
    pub const PROFILING_INTERVAL_SECONDS: u64 = 10;

    /// How often expired priorities are purged from the store
    pub const PURGE_INTERVAL: Duration = Duration::from_secs(5 * 60);
}

/// Work queue defaults
pub mod queue {
    use super::Duration;

    pub const QUEUE_NAME: &str = "sessions";
    pub const CONSUMER_TAG: &str = "profiler service";

    /// Maximum number of deliveries processed concurrently by one consumer
    pub const PREFETCH_LIMIT: usize = 5;

    /// Poll interval when no deliveries are pending
    pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

    pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

    /// A delivery whose heartbeat is older than this is orphaned
    pub const LIVENESS_WINDOW: Duration = Duration::from_secs(60);

    pub const RECLAIM_INTERVAL: Duration = Duration::from_secs(1);

    /// Consecutive heartbeat failures after which the consumer stops fetching
    pub const HEARTBEAT_ERROR_LIMIT: u32 = 45;

    /// Capacity of the queue error channel feeding the error router
    pub const ERROR_CHANNEL_CAPACITY: usize = 10;

    pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Audit logging defaults
pub mod audit {
    use super::Duration;

    pub const BATCH_SIZE: usize = 1000;
    pub const FLUSH_INTERVAL: Duration = Duration::from_millis(250);
    pub const CHANNEL_CAPACITY: usize = 10_000;

    /// Bind parameters per audit row
    pub const BINDS_PER_ROW: usize = 3;

    /// Largest batch a single multi-row insert can carry under PostgreSQL's
    /// 65535 bind parameter limit
    pub const MAX_BATCH_SIZE: usize = u16::MAX as usize / BINDS_PER_ROW;
}

/// Table names used by the PostgreSQL collaborators
pub mod tables {
    pub const SESSION_REQUESTS: &str = "session_requests";
    pub const SESSION_PRIORITIES: &str = "session_priorities";
    pub const SESSION_PRIORITY_LOG: &str = "session_priority_log";
    pub const QUEUE_ITEMS: &str = "profiler_queue_items";
}

/// Default location of the profiler configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/profiler.yaml";

/// Environment variable overriding [`DEFAULT_CONFIG_PATH`]
pub const CONFIG_PATH_ENV: &str = "PROFILER_CONFIG_PATH";

/// Prefix for environment variable configuration overrides
pub const ENV_PREFIX: &str = "PROFILER";
