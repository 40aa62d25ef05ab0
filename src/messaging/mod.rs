//! # Messaging
//!
//! Reliable work queue carrying session ids to the profiler.
//!
//! ## Providers
//!
//! - [`PgWorkQueue`] - PostgreSQL table with `SKIP LOCKED` claiming
//! - [`InMemoryWorkQueue`] - process-local, for tests and local runs
//!
//! Both share one liveness rule, [`is_orphaned`]: an unacknowledged delivery
//! whose heartbeat is older than the liveness window belongs to a dead
//! consumer and may be handed to someone else.

pub mod errors;
pub mod in_memory;
pub mod postgres;
pub mod traits;
pub mod types;

use chrono::{DateTime, Utc};
use std::time::Duration;

pub use errors::{QueueError, QueueErrorKind, QueueResult};
pub use in_memory::{DeliveryState, InMemoryWorkQueue};
pub use postgres::PgWorkQueue;
pub use traits::WorkQueue;
pub use types::{ConsumerId, DeliveryHandle, DeliveryOutcome, QueueStats, WorkItem};

/// Whether a delivery last heartbeated at `last_heartbeat` is orphaned at `now`.
///
/// Strictly older than the window counts as orphaned. A heartbeat in the
/// future (clock skew) never does.
pub fn is_orphaned(last_heartbeat: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    match (now - last_heartbeat).to_std() {
        Ok(elapsed) => elapsed > window,
        Err(_) => false,
    }
}
