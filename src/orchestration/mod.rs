//! # Orchestration
//!
//! Runtime wiring of the profiling pipeline:
//!
//! - [`SessionConsumer`]: fetches sessions, classifies them and resolves each delivery
//! - [`OrphanReclaimer`]: returns deliveries with a lapsed heartbeat to the queue
//! - [`error_router`]: logs queue infrastructure errors by category
//! - [`ProfilerSystem`]: builds and supervises all of the above

pub mod bootstrap;
pub mod error_router;
pub mod reclaimer;
pub mod session_consumer;

pub use bootstrap::{ProfilerComponents, ProfilerSystem, SystemStatus};
pub use error_router::{error_channel, QueueErrorReceiver, QueueErrorSender, Severity};
pub use reclaimer::{OrphanReclaimer, ReclaimerStats};
pub use session_consumer::{ConsumerHandles, ConsumerSettings, ConsumerStats, SessionConsumer};
