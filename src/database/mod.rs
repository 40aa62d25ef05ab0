//! # Database
//!
//! Pool creation for the store, queue and history connections, plus the
//! idempotent schema bootstrap for tables the profiler owns.

pub mod connection;
pub mod schema;

pub use connection::{connect, health_check};
