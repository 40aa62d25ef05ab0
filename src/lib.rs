#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Session Profiler
//!
//! Queue-driven service assigning a coarse priority tier (`high`, `low` or
//! `unknown`) to browsing sessions from their recent request history.
//!
//! ## Overview
//!
//! Session ids arrive on a work queue. For each one the profiler reads the
//! session's requests over a trailing window, evaluates them against an
//! ordered rule set and persists the resulting [`Priority`] with a bounded
//! lifetime, where an admission-control layer can pick it up.
//!
//! Processing is at-least-once: every delivery is acknowledged, rejected, or
//! left for the [`orchestration::OrphanReclaimer`] to return to the queue.
//!
//! ## Module Organization
//!
//! - [`profiling`] - Rule set and the rule engine
//! - [`history`] - Session request history sources
//! - [`store`] - Priority persistence with TTL
//! - [`audit`] - Fire-and-forget classification audit trail
//! - [`messaging`] - Work queue abstraction with PostgreSQL and in-memory providers
//! - [`orchestration`] - Consumer, reclaimer, error routing and bootstrap
//! - [`config`] - YAML configuration with environment overrides
//! - [`database`] - Connection pools and table setup
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use session_profiler::config::ConfigManager;
//! use session_profiler::orchestration::ProfilerSystem;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?;
//! let mut system = ProfilerSystem::bootstrap(config).await?;
//! system.start();
//!
//! tokio::signal::ctrl_c().await?;
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod history;
pub mod logging;
pub mod messaging;
pub mod orchestration;
pub mod priority;
pub mod profiling;
pub mod store;

pub use config::{ConfigManager, ConfigurationError, ProfilerConfig};
pub use error::{ProfilerError, ProfilerResult};
pub use history::{HistorySource, SessionRequestEvent};
pub use messaging::{DeliveryOutcome, WorkItem, WorkQueue};
pub use orchestration::ProfilerSystem;
pub use priority::Priority;
pub use profiling::{ClassificationResult, Rule, RuleSet, SessionProfiler};
pub use store::PriorityStore;
