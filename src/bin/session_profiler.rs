//! # Session Profiler Service
//!
//! Runs the profiling pipeline until Ctrl+C or SIGTERM.
//!
//! ## Usage
//!
//! ```bash
//! # Run with config/profiler.yaml
//! cargo run --bin session-profiler
//!
//! # Run with a specific file and an overridden store URL
//! PROFILER_CONFIG_PATH=/etc/profiler.yaml \
//! PROFILER_CONNECTIONS__STORE__URL=postgresql://store/priorities \
//!   cargo run --bin session-profiler
//! ```

use anyhow::Context;
use std::process;
use tokio::signal;
use tracing::{error, info, warn};

use session_profiler::config::{ConfigManager, ConfigurationError};
use session_profiler::logging;
use session_profiler::orchestration::ProfilerSystem;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_structured_logging();

    info!("🚀 Starting Session Profiler...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match ConfigManager::load() {
        Ok(config) => config,
        Err(ConfigurationError::Validation { issues }) => {
            for issue in &issues {
                error!(field = %issue.field, "Invalid configuration: {}", issue.message);
            }
            error!(count = issues.len(), "Refusing to start with invalid configuration");
            process::exit(1);
        }
        Err(e) => return Err(e).context("Failed to load profiler configuration"),
    };

    info!(
        environment = %config.environment(),
        source = %config.source(),
        rule_count = config.rules().len(),
        "Loaded profiling rules:\n{}",
        config.rules()
    );
    if config.rules().is_empty() {
        warn!("No profiling rules configured; every session will be classified as unknown");
    }

    let mut system = ProfilerSystem::bootstrap(config)
        .await
        .context("Failed to bootstrap profiler")?;
    system.start();

    info!("🎉 Session Profiler started. Press Ctrl+C to shutdown gracefully");

    shutdown_signal().await?;

    info!("🛑 Shutdown signal received, draining in-flight sessions...");
    system.shutdown().await;
    info!("👋 Session Profiler shutdown complete");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received Ctrl+C");
            },
            _ = terminate.recv() => {
                info!("Received SIGTERM");
            },
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
