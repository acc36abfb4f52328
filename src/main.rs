//! Query Cache - maintenance runner
//!
//! Opens the configured persistent cache, reports its size, and keeps it
//! within bounds by running eviction on a timer until shutdown.

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use query_cache::{spawn_eviction_task, CacheStore, Config};

/// Main entry point for the cache maintenance runner.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache store over the configured database
/// 4. Run one eviction pass and report stats
/// 5. Start background eviction task
/// 6. Wait for SIGINT/SIGTERM and stop the task
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber with env filter
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "query_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting query cache maintenance");

    // Load configuration from environment variables
    let config = Config::from_env();
    info!(
        "Configuration loaded: db={}, store={}, max_entries={}, max_size_bytes={}, eviction_interval={}s",
        config.db_path.display(),
        config.store_name,
        config.max_entries,
        config.max_size_bytes,
        config.eviction_interval
    );

    let cache = CacheStore::new(&config).context("invalid cache configuration")?;

    let removed = cache.run_eviction().await;
    let stats = cache.stats().await;
    info!(
        "Cache opened: {} entries, {} bytes, last access {} (startup eviction removed {})",
        stats.entry_count,
        stats.total_size,
        stats
            .newest_accessed_utc()
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "never".to_string()),
        removed
    );

    // Start background eviction task
    let eviction_handle = spawn_eviction_task(cache.clone(), config.eviction_interval);
    info!("Background eviction task started");

    shutdown_signal().await;

    eviction_handle.abort();
    warn!("Eviction task aborted");

    let stats = cache.stats().await;
    info!(
        "Shutdown complete: {} entries, {} bytes",
        stats.entry_count, stats.total_size
    );
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
