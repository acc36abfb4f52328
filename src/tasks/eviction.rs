//! Eviction Task
//!
//! Background task that periodically runs an eviction pass over the cache.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;

/// Spawns a background task that periodically runs eviction.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between passes. Passes never fail; storage errors degrade to a pass that
/// removes nothing.
///
/// # Arguments
/// * `cache` - The cache store to trim (clones share one connection)
/// * `interval_secs` - Interval in seconds between eviction passes
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let cache = CacheStore::new(&config)?;
/// let eviction_handle = spawn_eviction_task(cache.clone(), 60);
/// // Later, during shutdown:
/// eviction_handle.abort();
/// ```
pub fn spawn_eviction_task(cache: CacheStore, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting eviction task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.run_eviction().await;

            if removed > 0 {
                info!("Eviction task: removed {} entries", removed);
            } else {
                debug!("Eviction task: nothing to remove");
            }
        }
    })
}
