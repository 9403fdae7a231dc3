//! TTL Cleanup Task
//!
//! Background task that periodically purges expired entries from the
//! in-memory byte store. Reads already skip expired entries; this keeps
//! entries that are never read again from piling up.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::MemoryStore;

/// Spawns a background task that periodically removes expired entries.
///
/// # Arguments
/// * `store` - Shared store, see [`MemoryDistributedCache::store`](crate::cache::MemoryDistributedCache::store)
/// * `cleanup_interval_secs` - Interval in seconds between cleanup runs
///
/// # Returns
/// A JoinHandle for the spawned task; abort it during shutdown.
///
/// # Example
/// ```ignore
/// let cache = MemoryDistributedCache::new();
/// let cleanup_handle = spawn_cleanup_task(cache.store(), 1);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(
    store: Arc<RwLock<MemoryStore>>,
    cleanup_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = {
                let mut store_guard = store.write().await;
                store_guard.cleanup_expired()
            };

            if removed > 0 {
                info!("TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}
