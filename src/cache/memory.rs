//! In-process [`DistributedCache`] implementation.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::{CacheEntryOptions, DistributedCache, MemoryStore, StoreStats};
use crate::config::Config;
use crate::error::{require_not_blank, Result};

/// A [`DistributedCache`] kept in process memory, supporting flush.
///
/// Cloning is cheap; clones share the same underlying store.
#[derive(Debug, Clone, Default)]
pub struct MemoryDistributedCache {
    store: Arc<RwLock<MemoryStore>>,
}

impl MemoryDistributedCache {
    /// Creates an empty cache with the default size limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty cache from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            store: Arc::new(RwLock::new(MemoryStore::new(config.max_value_size))),
        }
    }

    /// Shared handle to the underlying store, for the cleanup task.
    pub fn store(&self) -> Arc<RwLock<MemoryStore>> {
        Arc::clone(&self.store)
    }

    /// Current store statistics.
    pub async fn stats(&self) -> StoreStats {
        self.store.read().await.stats()
    }

    /// Number of physically present entries, expired or not.
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }
}

#[async_trait]
impl DistributedCache for MemoryDistributedCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        require_not_blank(key, "key")?;
        // Write lock: a read updates the sliding deadline and the stats
        Ok(self.store.write().await.get(key))
    }

    async fn set(&self, key: &str, value: Vec<u8>, options: &CacheEntryOptions) -> Result<()> {
        self.store.write().await.set(key, value, options)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        require_not_blank(key, "key")?;
        self.store.write().await.remove(key);
        Ok(())
    }

    fn supports_flush(&self) -> bool {
        true
    }

    async fn flush(&self) -> Result<()> {
        let removed = self.store.write().await.clear();
        debug!("Memory cache flushed, {} entries removed", removed);
        Ok(())
    }
}
