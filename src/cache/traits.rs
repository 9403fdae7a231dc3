//! Byte-store contracts.
//!
//! The auto-cache never talks to a concrete store; it goes through
//! [`DistributedCache`], a key/value byte store with TTL support, and
//! optionally a [`FlushCache`] capability for bulk clearing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CacheError, Result};

/// Expiration settings handed to the store with every write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheEntryOptions {
    /// Expire this long after the write
    pub absolute_expiration_relative_to_now: Option<Duration>,
    /// Expire when not accessed for this long
    pub sliding_expiration: Option<Duration>,
}

/// A key/value byte store with TTL support.
///
/// Implementations must be safe for concurrent use and must accept arbitrary
/// string keys and opaque payloads.
#[async_trait]
pub trait DistributedCache: Send + Sync {
    /// Returns the stored bytes, or None if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Vec<u8>, options: &CacheEntryOptions) -> Result<()>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// True if [`DistributedCache::flush`] physically clears the store.
    fn supports_flush(&self) -> bool {
        false
    }

    /// Removes every entry.
    async fn flush(&self) -> Result<()> {
        Err(CacheError::Unsupported(
            "this cache store cannot be flushed".to_string(),
        ))
    }
}

/// An explicitly supplied way of clearing every cached entry of a model.
#[async_trait]
pub trait FlushCache: Send + Sync {
    async fn flush(&self) -> Result<()>;
}

/// Adapts a flushable [`DistributedCache`] into a [`FlushCache`].
pub struct StoreFlush {
    cache: Arc<dyn DistributedCache>,
}

impl StoreFlush {
    /// Returns a flush delegate if the store can flush itself.
    pub fn for_store(cache: &Arc<dyn DistributedCache>) -> Option<Self> {
        if cache.supports_flush() {
            Some(Self {
                cache: Arc::clone(cache),
            })
        } else {
            None
        }
    }
}

#[async_trait]
impl FlushCache for StoreFlush {
    async fn flush(&self) -> Result<()> {
        self.cache.flush().await
    }
}
