//! Memory Store Module
//!
//! Synchronous byte-store engine: HashMap storage with lazy and periodic
//! expiration. Wrapped by [`MemoryDistributedCache`](crate::cache::MemoryDistributedCache)
//! for async, shared use.

use std::collections::HashMap;

use crate::cache::{CacheEntry, CacheEntryOptions, StoreStats, MAX_VALUE_SIZE};
use crate::error::{require_not_blank, CacheError, Result};

// == Memory Store ==
/// Key/value byte storage with absolute and sliding expiration.
#[derive(Debug)]
pub struct MemoryStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Performance statistics
    stats: StoreStats,
    /// Largest payload accepted, in bytes
    max_value_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MAX_VALUE_SIZE)
    }
}

impl MemoryStore {
    // == Constructor ==
    /// Creates an empty store that rejects payloads larger than `max_value_size`.
    pub fn new(max_value_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            stats: StoreStats::new(),
            max_value_size,
        }
    }

    // == Set ==
    /// Stores `value` under `key`, replacing any previous value and resetting
    /// its expiration.
    pub fn set(&mut self, key: &str, value: Vec<u8>, options: &CacheEntryOptions) -> Result<()> {
        require_not_blank(key, "key")?;

        if value.len() > self.max_value_size {
            return Err(CacheError::Store(format!(
                "Value for key {} exceeds maximum size of {} bytes",
                key, self.max_value_size
            )));
        }

        self.entries
            .insert(key.to_string(), CacheEntry::new(value, options));
        self.stats.set_total_entries(self.entries.len());
        Ok(())
    }

    // == Get ==
    /// Returns a copy of the bytes stored under `key`.
    ///
    /// Expired entries are removed and counted as misses. A hit pushes the
    /// sliding deadline forward.
    pub fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        match self.entries.get_mut(key) {
            None => {
                self.stats.record_miss();
                return None;
            }
            Some(entry) if !entry.is_expired() => {
                entry.touch();
                let value = entry.value.clone();
                self.stats.record_hit();
                return Some(value);
            }
            Some(_) => {}
        }

        // Expired: drop it now instead of waiting for the cleanup task
        self.entries.remove(key);
        self.stats.record_expirations(1);
        self.stats.set_total_entries(self.entries.len());
        self.stats.record_miss();
        None
    }

    // == Remove ==
    /// Removes `key`, returning true if something was removed.
    pub fn remove(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        self.stats.set_total_entries(self.entries.len());
        removed
    }

    // == Clear ==
    /// Removes every entry, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.stats.set_total_entries(0);
        count
    }

    // == Stats ==
    /// Returns current store statistics.
    pub fn stats(&self) -> StoreStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, returning how many were removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let count = before - self.entries.len();

        self.stats.record_expirations(count);
        self.stats.set_total_entries(self.entries.len());
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    fn ttl_ms(ms: u64) -> CacheEntryOptions {
        CacheEntryOptions {
            absolute_expiration_relative_to_now: Some(Duration::from_millis(ms)),
            sliding_expiration: None,
        }
    }

    #[test]
    fn test_store_new() {
        let store = MemoryStore::default();
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = MemoryStore::default();

        store.set("key1", b"value1".to_vec(), &CacheEntryOptions::default()).unwrap();

        assert_eq!(store.get("key1"), Some(b"value1".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store = MemoryStore::default();
        assert!(store.get("nonexistent").is_none());
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_store_remove() {
        let mut store = MemoryStore::default();

        store.set("key1", b"value1".to_vec(), &CacheEntryOptions::default()).unwrap();

        assert!(store.remove("key1"));
        assert!(!store.remove("key1"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_overwrite() {
        let mut store = MemoryStore::default();

        store.set("key1", b"value1".to_vec(), &CacheEntryOptions::default()).unwrap();
        store.set("key1", b"value2".to_vec(), &CacheEntryOptions::default()).unwrap();

        assert_eq!(store.get("key1"), Some(b"value2".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_ttl_expiration() {
        let mut store = MemoryStore::default();

        store.set("key1", b"value1".to_vec(), &ttl_ms(100)).unwrap();
        assert_eq!(store.len(), 1);

        sleep(Duration::from_millis(150));

        assert!(store.get("key1").is_none());
        assert_eq!(store.stats().expirations, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_clear() {
        let mut store = MemoryStore::default();
        store.set("a", vec![1], &CacheEntryOptions::default()).unwrap();
        store.set("b", vec![2], &CacheEntryOptions::default()).unwrap();

        assert_eq!(store.clear(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_stats() {
        let mut store = MemoryStore::default();

        store.set("key1", b"value1".to_vec(), &CacheEntryOptions::default()).unwrap();
        store.get("key1").unwrap();
        let _ = store.get("nonexistent");

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
    }

    #[test]
    fn test_store_cleanup_expired() {
        let mut store = MemoryStore::default();

        store.set("key1", b"value1".to_vec(), &ttl_ms(100)).unwrap();
        store.set("key2", b"value2".to_vec(), &ttl_ms(10_000)).unwrap();

        sleep(Duration::from_millis(150));

        assert_eq!(store.cleanup_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("key2").is_some());
    }

    #[test]
    fn test_store_blank_key_is_contract_violation() {
        let mut store = MemoryStore::default();
        let result = store.set(" ", b"v".to_vec(), &CacheEntryOptions::default());
        assert!(matches!(result, Err(CacheError::Contract(_))));
    }

    #[test]
    fn test_store_value_too_large() {
        let mut store = MemoryStore::new(4);
        let result = store.set("key", b"too large".to_vec(), &CacheEntryOptions::default());
        assert!(matches!(result, Err(CacheError::Store(_))));
    }
}
