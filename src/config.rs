//! Configuration Module
//!
//! Handles loading the in-memory store configuration and the auto-cache
//! options from environment variables.

use std::env;
use std::time::Duration;

use crate::cache::CacheEntryOptions;

/// In-memory store configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Largest payload the in-memory store accepts, in bytes
    pub max_value_size: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 1)
    /// - `CACHE_MAX_VALUE_SIZE` - Maximum payload size in bytes (default: 1 MB)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cleanup_interval: env_parse("CACHE_CLEANUP_INTERVAL")
                .unwrap_or(defaults.cleanup_interval),
            max_value_size: env_parse("CACHE_MAX_VALUE_SIZE").unwrap_or(defaults.max_value_size),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cleanup_interval: 1,
            max_value_size: 1024 * 1024,
        }
    }
}

/// Options that decide how aggressively an auto-cache reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoCacheOptions {
    /// Entries older than this are evicted on read, and the store expires them too
    pub absolute_expiration_relative_to_now: Option<Duration>,
    /// Store-level sliding expiration
    pub sliding_expiration: Option<Duration>,
    /// After a write that did not return the item, always read it back and cache it
    pub save_all: bool,
    /// After a write that did not return the item, read it back only if it was already cached
    pub do_get_to_update: bool,
    /// Cache whole collections and their pages, not only the individual items
    pub save_collections: bool,
    /// Prefix for every physical store key, so several models can share one store.
    ///
    /// Item keys are the rendered ids and collection keys are fixed names, so
    /// without a namespace two models writing to one store can overwrite each
    /// other. Ids that render like a collection key are always rejected.
    pub key_namespace: Option<String>,
}

impl Default for AutoCacheOptions {
    fn default() -> Self {
        Self {
            absolute_expiration_relative_to_now: Some(Duration::from_secs(3600)),
            sliding_expiration: None,
            save_all: false,
            do_get_to_update: false,
            save_collections: false,
            key_namespace: None,
        }
    }
}

impl AutoCacheOptions {
    /// Creates options with the defaults (one hour absolute expiration).
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads options from environment variables.
    ///
    /// # Environment Variables
    /// - `AUTOCACHE_ABSOLUTE_EXPIRATION_SECS` - 0 disables it (default: 3600)
    /// - `AUTOCACHE_SLIDING_EXPIRATION_SECS` - 0 disables it (default: disabled)
    /// - `AUTOCACHE_SAVE_ALL` (default: false)
    /// - `AUTOCACHE_DO_GET_TO_UPDATE` (default: false)
    /// - `AUTOCACHE_SAVE_COLLECTIONS` (default: false)
    /// - `AUTOCACHE_KEY_NAMESPACE` (default: none)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            absolute_expiration_relative_to_now: match env_parse::<u64>(
                "AUTOCACHE_ABSOLUTE_EXPIRATION_SECS",
            ) {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.absolute_expiration_relative_to_now,
            },
            sliding_expiration: env_parse::<u64>("AUTOCACHE_SLIDING_EXPIRATION_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            save_all: env_parse("AUTOCACHE_SAVE_ALL").unwrap_or(defaults.save_all),
            do_get_to_update: env_parse("AUTOCACHE_DO_GET_TO_UPDATE")
                .unwrap_or(defaults.do_get_to_update),
            save_collections: env_parse("AUTOCACHE_SAVE_COLLECTIONS")
                .unwrap_or(defaults.save_collections),
            key_namespace: env::var("AUTOCACHE_KEY_NAMESPACE")
                .ok()
                .filter(|ns| !ns.trim().is_empty()),
        }
    }

    /// Sets the absolute expiration.
    pub fn with_absolute_expiration(mut self, expiration: Option<Duration>) -> Self {
        self.absolute_expiration_relative_to_now = expiration;
        self
    }

    /// Sets the sliding expiration.
    pub fn with_sliding_expiration(mut self, expiration: Option<Duration>) -> Self {
        self.sliding_expiration = expiration;
        self
    }

    /// Enables or disables read-back after every write.
    pub fn with_save_all(mut self, enabled: bool) -> Self {
        self.save_all = enabled;
        self
    }

    /// Enables or disables read-back of already cached items after a write.
    pub fn with_do_get_to_update(mut self, enabled: bool) -> Self {
        self.do_get_to_update = enabled;
        self
    }

    /// Enables or disables caching of whole collections.
    pub fn with_save_collections(mut self, enabled: bool) -> Self {
        self.save_collections = enabled;
        self
    }

    /// Sets the physical key namespace.
    pub fn with_key_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.key_namespace = Some(namespace.into());
        self
    }

    /// Entry options handed to the byte store on every write.
    pub fn entry_options(&self) -> CacheEntryOptions {
        CacheEntryOptions {
            absolute_expiration_relative_to_now: self.absolute_expiration_relative_to_now,
            sliding_expiration: self.sliding_expiration,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.cleanup_interval, 1);
        assert_eq!(config.max_value_size, 1024 * 1024);
    }

    #[test]
    fn test_config_from_env_defaults() {
        env::remove_var("CACHE_CLEANUP_INTERVAL");
        env::remove_var("CACHE_MAX_VALUE_SIZE");

        let config = Config::from_env();
        assert_eq!(config.cleanup_interval, 1);
        assert_eq!(config.max_value_size, 1024 * 1024);
    }

    #[test]
    fn test_options_default() {
        let options = AutoCacheOptions::default();
        assert_eq!(
            options.absolute_expiration_relative_to_now,
            Some(Duration::from_secs(3600))
        );
        assert!(options.sliding_expiration.is_none());
        assert!(!options.save_all);
        assert!(!options.do_get_to_update);
        assert!(!options.save_collections);
        assert!(options.key_namespace.is_none());
    }

    #[test]
    fn test_options_builders() {
        let options = AutoCacheOptions::new()
            .with_absolute_expiration(None)
            .with_sliding_expiration(Some(Duration::from_secs(5)))
            .with_save_all(true)
            .with_do_get_to_update(true)
            .with_save_collections(true)
            .with_key_namespace("widgets");

        assert!(options.absolute_expiration_relative_to_now.is_none());
        assert!(options.save_all && options.do_get_to_update && options.save_collections);
        assert_eq!(options.key_namespace.as_deref(), Some("widgets"));

        let entry = options.entry_options();
        assert!(entry.absolute_expiration_relative_to_now.is_none());
        assert_eq!(entry.sliding_expiration, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_options_from_env() {
        env::set_var("AUTOCACHE_ABSOLUTE_EXPIRATION_SECS", "0");
        env::set_var("AUTOCACHE_SAVE_COLLECTIONS", "true");
        env::remove_var("AUTOCACHE_SLIDING_EXPIRATION_SECS");
        env::remove_var("AUTOCACHE_SAVE_ALL");
        env::remove_var("AUTOCACHE_DO_GET_TO_UPDATE");
        env::remove_var("AUTOCACHE_KEY_NAMESPACE");

        let options = AutoCacheOptions::from_env();
        assert!(options.absolute_expiration_relative_to_now.is_none());
        assert!(options.save_collections);
        assert!(!options.save_all);

        env::remove_var("AUTOCACHE_ABSOLUTE_EXPIRATION_SECS");
        env::remove_var("AUTOCACHE_SAVE_COLLECTIONS");
    }
}
