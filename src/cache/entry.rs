//! Cache Entry Module
//!
//! Defines the structure for individual byte-store entries with absolute and
//! sliding expiration.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::cache::CacheEntryOptions;

// == Cache Entry ==
/// Represents a single stored payload with expiration metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored bytes
    pub value: Vec<u8>,
    /// Absolute expiration timestamp (Unix milliseconds), None = no absolute expiration
    pub expires_at: Option<u64>,
    /// Sliding window in milliseconds, None = no sliding expiration
    pub sliding_ms: Option<u64>,
    /// Last read or write (Unix milliseconds)
    pub last_access: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry honouring the absolute and sliding expirations in `options`.
    pub fn new(value: Vec<u8>, options: &CacheEntryOptions) -> Self {
        let now = current_timestamp_ms();
        let expires_at = options
            .absolute_expiration_relative_to_now
            .map(|ttl| now + ttl.as_millis() as u64);
        let sliding_ms = options.sliding_expiration.map(|s| s.as_millis() as u64);

        Self {
            value,
            expires_at,
            sliding_ms,
            last_access: now,
        }
    }

    // == Deadline ==
    /// Earliest moment at which the entry expires, if any.
    pub fn deadline_ms(&self) -> Option<u64> {
        let sliding_deadline = self.sliding_ms.map(|s| self.last_access + s);
        match (self.expires_at, sliding_deadline) {
            (Some(a), Some(s)) => Some(a.min(s)),
            (a, s) => a.or(s),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time is greater than or equal to
    /// its deadline.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    fn is_expired_at(&self, now: u64) -> bool {
        match self.deadline_ms() {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    // == Touch ==
    /// Records an access, pushing the sliding deadline forward.
    pub fn touch(&mut self) {
        self.last_access = current_timestamp_ms();
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    fn options(absolute: Option<u64>, sliding: Option<u64>) -> CacheEntryOptions {
        CacheEntryOptions {
            absolute_expiration_relative_to_now: absolute.map(Duration::from_millis),
            sliding_expiration: sliding.map(Duration::from_millis),
        }
    }

    #[test]
    fn test_entry_without_expiration() {
        let entry = CacheEntry::new(b"v".to_vec(), &options(None, None));

        assert_eq!(entry.value, b"v");
        assert!(entry.deadline_ms().is_none());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_absolute_expiration() {
        let entry = CacheEntry::new(b"v".to_vec(), &options(Some(100), None));
        assert!(!entry.is_expired());

        sleep(Duration::from_millis(150));

        assert!(entry.is_expired());
        assert!(entry.deadline_ms().unwrap() <= current_timestamp_ms());
    }

    #[test]
    fn test_touch_extends_sliding_window() {
        let mut entry = CacheEntry::new(b"v".to_vec(), &options(None, Some(200)));

        sleep(Duration::from_millis(120));
        entry.touch();
        sleep(Duration::from_millis(120));

        // 240ms since creation, but only 120ms since the last access
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_absolute_caps_sliding() {
        let mut entry = CacheEntry::new(b"v".to_vec(), &options(Some(100), Some(10_000)));
        entry.touch();
        let deadline = entry.deadline_ms().unwrap();
        assert_eq!(deadline, entry.expires_at.unwrap());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = current_timestamp_ms();
        let entry = CacheEntry {
            value: Vec::new(),
            expires_at: Some(now),
            sliding_ms: None,
            last_access: now,
        };

        assert!(entry.is_expired_at(now), "Entry should be expired at boundary");
        assert!(!entry.is_expired_at(now - 1));
    }
}
