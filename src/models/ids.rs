//! Identity types and the bounds the cache puts on models and ids.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Anything the auto-cache can store: serializable, cloneable and shareable
/// across background tasks.
pub trait CacheModel: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheModel for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Anything usable as an item id. The cache key of an item is its id's
/// `Display` output.
pub trait CacheId: Clone + fmt::Display + Send + Sync + 'static {}

impl<T> CacheId for T where T: Clone + fmt::Display + Send + Sync + 'static {}

/// A model that knows its own id.
pub trait UniquelyIdentifiable<Id> {
    fn id(&self) -> Id;
    fn set_id(&mut self, id: Id);
}

/// Ids the in-memory services can mint on their own.
pub trait StorageId: CacheId + Ord + Hash + Eq {
    fn generate() -> Self;
}

static NEXT_NUMERIC_ID: AtomicI64 = AtomicI64::new(1);

fn next_numeric_id() -> i64 {
    NEXT_NUMERIC_ID.fetch_add(1, Ordering::Relaxed)
}

impl StorageId for Uuid {
    fn generate() -> Self {
        Uuid::new_v4()
    }
}

impl StorageId for String {
    fn generate() -> Self {
        Uuid::new_v4().to_string()
    }
}

impl StorageId for i64 {
    fn generate() -> Self {
        next_numeric_id()
    }
}

impl StorageId for u64 {
    fn generate() -> Self {
        next_numeric_id() as u64
    }
}

impl StorageId for i32 {
    fn generate() -> Self {
        // Wraps only after two billion ids in one process
        (next_numeric_id() % i32::MAX as i64) as i32
    }
}

/// Composite id of an item that only exists under a master item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlaveToMasterId<Id> {
    pub master_id: Id,
    pub slave_id: Id,
}

impl<Id> SlaveToMasterId<Id> {
    pub fn new(master_id: Id, slave_id: Id) -> Self {
        Self {
            master_id,
            slave_id,
        }
    }
}

impl<Id: fmt::Display> fmt::Display for SlaveToMasterId<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.master_id, self.slave_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slave_to_master_id_display() {
        let id = SlaveToMasterId::new(7, 42);
        assert_eq!(id.to_string(), "7/42");
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = i64::generate();
        let b = i64::generate();
        assert_ne!(a, b);
        assert_ne!(String::generate(), String::generate());
    }
}
