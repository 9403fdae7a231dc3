//! Shared models
//!
//! Paging, lock and identity types used by the backing services and the
//! auto-cache decorators.

mod ids;
mod lock;
mod page;

// Re-export commonly used types
pub use ids::{CacheId, CacheModel, SlaveToMasterId, StorageId, UniquelyIdentifiable};
pub use lock::{Lock, SlaveLock, DEFAULT_LOCK_DURATION};
pub use page::{PageEnvelope, PageInfo};
