//! Cache Module
//!
//! The key/value byte-store side of the library: the [`DistributedCache`]
//! contract the auto-cache is written against, and an in-memory
//! implementation with absolute and sliding expiration.

mod entry;
mod memory;
mod stats;
mod store;
mod traits;

// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use memory::MemoryDistributedCache;
pub use stats::StoreStats;
pub use store::MemoryStore;
pub use traits::{CacheEntryOptions, DistributedCache, FlushCache, StoreFlush};

// == Public Constants ==
/// Default maximum value size in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB
