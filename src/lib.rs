//! Crud AutoCache - Read-through and write-through caching for CRUD services
//!
//! Decorates a backing CRUD service with a cache kept in any key/value byte
//! store. Values are wrapped in generation-stamped envelopes so a flush can
//! invalidate everything at once, and collections are populated in the
//! background, one job per key at a time.

pub mod autocache;
pub mod cache;
pub mod config;
pub mod crud;
pub mod error;
pub mod models;
pub mod tasks;

#[allow(deprecated)]
pub use autocache::SlaveToMasterAutoCache;
pub use autocache::{AutoCache, AutoCacheStats, CrudAutoCache, ManyToOneAutoCache};
pub use cache::{DistributedCache, MemoryDistributedCache};
pub use config::{AutoCacheOptions, Config};
pub use crud::{Crud, CrudManyToOne, CrudMemory, CrudSlaveToMaster};
pub use error::{CacheError, Result};
pub use tasks::spawn_cleanup_task;
