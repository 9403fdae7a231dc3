//! Auto-cache Module
//!
//! The caching engine and the CRUD decorators built on it.

mod crud;
mod engine;
mod many_to_one;
pub mod serializing;
mod slave_to_master;
mod stats;
pub mod strategy;


pub use crud::CrudAutoCache;
pub use engine::{
    cache_key_for_id, cache_key_for_page, children_collection_key, AutoCache, EvictionScope,
    GetIdFn, READ_ALL_CACHE_KEY,
};
pub use many_to_one::ManyToOneAutoCache;
pub use serializing::CacheEnvelope;
#[allow(deprecated)]
pub use slave_to_master::SlaveToMasterAutoCache;
pub use stats::AutoCacheStats;
pub use strategy::{
    CachedItemInformation, CachedValueKind, FixedStrategy, StrategyFn, UseCacheAtAll,
    UseCacheAtAllFn, UseCacheStrategy, UseCacheStrategyMethod,
};
