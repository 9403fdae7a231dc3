//! Integration Tests for CrudAutoCache
//!
//! Drives the decorator over an in-memory backing service and an in-memory
//! byte store, checking what reached the service and what sits in the store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crud_autocache::autocache::{FixedStrategy, UseCacheStrategy, READ_ALL_CACHE_KEY};
use crud_autocache::cache::CacheEntryOptions;
use crud_autocache::models::UniquelyIdentifiable;
use crud_autocache::{
    AutoCache, AutoCacheOptions, CacheError, Crud, CrudAutoCache, CrudMemory, DistributedCache,
    MemoryDistributedCache, Result,
};

// == Helper Types ==

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Widget {
    id: i64,
    name: String,
}

impl UniquelyIdentifiable<i64> for Widget {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

fn widget(id: i64, name: &str) -> Widget {
    Widget {
        id,
        name: name.to_string(),
    }
}

type WidgetStorage = CrudMemory<Widget, Widget, i64>;

fn setup(options: AutoCacheOptions) -> (CrudAutoCache<Widget, Widget, i64>, Arc<WidgetStorage>, MemoryDistributedCache) {
    let storage = Arc::new(CrudMemory::new());
    let store = MemoryDistributedCache::new();
    let widgets = CrudAutoCache::for_identifiable(storage.clone(), Arc::new(store.clone()), options);
    (widgets, storage, store)
}

/// Byte store that holds writes of the root collection until released.
struct GatedCache {
    inner: MemoryDistributedCache,
    gate: Arc<Semaphore>,
    collection_writes: AtomicUsize,
}

#[async_trait]
impl DistributedCache for GatedCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, options: &CacheEntryOptions) -> Result<()> {
        if key == READ_ALL_CACHE_KEY {
            self.collection_writes.fetch_add(1, Ordering::SeqCst);
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| CacheError::Store(e.to_string()))?;
        }
        self.inner.set(key, value, options).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }
}

// == Read-through ==

#[tokio::test]
async fn test_read_after_create_never_reaches_service() {
    let (widgets, storage, _) = setup(AutoCacheOptions::default());

    let mut created = Vec::new();
    for name in ["A", "B", "C", "D"] {
        created.push(widgets.create_and_return(widget(0, name)).await.unwrap());
    }
    for expected in &created {
        let read = widgets.read(&expected.id).await.unwrap();
        assert_eq!(read.as_ref(), Some(expected));
    }

    assert_eq!(storage.stats().reads, 0);
    assert_eq!(widgets.cache().stats().hits, created.len() as u64);
}

#[tokio::test]
async fn test_read_all_limit_monotonicity() {
    let (widgets, storage, _) = setup(AutoCacheOptions::default().with_save_collections(true));
    for name in ["A", "B", "C", "D", "E"] {
        storage.create(widget(0, name)).await.unwrap();
    }

    let three = widgets.read_all(3).await.unwrap();
    widgets
        .cache()
        .delay_until_no_operation_active(READ_ALL_CACHE_KEY)
        .await;

    // Smaller limit served from the cache, truncated
    assert_eq!(widgets.read_all(2).await.unwrap(), three[..2].to_vec());
    assert_eq!(storage.stats().collection_reads, 1);

    // Larger limit must go to the service
    assert_eq!(widgets.read_all(5).await.unwrap().len(), 5);
    assert_eq!(storage.stats().collection_reads, 2);
}

// == Generation invalidation ==

#[tokio::test]
async fn test_flush_without_delegate_forces_refetch() {
    let storage: Arc<WidgetStorage> = Arc::new(CrudMemory::new());
    let store = MemoryDistributedCache::new();
    let cache = AutoCache::for_identifiable(Arc::new(store.clone()), AutoCacheOptions::default())
        .without_flush_delegate();
    let widgets = CrudAutoCache::new(storage.clone(), cache);

    let created = widgets.create_and_return(widget(0, "A")).await.unwrap();
    widgets.cache().flush().await.unwrap();

    // The old envelope is still physically present
    assert!(store.get(&created.id.to_string()).await.unwrap().is_some());

    let read = widgets.read(&created.id).await.unwrap();
    assert_eq!(read, Some(created));
    assert_eq!(storage.stats().reads, 1);
}

// == Single-flight ==

#[tokio::test]
async fn test_concurrent_read_all_starts_one_population() {
    let storage: Arc<WidgetStorage> = Arc::new(CrudMemory::new());
    for name in ["A", "B"] {
        storage.create(widget(0, name)).await.unwrap();
    }
    let gate = Arc::new(Semaphore::new(0));
    let store = Arc::new(GatedCache {
        inner: MemoryDistributedCache::new(),
        gate: gate.clone(),
        collection_writes: AtomicUsize::new(0),
    });
    let options = AutoCacheOptions::default().with_save_collections(true);
    let widgets = CrudAutoCache::for_identifiable(storage.clone(), store.clone(), options);

    let (first, second) = tokio::join!(widgets.read_all(10), widgets.read_all(10));
    assert_eq!(first.unwrap().len(), 2);
    assert_eq!(second.unwrap().len(), 2);

    let stats = widgets.cache().stats();
    assert_eq!(stats.background_started, 1);
    assert_eq!(stats.background_skipped, 1);
    assert!(widgets.cache().is_collection_operation_active(READ_ALL_CACHE_KEY));

    gate.add_permits(10);
    widgets
        .cache()
        .delay_until_no_operation_active(READ_ALL_CACHE_KEY)
        .await;

    assert_eq!(store.collection_writes.load(Ordering::SeqCst), 1);
    assert_eq!(widgets.read_all(10).await.unwrap().len(), 2);
    assert_eq!(storage.stats().collection_reads, 2);
}

// == Strategy override ==

#[tokio::test]
async fn test_ignore_strategy_always_reads_service() {
    let storage: Arc<WidgetStorage> = Arc::new(CrudMemory::new());
    let store = MemoryDistributedCache::new();
    let cache = AutoCache::for_identifiable(Arc::new(store.clone()), AutoCacheOptions::default())
        .with_use_cache_strategy(Arc::new(FixedStrategy(UseCacheStrategy::Ignore)));
    let widgets = CrudAutoCache::new(storage.clone(), cache);

    let created = widgets.create_and_return(widget(0, "A")).await.unwrap();
    for _ in 0..3 {
        assert_eq!(widgets.read(&created.id).await.unwrap(), Some(created.clone()));
    }

    assert_eq!(storage.stats().reads, 3);
    assert_eq!(widgets.cache().stats().ignored, 3);
    assert!(store.get(&created.id.to_string()).await.unwrap().is_some());
}

// == End-to-end ==

#[tokio::test]
async fn test_widget_scenario() {
    let expiration = Duration::from_millis(300);
    let (widgets, storage, store) =
        setup(AutoCacheOptions::default().with_absolute_expiration(Some(expiration)));

    // (a) cached under its id
    let created = widgets
        .create_with_specified_id_and_return(&1_000_001, widget(1_000_001, "A"))
        .await
        .unwrap();
    assert!(store.get("1000001").await.unwrap().is_some());

    // (b) served from the cache
    assert_eq!(widgets.read(&1_000_001).await.unwrap(), Some(created.clone()));
    assert_eq!(storage.stats().reads, 0);

    // (c) expired, read through and cached again
    tokio::time::sleep(expiration + Duration::from_millis(100)).await;
    assert_eq!(widgets.read(&1_000_001).await.unwrap(), Some(created));
    assert_eq!(storage.stats().reads, 1);
    assert!(store.get("1000001").await.unwrap().is_some());

    // (d) gone from both
    widgets.delete(&1_000_001).await.unwrap();
    assert!(storage.read(&1_000_001).await.unwrap().is_none());
    assert!(store.get("1000001").await.unwrap().is_none());
}
