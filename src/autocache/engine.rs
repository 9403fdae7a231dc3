//! AutoCache Engine
//!
//! Read-through / write-through caching of one model type on top of any
//! [`DistributedCache`]. Single items are cached under their id, bounded
//! collections under a collection key, and pages under
//! `"{prefix}-{offset}-{limit}"`. Collection and page population runs in the
//! background, at most one job per key at a time.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::autocache::serializing::{self, CacheEnvelope};
use crate::autocache::stats::{AutoCacheStats, StatsCounters};
use crate::autocache::strategy::{
    CachedItemInformation, CachedValueKind, UseCacheAtAll, UseCacheStrategy,
    UseCacheStrategyMethod,
};
use crate::cache::{CacheEntryOptions, DistributedCache, FlushCache, StoreFlush};
use crate::config::AutoCacheOptions;
use crate::error::{require, require_not_blank, Result};
use crate::models::{CacheId, CacheModel, PageEnvelope, PageInfo, UniquelyIdentifiable};
use crate::tasks::fire_and_forget;

/// Collection key for "all items" of a model.
pub const READ_ALL_CACHE_KEY: &str = "ReadAllCacheKey";

const CHILDREN_KEY_PREFIX: &str = "childrenOf-";

/// Extracts the id of a model.
pub type GetIdFn<M, Id> = Arc<dyn Fn(&M) -> Id + Send + Sync>;

// == Keys ==
/// Cache key of a single item.
///
/// Items share the key space with the built-in collections, so an id that
/// renders as `ReadAllCacheKey...` or `childrenOf-...` is rejected.
pub fn cache_key_for_id<Id: fmt::Display>(id: &Id) -> Result<String> {
    let key = id.to_string();
    require_not_blank(&key, "id")?;
    require(
        !key.starts_with(READ_ALL_CACHE_KEY) && !key.starts_with(CHILDREN_KEY_PREFIX),
        || format!("Id {} collides with a collection cache key", key),
    )?;
    Ok(key)
}

/// Cache key of one page of a collection.
pub fn cache_key_for_page(prefix: &str, offset: usize, limit: usize) -> String {
    format!("{}-{}-{}", prefix, offset, limit)
}

/// Collection key for the children of `parent_id`.
pub fn children_collection_key<P: fmt::Display + ?Sized>(parent_id: &P) -> String {
    format!("{}{}", CHILDREN_KEY_PREFIX, parent_id)
}

fn new_generation_id() -> String {
    Uuid::new_v4().to_string()
}

/// What a collection eviction removes besides the collection entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionScope {
    /// The cached array, its pages and its recorded limit
    CollectionOnly,
    /// Also every individual item found in the cached array or pages
    CollectionAndItems,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Set,
    Remove,
}

// == Active Key ==
/// Claim on a key in one of the in-flight sets, released on drop.
struct ActiveKey {
    keys: Arc<DashSet<String>>,
    key: String,
}

impl ActiveKey {
    fn claim(keys: &Arc<DashSet<String>>, key: &str) -> Option<Self> {
        if keys.insert(key.to_string()) {
            Some(Self {
                keys: Arc::clone(keys),
                key: key.to_string(),
            })
        } else {
            None
        }
    }
}

impl Drop for ActiveKey {
    fn drop(&mut self) {
        self.keys.remove(&self.key);
    }
}

fn collect_all(results: Vec<Result<()>>) -> Result<()> {
    results.into_iter().collect()
}

// == Core ==
struct CacheCore<M, Id> {
    cache: Arc<dyn DistributedCache>,
    get_id: GetIdFn<M, Id>,
    options: AutoCacheOptions,
    entry_options: CacheEntryOptions,
    /// Envelopes written under any other generation are treated as absent
    generation: ArcSwap<String>,
    /// Collection keys with a background population or eviction running
    collection_operations: Arc<DashSet<String>>,
    /// Page keys with a background population or eviction running
    active_pages: Arc<DashSet<String>>,
    /// Limit each cached collection was fetched with
    collection_limits: DashMap<String, usize>,
    /// Page keys written under each collection prefix
    collection_pages: DashMap<String, HashSet<String>>,
    stats: StatsCounters,
}

// == Auto Cache ==
/// The caching engine behind the CRUD decorators.
///
/// Cloning is cheap and clones share all state, which is how background
/// jobs keep working after the caller has returned.
pub struct AutoCache<M, Id> {
    core: Arc<CacheCore<M, Id>>,
    flush_delegate: Option<Arc<dyn FlushCache>>,
    use_cache_strategy: Option<Arc<dyn UseCacheStrategyMethod<Id>>>,
    use_cache_at_all: Option<Arc<dyn UseCacheAtAll>>,
}

impl<M, Id> Clone for AutoCache<M, Id> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            flush_delegate: self.flush_delegate.clone(),
            use_cache_strategy: self.use_cache_strategy.clone(),
            use_cache_at_all: self.use_cache_at_all.clone(),
        }
    }
}

impl<M, Id> fmt::Debug for AutoCache<M, Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoCache")
            .field("generation", &self.core.generation.load().as_str())
            .field("options", &self.core.options)
            .field("flushable", &self.flush_delegate.is_some())
            .finish()
    }
}

impl<M: CacheModel, Id: CacheId> AutoCache<M, Id> {
    // == Constructors ==
    /// Creates an engine over `cache`, using `get_id` to find the id of an item.
    ///
    /// If the store can flush itself, flushing this engine flushes the store.
    pub fn new<F>(cache: Arc<dyn DistributedCache>, get_id: F, options: AutoCacheOptions) -> Self
    where
        F: Fn(&M) -> Id + Send + Sync + 'static,
    {
        let flush_delegate =
            StoreFlush::for_store(&cache).map(|flush| Arc::new(flush) as Arc<dyn FlushCache>);
        let entry_options = options.entry_options();

        Self {
            core: Arc::new(CacheCore {
                cache,
                get_id: Arc::new(get_id),
                options,
                entry_options,
                generation: ArcSwap::from_pointee(new_generation_id()),
                collection_operations: Arc::new(DashSet::new()),
                active_pages: Arc::new(DashSet::new()),
                collection_limits: DashMap::new(),
                collection_pages: DashMap::new(),
                stats: StatsCounters::default(),
            }),
            flush_delegate,
            use_cache_strategy: None,
            use_cache_at_all: None,
        }
    }

    /// Creates an engine for a model that knows its own id.
    pub fn for_identifiable(cache: Arc<dyn DistributedCache>, options: AutoCacheOptions) -> Self
    where
        M: UniquelyIdentifiable<Id>,
    {
        Self::new(cache, |item: &M| item.id(), options)
    }

    /// Uses `delegate` to physically clear the cache on flush.
    pub fn with_flush_delegate(mut self, delegate: Arc<dyn FlushCache>) -> Self {
        self.flush_delegate = Some(delegate);
        self
    }

    /// Never clears the store physically; flush only rotates the generation.
    pub fn without_flush_delegate(mut self) -> Self {
        self.flush_delegate = None;
        self
    }

    /// Installs a per-item strategy consulted on lookups by id.
    pub fn with_use_cache_strategy(mut self, strategy: Arc<dyn UseCacheStrategyMethod<Id>>) -> Self {
        self.use_cache_strategy = Some(strategy);
        self
    }

    /// Installs a hook that can bypass the cache entirely.
    pub fn with_use_cache_at_all(mut self, hook: Arc<dyn UseCacheAtAll>) -> Self {
        self.use_cache_at_all = Some(hook);
        self
    }

    // == Accessors ==
    pub fn options(&self) -> &AutoCacheOptions {
        &self.core.options
    }

    /// The current generation id.
    pub fn generation_id(&self) -> String {
        self.core.generation.load().as_ref().clone()
    }

    pub fn stats(&self) -> AutoCacheStats {
        self.core.stats.snapshot()
    }

    /// Id of `item`, as the cache sees it.
    pub fn id_of(&self, item: &M) -> Id {
        (self.core.get_id)(item)
    }

    /// True while a background job is populating or evicting collection `key`.
    pub fn is_collection_operation_active(&self, key: &str) -> bool {
        self.core.collection_operations.contains(key)
    }

    /// True while a background job is populating or evicting the page stored
    /// under `page_key` (see [`cache_key_for_page`]).
    pub fn is_page_operation_active(&self, page_key: &str) -> bool {
        self.core.active_pages.contains(page_key)
    }

    /// Waits until no background job works on collection `key`.
    ///
    /// Gives a job that is about to start a few milliseconds to show up first.
    pub async fn delay_until_no_operation_active(&self, key: &str) {
        Self::delay_while(|| self.is_collection_operation_active(key)).await;
    }

    /// Waits until no background job works on the page under `page_key`.
    pub async fn delay_until_no_page_active(&self, page_key: &str) {
        Self::delay_while(|| self.is_page_operation_active(page_key)).await;
    }

    async fn delay_while<F: Fn() -> bool>(active: F) {
        let mut count = 0;
        while count < 5 && !active() {
            count += 1;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        while active() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    // == Store Access ==
    fn physical_key(&self, key: &str) -> String {
        match &self.core.options.key_namespace {
            Some(namespace) => format!("{}:{}", namespace, key),
            None => key.to_string(),
        }
    }

    async fn store_get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.core.cache.get(&self.physical_key(key)).await
    }

    async fn store_set<T: Serialize + Sync + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = self.to_serialized_envelope(value)?;
        self.core
            .cache
            .set(&self.physical_key(key), bytes, &self.core.entry_options)
            .await
    }

    async fn store_remove(&self, key: &str) -> Result<()> {
        self.core.cache.remove(&self.physical_key(key)).await
    }

    /// Serializes `item` into an envelope stamped with the current generation.
    pub fn to_serialized_envelope<T: Serialize + ?Sized>(&self, item: &T) -> Result<Vec<u8>> {
        let generation = self.core.generation.load();
        let envelope = CacheEnvelope::wrap(item, generation.as_str())?;
        serializing::serialize(&envelope)
    }

    // == Read Path ==
    async fn should_consult_cache(&self, kind: CachedValueKind) -> Result<bool> {
        let Some(hook) = &self.use_cache_at_all else {
            return Ok(true);
        };
        let consult = hook.use_cache_at_all(kind).await?;
        if !consult {
            self.core.stats.record_ignored();
            debug!("Cache bypassed for {:?} lookup", kind);
        }
        Ok(consult)
    }

    fn too_old(&self, envelope: &CacheEnvelope) -> bool {
        let Some(expiration) = self.core.options.absolute_expiration_relative_to_now else {
            return false;
        };
        let Ok(expiration) = chrono::Duration::from_std(expiration) else {
            return false;
        };
        match envelope.written_at.checked_add_signed(expiration) {
            Some(deadline) => deadline <= Utc::now(),
            None => false,
        }
    }

    fn envelope_verdict(&self, envelope: &CacheEnvelope) -> UseCacheStrategy {
        if envelope.generation_id != self.core.generation.load().as_str() {
            return UseCacheStrategy::Remove;
        }
        if self.too_old(envelope) {
            return UseCacheStrategy::Remove;
        }
        UseCacheStrategy::Use
    }

    async fn verdict(&self, envelope: &CacheEnvelope, id: Option<&Id>) -> Result<UseCacheStrategy> {
        let verdict = self.envelope_verdict(envelope);
        if verdict != UseCacheStrategy::Use {
            return Ok(verdict);
        }
        match (id, &self.use_cache_strategy) {
            (Some(id), Some(strategy)) => {
                let info = CachedItemInformation {
                    id: id.clone(),
                    written_at: envelope.written_at,
                };
                strategy.use_cache_strategy(&info).await
            }
            _ => Ok(UseCacheStrategy::Use),
        }
    }

    async fn get_and_maybe_return<T, F>(
        &self,
        key: &str,
        id: Option<&Id>,
        deserialize: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(CacheEnvelope) -> Result<T> + Send,
    {
        let Some(bytes) = self.store_get(key).await? else {
            self.core.stats.record_miss();
            debug!("Cache miss for key {}", key);
            return Ok(None);
        };
        let envelope: CacheEnvelope = serializing::deserialize(&bytes)?;

        match self.verdict(&envelope, id).await? {
            UseCacheStrategy::Use => {
                self.core.stats.record_hit();
                debug!("Cache hit for key {}", key);
                deserialize(envelope).map(Some)
            }
            UseCacheStrategy::Ignore => {
                self.core.stats.record_ignored();
                debug!("Cached value for key {} ignored", key);
                Ok(None)
            }
            UseCacheStrategy::Remove => {
                self.core.stats.record_removed();
                debug!("Cached value for key {} evicted on read", key);
                self.store_remove(key).await?;
                Ok(None)
            }
        }
    }

    /// Reads a cached value without any trust checks; unreadable values are skipped.
    async fn read_unchecked<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.store_get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("Could not read cached value {}: {}", key, e);
                return None;
            }
        };
        match serializing::to_item(&bytes) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Cached value {} is unreadable: {}", key, e);
                None
            }
        }
    }

    // == Get ==
    /// Returns the cached item with id `id`, or None on a miss or when a
    /// hook rejects the cached value.
    pub async fn cache_get_by_id(&self, id: &Id) -> Result<Option<M>> {
        let key = cache_key_for_id(id)?;
        if !self.should_consult_cache(CachedValueKind::Item).await? {
            return Ok(None);
        }
        self.get_and_maybe_return(&key, Some(id), |envelope| envelope.into_item())
            .await
    }

    /// Returns the item cached under an arbitrary key.
    pub async fn cache_get_by_key(&self, key: &str) -> Result<Option<M>> {
        require_not_blank(key, "key")?;
        if !self.should_consult_cache(CachedValueKind::Item).await? {
            return Ok(None);
        }
        self.get_and_maybe_return(key, None, |envelope| envelope.into_item())
            .await
    }

    /// Returns at most `limit` items of the collection cached under `key`.
    ///
    /// A collection cached under a smaller limit than `limit` cannot answer
    /// the request and counts as a miss.
    pub async fn cache_get_collection(&self, limit: usize, key: &str) -> Result<Option<Vec<M>>> {
        require(limit > 0, || "Parameter limit must be greater than zero".to_string())?;
        require_not_blank(key, "key")?;

        let cached_limit = self.core.collection_limits.get(key).map(|limit| *limit);
        match cached_limit {
            Some(cached_limit) if limit <= cached_limit => {}
            _ => {
                self.core.stats.record_miss();
                debug!(
                    "Collection {} not cached for limit {} (cached limit {:?})",
                    key, limit, cached_limit
                );
                return Ok(None);
            }
        }
        if !self.should_consult_cache(CachedValueKind::Collection).await? {
            return Ok(None);
        }

        self.get_and_maybe_return(key, None, move |envelope| {
            let mut items: Vec<M> = envelope.into_item()?;
            items.truncate(limit);
            Ok(items)
        })
        .await
    }

    /// Returns the cached page at `offset`/`limit` under `prefix`.
    pub async fn cache_get_page(
        &self,
        offset: usize,
        limit: usize,
        prefix: &str,
    ) -> Result<Option<PageEnvelope<M>>> {
        require(limit > 0, || "Parameter limit must be greater than zero".to_string())?;
        require_not_blank(prefix, "prefix")?;
        if !self.should_consult_cache(CachedValueKind::Page).await? {
            return Ok(None);
        }
        let key = cache_key_for_page(prefix, offset, limit);
        self.get_and_maybe_return(&key, None, |envelope| envelope.into_item())
            .await
    }

    /// True if anything at all is stored for `id`, trusted or not.
    pub async fn cache_item_exists(&self, id: &Id) -> Result<bool> {
        let key = cache_key_for_id(id)?;
        Ok(self.store_get(&key).await?.is_some())
    }

    // == Set ==
    /// Caches `item` under its own id.
    pub async fn cache_set(&self, item: &M) -> Result<()> {
        let id = self.id_of(item);
        self.cache_set_by_id(&id, item).await
    }

    /// Caches `item` under `id`.
    pub async fn cache_set_by_id(&self, id: &Id, item: &M) -> Result<()> {
        let key = cache_key_for_id(id)?;
        self.store_set(&key, item).await
    }

    /// Caches `item` under an arbitrary key.
    pub async fn cache_set_by_key(&self, key: &str, item: &M) -> Result<()> {
        require_not_blank(key, "key")?;
        self.store_set(key, item).await
    }

    async fn cache_set_collection(&self, items: &[M], limit: usize, key: &str) -> Result<()> {
        self.store_set(key, items).await?;
        self.core.collection_limits.insert(key.to_string(), limit);
        Ok(())
    }

    async fn cache_set_page(&self, page: &PageEnvelope<M>, prefix: &str) -> Result<()> {
        page.validate()?;
        let key = cache_key_for_page(prefix, page.page_info.offset, page.page_info.limit);
        self.store_set(&key, page).await?;
        self.core
            .collection_pages
            .entry(prefix.to_string())
            .or_default()
            .insert(key);
        Ok(())
    }

    /// After a write that did not hand back the stored item, reads it with
    /// `read` and caches it, if the options ask for that.
    ///
    /// With `save_all` the item is always read back; with `do_get_to_update`
    /// only when something is already cached for `id`.
    pub async fn cache_maybe_set<F, Fut>(&self, id: &Id, read: F) -> Result<()>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Option<M>>> + Send,
    {
        let options = &self.core.options;
        let get_and_save =
            options.save_all || (options.do_get_to_update && self.cache_item_exists(id).await?);
        if !get_and_save {
            return Ok(());
        }
        match read().await? {
            Some(item) => self.cache_set_by_id(id, &item).await,
            None => Ok(()),
        }
    }

    // == Remove ==
    /// Evicts the item cached for `id`.
    pub async fn cache_remove_by_id(&self, id: &Id) -> Result<()> {
        let key = cache_key_for_id(id)?;
        self.store_remove(&key).await
    }

    async fn remove_item(&self, item: &M) -> Result<()> {
        let id = self.id_of(item);
        self.cache_remove_by_id(&id).await
    }

    async fn remove_page(&self, page: &PageEnvelope<M>, prefix: &str) -> Result<()> {
        let key = cache_key_for_page(prefix, page.page_info.offset, page.page_info.limit);
        self.store_remove(&key).await?;
        if let Some(mut pages) = self.core.collection_pages.get_mut(prefix) {
            pages.remove(&key);
        }
        Ok(())
    }

    /// Removes the array cached under `key`, every page recorded under it and
    /// its recorded limit.
    async fn forget_collection(&self, key: &str) -> Result<()> {
        self.core.collection_limits.remove(key);
        let page_keys: Vec<String> = self
            .core
            .collection_pages
            .remove(key)
            .map(|(_, pages)| pages.into_iter().collect())
            .unwrap_or_default();

        let page_removals = page_keys.iter().map(|page_key| self.store_remove(page_key));
        let (array_result, page_results) =
            futures::join!(self.store_remove(key), join_all(page_removals));
        collect_all(page_results)?;
        array_result
    }

    /// Items found in the array and pages cached under `key`.
    async fn cached_members(&self, key: &str) -> Vec<M> {
        let page_keys: Vec<String> = self
            .core
            .collection_pages
            .get(key)
            .map(|pages| pages.iter().cloned().collect())
            .unwrap_or_default();

        let mut members: Vec<M> = self.read_unchecked(key).await.unwrap_or_default();
        for page_key in page_keys {
            if let Some(page) = self.read_unchecked::<PageEnvelope<M>>(&page_key).await {
                members.extend(page.data);
            }
        }
        members
    }

    // == Background Operations ==
    fn skip_background(&self, key: &str) {
        self.core.stats.record_background_skipped();
        debug!("Background job for {} skipped, another one is active", key);
    }

    /// Caches a freshly fetched collection without blocking the caller.
    ///
    /// With `save_collections` the whole array is cached under `key`, along
    /// with its pages; otherwise only the individual items are. Does nothing if
    /// a job for `key` is already running.
    ///
    /// # Arguments
    /// * `items` - The items as fetched from the backing service
    /// * `limit` - The limit they were fetched with
    /// * `key` - Collection key
    pub fn cache_items_in_background(&self, items: Vec<M>, limit: usize, key: &str) -> Result<()> {
        require(limit > 0, || "Parameter limit must be greater than zero".to_string())?;
        require_not_blank(key, "key")?;
        let Some(claim) = ActiveKey::claim(&self.core.collection_operations, key) else {
            self.skip_background(key);
            return Ok(());
        };
        self.core.stats.record_background_started();

        let this = self.clone();
        let key = key.to_string();
        fire_and_forget(format!("cache collection {}", key), async move {
            let _claim = claim;
            this.collection_operation(&items, limit, &key, Operation::Set)
                .await
        });
        Ok(())
    }

    /// Caches a freshly fetched page without blocking the caller.
    ///
    /// Skipped while a job works on the whole collection `prefix`, or on the
    /// same page.
    pub fn cache_page_in_background(&self, page: PageEnvelope<M>, prefix: &str) -> Result<()> {
        self.page_in_background(page, prefix, Operation::Set)
    }

    /// Evicts a page and its items without blocking the caller.
    pub fn remove_cache_page_in_background(&self, page: PageEnvelope<M>, prefix: &str) -> Result<()> {
        self.page_in_background(page, prefix, Operation::Remove)
    }

    fn page_in_background(&self, page: PageEnvelope<M>, prefix: &str, operation: Operation) -> Result<()> {
        require_not_blank(prefix, "prefix")?;
        page.validate()?;
        if self.is_collection_operation_active(prefix) {
            self.skip_background(prefix);
            return Ok(());
        }
        let key = cache_key_for_page(prefix, page.page_info.offset, page.page_info.limit);
        let Some(claim) = ActiveKey::claim(&self.core.active_pages, &key) else {
            self.skip_background(&key);
            return Ok(());
        };
        self.core.stats.record_background_started();

        let this = self.clone();
        let prefix = prefix.to_string();
        fire_and_forget(format!("{:?} page {}", operation, key), async move {
            let _claim = claim;
            this.page_operation(&page, None, &prefix, operation).await
        });
        Ok(())
    }

    /// Evicts `items` and the collection `key` without blocking the caller.
    pub fn remove_cache_items_in_background(&self, items: Vec<M>, key: &str) -> Result<()> {
        require_not_blank(key, "key")?;
        let Some(claim) = ActiveKey::claim(&self.core.collection_operations, key) else {
            self.skip_background(key);
            return Ok(());
        };
        self.core.stats.record_background_started();

        let this = self.clone();
        let key = key.to_string();
        fire_and_forget(format!("evict collection {}", key), async move {
            let _claim = claim;
            this.collection_operation(&items, usize::MAX, &key, Operation::Remove)
                .await
        });
        Ok(())
    }

    /// Evicts the collection cached under `key` without blocking the caller.
    ///
    /// The collection entries and recorded limit are always removed, even when
    /// the cached array cannot be read. With [`EvictionScope::CollectionAndItems`]
    /// the items it held are evicted too.
    pub fn remove_cached_collection_in_background(&self, key: &str, scope: EvictionScope) -> Result<()> {
        require_not_blank(key, "key")?;
        let Some(claim) = ActiveKey::claim(&self.core.collection_operations, key) else {
            self.skip_background(key);
            return Ok(());
        };
        self.core.stats.record_background_started();

        let this = self.clone();
        let key = key.to_string();
        fire_and_forget(format!("evict collection {}", key), async move {
            let _claim = claim;
            let items = match scope {
                EvictionScope::CollectionAndItems => this.cached_members(&key).await,
                EvictionScope::CollectionOnly => Vec::new(),
            };
            this.collection_operation(&items, usize::MAX, &key, Operation::Remove)
                .await
        });
        Ok(())
    }

    async fn collection_operation(
        &self,
        items: &[M],
        limit: usize,
        key: &str,
        operation: Operation,
    ) -> Result<()> {
        require(limit > 0, || "Parameter limit must be greater than zero".to_string())?;
        if operation == Operation::Remove {
            require(limit == usize::MAX, || {
                format!("Removing a collection requires an unbounded limit, got {}", limit)
            })?;
        }

        match operation {
            Operation::Set if self.core.options.save_collections => {
                // Fewer items than asked for means we have the whole collection
                let total = (items.len() < limit).then_some(items.len());
                let pages: Vec<PageEnvelope<M>> = items
                    .chunks(PageInfo::DEFAULT_LIMIT)
                    .enumerate()
                    .map(|(index, chunk)| {
                        PageEnvelope::new(
                            index * PageInfo::DEFAULT_LIMIT,
                            PageInfo::DEFAULT_LIMIT,
                            total,
                            chunk.to_vec(),
                        )
                    })
                    .collect();
                let page_jobs = pages
                    .iter()
                    .map(|page| self.page_operation(page, Some(limit), key, Operation::Set));

                let (array_result, page_results) = futures::join!(
                    self.cache_set_collection(items, limit, key),
                    join_all(page_jobs)
                );
                collect_all(page_results)?;
                array_result
            }
            Operation::Set => collect_all(join_all(items.iter().map(|item| self.cache_set(item))).await),
            Operation::Remove => {
                let (forget_result, item_results) = futures::join!(
                    self.forget_collection(key),
                    join_all(items.iter().map(|item| self.remove_item(item)))
                );
                collect_all(item_results)?;
                forget_result
            }
        }
    }

    /// Sets or removes one page and its items. The page entry itself is
    /// skipped when it may be truncated at `cap`; its items are not.
    async fn page_operation(
        &self,
        page: &PageEnvelope<M>,
        cap: Option<usize>,
        prefix: &str,
        operation: Operation,
    ) -> Result<()> {
        let truncated = cap.map_or(false, |cap| page.page_info.was_truncated_at(cap));
        let page_job = async {
            if truncated {
                debug!(
                    "Page {}-{} of {} may be truncated, caching its items only",
                    page.page_info.offset, page.page_info.limit, prefix
                );
                return Ok(());
            }
            match operation {
                Operation::Set => self.cache_set_page(page, prefix).await,
                Operation::Remove => self.remove_page(page, prefix).await,
            }
        };
        let item_jobs = join_all(page.data.iter().map(|item| async move {
            match operation {
                Operation::Set => self.cache_set(item).await,
                Operation::Remove => self.remove_item(item).await,
            }
        }));

        let (page_result, item_results) = futures::join!(page_job, item_jobs);
        collect_all(item_results)?;
        page_result
    }

    // == Flush ==
    /// Forgets every cached value of this engine.
    ///
    /// Calls the flush delegate when there is one. The generation is rotated
    /// in every case, so values written before the flush are never trusted
    /// again even if they are still in the store.
    pub async fn flush(&self) -> Result<()> {
        match &self.flush_delegate {
            Some(delegate) => delegate.flush().await?,
            None => warn!(
                "No flush method available for this cache; rotating the generation instead. \
                 Old entries stay in the store until they expire"
            ),
        }
        self.rotate_generation();
        Ok(())
    }

    fn rotate_generation(&self) {
        let generation = new_generation_id();
        self.core.generation.store(Arc::new(generation.clone()));
        self.core.collection_limits.clear();
        self.core.collection_pages.clear();
        info!("Cache generation rotated to {}", generation);
    }
}
