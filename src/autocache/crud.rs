//! CRUD Auto-cache Decorator
//!
//! Wraps a [`Crud`] service so reads are answered from the cache when
//! possible and writes keep the cache in step with the service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::autocache::engine::{AutoCache, READ_ALL_CACHE_KEY};
use crate::cache::DistributedCache;
use crate::config::AutoCacheOptions;
use crate::crud::Crud;
use crate::error::Result;
use crate::models::{CacheId, CacheModel, Lock, PageEnvelope, PageInfo, UniquelyIdentifiable};

/// A [`Crud`] service with read-through and write-through caching.
///
/// Implements [`Crud`] itself, so it can stand in wherever the wrapped
/// service was used.
pub struct CrudAutoCache<C, M, Id> {
    service: Arc<dyn Crud<C, M, Id>>,
    cache: AutoCache<M, Id>,
}

impl<C, M, Id> Clone for CrudAutoCache<C, M, Id> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            cache: self.cache.clone(),
        }
    }
}

impl<C, M, Id> CrudAutoCache<C, M, Id>
where
    C: Send + 'static,
    M: CacheModel,
    Id: CacheId,
{
    /// Decorates `service` with an existing engine.
    pub fn new(service: Arc<dyn Crud<C, M, Id>>, cache: AutoCache<M, Id>) -> Self {
        Self { service, cache }
    }

    /// Decorates `service` with a new engine over `store`.
    ///
    /// # Arguments
    /// * `service` - The backing service
    /// * `store` - Byte store the values are cached in
    /// * `get_id` - Extracts the id of an item
    /// * `options` - Caching options
    pub fn with_store<F>(
        service: Arc<dyn Crud<C, M, Id>>,
        store: Arc<dyn DistributedCache>,
        get_id: F,
        options: AutoCacheOptions,
    ) -> Self
    where
        F: Fn(&M) -> Id + Send + Sync + 'static,
    {
        Self::new(service, AutoCache::new(store, get_id, options))
    }

    /// Like [`with_store`](Self::with_store), for models that know their own id.
    pub fn for_identifiable(
        service: Arc<dyn Crud<C, M, Id>>,
        store: Arc<dyn DistributedCache>,
        options: AutoCacheOptions,
    ) -> Self
    where
        M: UniquelyIdentifiable<Id>,
    {
        Self::new(service, AutoCache::for_identifiable(store, options))
    }

    /// The engine, for direct cache access.
    pub fn cache(&self) -> &AutoCache<M, Id> {
        &self.cache
    }

    /// The wrapped service.
    pub fn service(&self) -> &Arc<dyn Crud<C, M, Id>> {
        &self.service
    }

    async fn cache_after_write(&self, id: &Id) -> Result<()> {
        self.cache
            .cache_maybe_set(id, || self.service.read(id))
            .await
    }
}

#[async_trait]
impl<C, M, Id> Crud<C, M, Id> for CrudAutoCache<C, M, Id>
where
    C: Send + 'static,
    M: CacheModel,
    Id: CacheId,
{
    async fn create(&self, item: C) -> Result<Id> {
        let id = self.service.create(item).await?;
        self.cache_after_write(&id).await?;
        Ok(id)
    }

    async fn create_and_return(&self, item: C) -> Result<M> {
        let created = self.service.create_and_return(item).await?;
        self.cache.cache_set(&created).await?;
        Ok(created)
    }

    async fn create_with_specified_id(&self, id: &Id, item: C) -> Result<()> {
        self.service.create_with_specified_id(id, item).await?;
        self.cache_after_write(id).await
    }

    async fn create_with_specified_id_and_return(&self, id: &Id, item: C) -> Result<M> {
        let created = self
            .service
            .create_with_specified_id_and_return(id, item)
            .await?;
        self.cache.cache_set_by_id(id, &created).await?;
        Ok(created)
    }

    async fn read(&self, id: &Id) -> Result<Option<M>> {
        if let Some(cached) = self.cache.cache_get_by_id(id).await? {
            return Ok(Some(cached));
        }
        let item = self.service.read(id).await?;
        match &item {
            Some(found) => self.cache.cache_set_by_id(id, found).await?,
            None => debug!("Item {} not found in the backing service", id),
        }
        Ok(item)
    }

    async fn read_all(&self, limit: usize) -> Result<Vec<M>> {
        if let Some(cached) = self
            .cache
            .cache_get_collection(limit, READ_ALL_CACHE_KEY)
            .await?
        {
            return Ok(cached);
        }
        let items = self.service.read_all(limit).await?;
        self.cache
            .cache_items_in_background(items.clone(), limit, READ_ALL_CACHE_KEY)?;
        Ok(items)
    }

    async fn read_all_with_paging(&self, offset: usize, limit: Option<usize>) -> Result<PageEnvelope<M>> {
        let limit = limit.unwrap_or(PageInfo::DEFAULT_LIMIT);
        if let Some(cached) = self
            .cache
            .cache_get_page(offset, limit, READ_ALL_CACHE_KEY)
            .await?
        {
            return Ok(cached);
        }
        let page = self.service.read_all_with_paging(offset, Some(limit)).await?;
        self.cache
            .cache_page_in_background(page.clone(), READ_ALL_CACHE_KEY)?;
        Ok(page)
    }

    async fn update(&self, id: &Id, item: M) -> Result<()> {
        self.service.update(id, item).await?;
        let options = self.cache.options();
        if options.save_all || options.do_get_to_update {
            self.cache_after_write(id).await
        } else {
            // The cached copy is stale now
            self.cache.cache_remove_by_id(id).await
        }
    }

    async fn update_and_return(&self, id: &Id, item: M) -> Result<M> {
        let updated = self.service.update_and_return(id, item).await?;
        self.cache.cache_set_by_id(id, &updated).await?;
        Ok(updated)
    }

    async fn delete(&self, id: &Id) -> Result<()> {
        let (evicted, deleted) =
            tokio::join!(self.cache.cache_remove_by_id(id), self.service.delete(id));
        deleted?;
        evicted
    }

    async fn delete_all(&self) -> Result<()> {
        let (flushed, deleted) = tokio::join!(self.cache.flush(), self.service.delete_all());
        deleted?;
        flushed
    }

    async fn claim_lock(&self, id: &Id) -> Result<Lock<Id>> {
        self.service.claim_lock(id).await
    }

    async fn release_lock(&self, id: &Id, lock_id: &Id) -> Result<()> {
        self.service.release_lock(id, lock_id).await
    }

    async fn claim_distributed_lock(
        &self,
        id: &Id,
        lock_time_span: Option<Duration>,
        current_lock_id: Option<&Id>,
    ) -> Result<Lock<Id>> {
        self.service
            .claim_distributed_lock(id, lock_time_span, current_lock_id)
            .await
    }

    async fn release_distributed_lock(&self, id: &Id, lock_id: &Id) -> Result<()> {
        self.service.release_distributed_lock(id, lock_id).await
    }

    async fn claim_transaction_lock(&self, id: &Id) -> Result<()> {
        self.service.claim_transaction_lock(id).await
    }
}
