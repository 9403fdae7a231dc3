//! Slave-to-master Auto-cache Decorator
//!
//! The many-to-one cache for items addressed by `(master_id, slave_id)`.
//! Items are cached under their [`SlaveToMasterId`], the children of a
//! master under `childrenOf-{master_id}`.

#![allow(deprecated)]

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::autocache::engine::{children_collection_key, AutoCache, EvictionScope};
use crate::cache::DistributedCache;
use crate::config::AutoCacheOptions;
use crate::crud::CrudSlaveToMaster;
use crate::error::Result;
use crate::models::{CacheId, CacheModel, PageEnvelope, PageInfo, SlaveLock, SlaveToMasterId, UniquelyIdentifiable};

/// A [`CrudSlaveToMaster`] service with cached items and cached children
/// collections.
#[deprecated(note = "Use ManyToOneAutoCache")]
pub struct SlaveToMasterAutoCache<C, M, Id> {
    service: Arc<dyn CrudSlaveToMaster<C, M, Id>>,
    cache: AutoCache<M, SlaveToMasterId<Id>>,
}

impl<C, M, Id> SlaveToMasterAutoCache<C, M, Id>
where
    C: Send + 'static,
    M: CacheModel,
    Id: CacheId,
{
    pub fn new(service: Arc<dyn CrudSlaveToMaster<C, M, Id>>, cache: AutoCache<M, SlaveToMasterId<Id>>) -> Self {
        Self { service, cache }
    }

    /// Decorates `service` with a new engine over `store`.
    pub fn for_identifiable(
        service: Arc<dyn CrudSlaveToMaster<C, M, Id>>,
        store: Arc<dyn DistributedCache>,
        options: AutoCacheOptions,
    ) -> Self
    where
        M: UniquelyIdentifiable<SlaveToMasterId<Id>>,
    {
        Self::new(service, AutoCache::for_identifiable(store, options))
    }

    pub fn cache(&self) -> &AutoCache<M, SlaveToMasterId<Id>> {
        &self.cache
    }

    /// Reads an item by its composite id.
    pub async fn read_by_id(&self, id: &SlaveToMasterId<Id>) -> Result<Option<M>> {
        self.read(&id.master_id, &id.slave_id).await
    }

    async fn cache_after_write(&self, master_id: &Id, slave_id: &Id) -> Result<()> {
        let id = SlaveToMasterId::new(master_id.clone(), slave_id.clone());
        self.cache
            .cache_maybe_set(&id, || self.service.read(master_id, slave_id))
            .await
    }

    async fn evict_children(&self, master_id: &Id, scope: EvictionScope) -> Result<()> {
        let key = children_collection_key(master_id);
        self.cache.delay_until_no_operation_active(&key).await;
        self.cache.remove_cached_collection_in_background(&key, scope)
    }

    /// A child of `master_id` changed, so its cached children list is stale.
    async fn children_changed(&self, master_id: &Id) -> Result<()> {
        self.evict_children(master_id, EvictionScope::CollectionOnly)
            .await
    }
}

#[async_trait]
impl<C, M, Id> CrudSlaveToMaster<C, M, Id> for SlaveToMasterAutoCache<C, M, Id>
where
    C: Send + 'static,
    M: CacheModel,
    Id: CacheId,
{
    async fn create(&self, master_id: &Id, item: C) -> Result<Id> {
        let slave_id = self.service.create(master_id, item).await?;
        self.cache_after_write(master_id, &slave_id).await?;
        self.children_changed(master_id).await?;
        Ok(slave_id)
    }

    async fn create_and_return(&self, master_id: &Id, item: C) -> Result<M> {
        let created = self.service.create_and_return(master_id, item).await?;
        self.cache.cache_set(&created).await?;
        self.children_changed(master_id).await?;
        Ok(created)
    }

    async fn create_with_specified_id(&self, master_id: &Id, slave_id: &Id, item: C) -> Result<()> {
        self.service
            .create_with_specified_id(master_id, slave_id, item)
            .await?;
        self.cache_after_write(master_id, slave_id).await?;
        self.children_changed(master_id).await
    }

    async fn create_with_specified_id_and_return(
        &self,
        master_id: &Id,
        slave_id: &Id,
        item: C,
    ) -> Result<M> {
        let created = self
            .service
            .create_with_specified_id_and_return(master_id, slave_id, item)
            .await?;
        let id = SlaveToMasterId::new(master_id.clone(), slave_id.clone());
        self.cache.cache_set_by_id(&id, &created).await?;
        self.children_changed(master_id).await?;
        Ok(created)
    }

    async fn read(&self, master_id: &Id, slave_id: &Id) -> Result<Option<M>> {
        let id = SlaveToMasterId::new(master_id.clone(), slave_id.clone());
        if let Some(cached) = self.cache.cache_get_by_id(&id).await? {
            return Ok(Some(cached));
        }
        let item = self.service.read(master_id, slave_id).await?;
        match &item {
            Some(found) => self.cache.cache_set_by_id(&id, found).await?,
            None => debug!("Item {} not found in the backing service", id),
        }
        Ok(item)
    }

    async fn read_children(&self, master_id: &Id, limit: usize) -> Result<Vec<M>> {
        let key = children_collection_key(master_id);
        if let Some(cached) = self.cache.cache_get_collection(limit, &key).await? {
            return Ok(cached);
        }
        let children = self.service.read_children(master_id, limit).await?;
        self.cache
            .cache_items_in_background(children.clone(), limit, &key)?;
        Ok(children)
    }

    async fn read_children_with_paging(
        &self,
        master_id: &Id,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<PageEnvelope<M>> {
        let limit = limit.unwrap_or(PageInfo::DEFAULT_LIMIT);
        let key = children_collection_key(master_id);
        if let Some(cached) = self.cache.cache_get_page(offset, limit, &key).await? {
            return Ok(cached);
        }
        let page = self
            .service
            .read_children_with_paging(master_id, offset, Some(limit))
            .await?;
        self.cache.cache_page_in_background(page.clone(), &key)?;
        Ok(page)
    }

    async fn update(&self, master_id: &Id, slave_id: &Id, item: M) -> Result<()> {
        self.service.update(master_id, slave_id, item).await?;
        let options = self.cache.options();
        if options.save_all || options.do_get_to_update {
            self.cache_after_write(master_id, slave_id).await?;
        } else {
            let id = SlaveToMasterId::new(master_id.clone(), slave_id.clone());
            self.cache.cache_remove_by_id(&id).await?;
        }
        self.children_changed(master_id).await
    }

    async fn update_and_return(&self, master_id: &Id, slave_id: &Id, item: M) -> Result<M> {
        let updated = self
            .service
            .update_and_return(master_id, slave_id, item)
            .await?;
        let id = SlaveToMasterId::new(master_id.clone(), slave_id.clone());
        self.cache.cache_set_by_id(&id, &updated).await?;
        self.children_changed(master_id).await?;
        Ok(updated)
    }

    async fn delete(&self, master_id: &Id, slave_id: &Id) -> Result<()> {
        let id = SlaveToMasterId::new(master_id.clone(), slave_id.clone());
        let eviction = async {
            self.cache.cache_remove_by_id(&id).await?;
            self.evict_children(master_id, EvictionScope::CollectionAndItems)
                .await
        };
        let (deleted, evicted) = tokio::join!(self.service.delete(master_id, slave_id), eviction);
        deleted?;
        evicted
    }

    async fn delete_children(&self, master_id: &Id) -> Result<()> {
        let (deleted, evicted) = tokio::join!(
            self.service.delete_children(master_id),
            self.evict_children(master_id, EvictionScope::CollectionAndItems)
        );
        deleted?;
        evicted
    }

    async fn claim_lock(&self, master_id: &Id, slave_id: &Id) -> Result<SlaveLock<Id>> {
        self.service.claim_lock(master_id, slave_id).await
    }

    async fn release_lock(&self, master_id: &Id, slave_id: &Id, lock_id: &Id) -> Result<()> {
        self.service.release_lock(master_id, slave_id, lock_id).await
    }

    async fn claim_distributed_lock(&self, master_id: &Id, slave_id: &Id) -> Result<SlaveLock<Id>> {
        self.service.claim_distributed_lock(master_id, slave_id).await
    }

    async fn release_distributed_lock(&self, master_id: &Id, slave_id: &Id, lock_id: &Id) -> Result<()> {
        self.service
            .release_distributed_lock(master_id, slave_id, lock_id)
            .await
    }

    async fn claim_transaction_lock(&self, master_id: &Id, slave_id: &Id) -> Result<()> {
        self.service.claim_transaction_lock(master_id, slave_id).await
    }
}
