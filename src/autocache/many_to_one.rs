//! Many-to-one Auto-cache Decorator
//!
//! Adds cached children collections to [`CrudAutoCache`]. The children of a
//! parent are cached under `childrenOf-{parent_id}`, and any known mutation
//! of a child evicts its parent's collection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::autocache::crud::CrudAutoCache;
use crate::autocache::engine::{children_collection_key, AutoCache, EvictionScope};
use crate::crud::{Crud, CrudManyToOne, ParentIdFn};
use crate::error::Result;
use crate::models::{CacheId, CacheModel, Lock, PageEnvelope, PageInfo};

/// A [`CrudManyToOne`] service with cached items and cached children
/// collections.
pub struct ManyToOneAutoCache<C, M, Id> {
    crud: CrudAutoCache<C, M, Id>,
    service: Arc<dyn CrudManyToOne<C, M, Id>>,
    parent_id: ParentIdFn<M, Id>,
}

impl<C, M, Id> Clone for ManyToOneAutoCache<C, M, Id> {
    fn clone(&self) -> Self {
        Self {
            crud: self.crud.clone(),
            service: Arc::clone(&self.service),
            parent_id: Arc::clone(&self.parent_id),
        }
    }
}

impl<C, M, Id> ManyToOneAutoCache<C, M, Id>
where
    C: Send + 'static,
    M: CacheModel,
    Id: CacheId + PartialEq,
{
    /// Decorates `service`.
    ///
    /// # Arguments
    /// * `service` - The backing service
    /// * `cache` - Engine the items and collections are cached with
    /// * `parent_id` - Extracts the parent id of a child
    pub fn new<S, F>(service: Arc<S>, cache: AutoCache<M, Id>, parent_id: F) -> Self
    where
        S: CrudManyToOne<C, M, Id> + 'static,
        F: Fn(&M) -> Id + Send + Sync + 'static,
    {
        let crud_service: Arc<dyn Crud<C, M, Id>> = service.clone();
        Self {
            crud: CrudAutoCache::new(crud_service, cache),
            service,
            parent_id: Arc::new(parent_id),
        }
    }

    pub fn cache(&self) -> &AutoCache<M, Id> {
        self.crud.cache()
    }

    /// Parent of the item stored under `id`, from the cache if possible.
    async fn parent_of(&self, id: &Id) -> Result<Option<Id>> {
        if let Some(cached) = self.cache().cache_get_by_id(id).await? {
            return Ok(Some((self.parent_id)(&cached)));
        }
        Ok(self
            .service
            .read(id)
            .await?
            .map(|item| (self.parent_id)(&item)))
    }

    /// Waits out any background job on the children of `parent_id`.
    async fn fence(&self, parent_id: &Id) {
        self.cache()
            .delay_until_no_operation_active(&children_collection_key(parent_id))
            .await;
    }

    /// Evicts the cached children collection of `parent_id`.
    async fn evict_children(&self, parent_id: &Id) -> Result<()> {
        let key = children_collection_key(parent_id);
        self.cache().delay_until_no_operation_active(&key).await;
        self.cache()
            .remove_cached_collection_in_background(&key, EvictionScope::CollectionOnly)
    }

    async fn evict_parents(&self, old_parent: Option<Id>, new_parent: &Id) -> Result<()> {
        self.evict_children(new_parent).await?;
        match old_parent {
            Some(old_parent) if old_parent != *new_parent => self.evict_children(&old_parent).await,
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl<C, M, Id> Crud<C, M, Id> for ManyToOneAutoCache<C, M, Id>
where
    C: Send + 'static,
    M: CacheModel,
    Id: CacheId + PartialEq,
{
    async fn create(&self, item: C) -> Result<Id> {
        let id = self.crud.create(item).await?;
        if let Some(parent_id) = self.parent_of(&id).await? {
            self.evict_children(&parent_id).await?;
        }
        Ok(id)
    }

    async fn create_and_return(&self, item: C) -> Result<M> {
        let created = self.crud.create_and_return(item).await?;
        self.evict_children(&(self.parent_id)(&created)).await?;
        Ok(created)
    }

    async fn create_with_specified_id(&self, id: &Id, item: C) -> Result<()> {
        self.crud.create_with_specified_id(id, item).await?;
        if let Some(parent_id) = self.parent_of(id).await? {
            self.evict_children(&parent_id).await?;
        }
        Ok(())
    }

    async fn create_with_specified_id_and_return(&self, id: &Id, item: C) -> Result<M> {
        let created = self.crud.create_with_specified_id_and_return(id, item).await?;
        self.evict_children(&(self.parent_id)(&created)).await?;
        Ok(created)
    }

    async fn read(&self, id: &Id) -> Result<Option<M>> {
        self.crud.read(id).await
    }

    async fn read_all(&self, limit: usize) -> Result<Vec<M>> {
        self.crud.read_all(limit).await
    }

    async fn read_all_with_paging(&self, offset: usize, limit: Option<usize>) -> Result<PageEnvelope<M>> {
        self.crud.read_all_with_paging(offset, limit).await
    }

    async fn update(&self, id: &Id, item: M) -> Result<()> {
        let old_parent = self.parent_of(id).await?;
        let new_parent = (self.parent_id)(&item);
        self.crud.update(id, item).await?;
        self.evict_parents(old_parent, &new_parent).await
    }

    async fn update_and_return(&self, id: &Id, item: M) -> Result<M> {
        let old_parent = self.parent_of(id).await?;
        let updated = self.crud.update_and_return(id, item).await?;
        self.evict_parents(old_parent, &(self.parent_id)(&updated))
            .await?;
        Ok(updated)
    }

    async fn delete(&self, id: &Id) -> Result<()> {
        let parent_id = self.parent_of(id).await?;
        if let Some(parent_id) = &parent_id {
            // A running population could write the item back after its eviction
            self.fence(parent_id).await;
        }
        self.crud.delete(id).await?;
        match parent_id {
            Some(parent_id) => self.evict_children(&parent_id).await,
            None => Ok(()),
        }
    }

    async fn delete_all(&self) -> Result<()> {
        self.crud.delete_all().await
    }

    async fn claim_lock(&self, id: &Id) -> Result<Lock<Id>> {
        self.crud.claim_lock(id).await
    }

    async fn release_lock(&self, id: &Id, lock_id: &Id) -> Result<()> {
        self.crud.release_lock(id, lock_id).await
    }

    async fn claim_distributed_lock(
        &self,
        id: &Id,
        lock_time_span: Option<Duration>,
        current_lock_id: Option<&Id>,
    ) -> Result<Lock<Id>> {
        self.crud
            .claim_distributed_lock(id, lock_time_span, current_lock_id)
            .await
    }

    async fn release_distributed_lock(&self, id: &Id, lock_id: &Id) -> Result<()> {
        self.crud.release_distributed_lock(id, lock_id).await
    }

    async fn claim_transaction_lock(&self, id: &Id) -> Result<()> {
        self.crud.claim_transaction_lock(id).await
    }
}

#[async_trait]
impl<C, M, Id> CrudManyToOne<C, M, Id> for ManyToOneAutoCache<C, M, Id>
where
    C: Send + 'static,
    M: CacheModel,
    Id: CacheId + PartialEq,
{
    async fn read_children(&self, parent_id: &Id, limit: usize) -> Result<Vec<M>> {
        let key = children_collection_key(parent_id);
        if let Some(cached) = self.cache().cache_get_collection(limit, &key).await? {
            return Ok(cached);
        }
        let children = self.service.read_children(parent_id, limit).await?;
        self.cache()
            .cache_items_in_background(children.clone(), limit, &key)?;
        Ok(children)
    }

    async fn read_children_with_paging(
        &self,
        parent_id: &Id,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<PageEnvelope<M>> {
        let limit = limit.unwrap_or(PageInfo::DEFAULT_LIMIT);
        let key = children_collection_key(parent_id);
        if let Some(cached) = self.cache().cache_get_page(offset, limit, &key).await? {
            return Ok(cached);
        }
        let page = self
            .service
            .read_children_with_paging(parent_id, offset, Some(limit))
            .await?;
        self.cache().cache_page_in_background(page.clone(), &key)?;
        Ok(page)
    }

    async fn delete_children(&self, parent_id: &Id) -> Result<()> {
        self.service.delete_children(parent_id).await?;
        let key = children_collection_key(parent_id);
        self.cache().delay_until_no_operation_active(&key).await;
        self.cache()
            .remove_cached_collection_in_background(&key, EvictionScope::CollectionAndItems)
    }

    async fn create_child(&self, parent_id: &Id, item: C) -> Result<Id> {
        let id = self.service.create_child(parent_id, item).await?;
        self.cache()
            .cache_maybe_set(&id, || self.service.read(&id))
            .await?;
        self.evict_children(parent_id).await?;
        Ok(id)
    }

    async fn create_child_and_return(&self, parent_id: &Id, item: C) -> Result<M> {
        let created = self.service.create_child_and_return(parent_id, item).await?;
        self.cache().cache_set(&created).await?;
        self.evict_children(parent_id).await?;
        Ok(created)
    }

    async fn create_child_with_specified_id(&self, parent_id: &Id, child_id: &Id, item: C) -> Result<()> {
        self.service
            .create_child_with_specified_id(parent_id, child_id, item)
            .await?;
        self.cache()
            .cache_maybe_set(child_id, || self.service.read(child_id))
            .await?;
        self.evict_children(parent_id).await
    }

    async fn create_child_with_specified_id_and_return(
        &self,
        parent_id: &Id,
        child_id: &Id,
        item: C,
    ) -> Result<M> {
        let created = self
            .service
            .create_child_with_specified_id_and_return(parent_id, child_id, item)
            .await?;
        self.cache().cache_set_by_id(child_id, &created).await?;
        self.evict_children(parent_id).await?;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autocache::engine::cache_key_for_page;
    use crate::cache::{DistributedCache, MemoryDistributedCache};
    use crate::config::AutoCacheOptions;
    use crate::crud::ManyToOneMemory;
    use crate::models::UniquelyIdentifiable;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Part {
        id: i64,
        widget_id: i64,
        name: String,
    }

    impl UniquelyIdentifiable<i64> for Part {
        fn id(&self) -> i64 {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = id;
        }
    }

    fn part(widget_id: i64, name: &str) -> Part {
        Part {
            id: 0,
            widget_id,
            name: name.to_string(),
        }
    }

    type PartStorage = ManyToOneMemory<Part, Part, i64>;

    fn decorated() -> (
        ManyToOneAutoCache<Part, Part, i64>,
        Arc<PartStorage>,
        MemoryDistributedCache,
    ) {
        let storage = Arc::new(ManyToOneMemory::new(|p: &Part| p.widget_id));
        let store = MemoryDistributedCache::new();
        let options = AutoCacheOptions::default().with_save_collections(true);
        let cache = AutoCache::for_identifiable(Arc::new(store.clone()), options);
        let parts = ManyToOneAutoCache::new(storage.clone(), cache, |p: &Part| p.widget_id);
        (parts, storage, store)
    }

    async fn settle(parts: &ManyToOneAutoCache<Part, Part, i64>, widget_id: i64) {
        parts
            .cache()
            .delay_until_no_operation_active(&children_collection_key(&widget_id))
            .await;
    }

    #[tokio::test]
    async fn test_read_children_cached_per_parent() {
        let (parts, storage, _) = decorated();
        storage.create_child(&100, part(100, "a")).await.unwrap();
        storage.create_child(&100, part(100, "b")).await.unwrap();
        storage.create_child(&200, part(200, "c")).await.unwrap();

        assert_eq!(parts.read_children(&100, 10).await.unwrap().len(), 2);
        settle(&parts, 100).await;
        assert_eq!(parts.read_children(&100, 10).await.unwrap().len(), 2);
        assert_eq!(parts.read_children(&200, 10).await.unwrap().len(), 1);

        assert_eq!(storage.stats().collection_reads, 2);
    }

    #[tokio::test]
    async fn test_create_child_evicts_parent_collection() {
        let (parts, storage, store) = decorated();
        storage.create_child(&300, part(300, "a")).await.unwrap();
        parts.read_children(&300, 10).await.unwrap();
        settle(&parts, 300).await;

        parts.create_child_and_return(&300, part(300, "b")).await.unwrap();
        settle(&parts, 300).await;

        assert!(store
            .get(&children_collection_key(&300))
            .await
            .unwrap()
            .is_none());
        assert_eq!(parts.read_children(&300, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_moving_parent_evicts_both() {
        let (parts, storage, store) = decorated();
        let moved = parts.create_child_and_return(&400, part(400, "a")).await.unwrap();
        storage.create_child(&500, part(500, "b")).await.unwrap();
        parts.read_children(&400, 10).await.unwrap();
        settle(&parts, 400).await;
        parts.read_children(&500, 10).await.unwrap();
        settle(&parts, 500).await;

        parts
            .update(&moved.id, part(500, "a"))
            .await
            .unwrap();
        settle(&parts, 400).await;
        settle(&parts, 500).await;

        for widget_id in [400, 500] {
            assert!(store
                .get(&children_collection_key(&widget_id))
                .await
                .unwrap()
                .is_none());
        }
        assert!(parts.read_children(&400, 10).await.unwrap().is_empty());
        assert_eq!(parts.read_children(&500, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_children_evicts_collection_and_items() {
        let (parts, storage, store) = decorated();
        let child = storage.create_child_and_return(&600, part(600, "a")).await.unwrap();
        parts.read_children(&600, 10).await.unwrap();
        settle(&parts, 600).await;
        assert!(parts.cache().cache_item_exists(&child.id).await.unwrap());

        parts.delete_children(&600).await.unwrap();
        settle(&parts, 600).await;

        assert!(store
            .get(&children_collection_key(&600))
            .await
            .unwrap()
            .is_none());
        assert!(!parts.cache().cache_item_exists(&child.id).await.unwrap());
        assert!(parts.read_children(&600, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_children_paging_cached() {
        let (parts, storage, _) = decorated();
        for name in ["a", "b", "c"] {
            storage.create_child(&700, part(700, name)).await.unwrap();
        }

        let first = parts.read_children_with_paging(&700, 1, Some(2)).await.unwrap();
        let page_key = cache_key_for_page(&children_collection_key(&700), 1, 2);
        parts.cache().delay_until_no_page_active(&page_key).await;
        let second = parts.read_children_with_paging(&700, 1, Some(2)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.page_info.returned, 2);
        assert_eq!(storage.stats().collection_reads, 1);
    }
}
