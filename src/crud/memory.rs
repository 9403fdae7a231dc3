//! In-memory backing services
//!
//! Items are kept in a `BTreeMap` ordered by id, so collections and pages
//! come back in a stable order. Every service counts the calls it serves,
//! which lets tests prove a read was answered by a cache instead.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::crud::{Crud, CrudManyToOne, CrudSlaveToMaster};
use crate::error::{require, CacheError, Result};
use crate::models::{
    Lock, PageEnvelope, PageInfo, SlaveLock, SlaveToMasterId, StorageId, UniquelyIdentifiable,
    DEFAULT_LOCK_DURATION,
};

/// Extracts the parent id of a child item.
pub type ParentIdFn<M, Id> = Arc<dyn Fn(&M) -> Id + Send + Sync>;

// == Storage Stats ==
/// Snapshot of the calls a memory service has served.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub creates: u64,
    /// Single-item reads
    pub reads: u64,
    /// Collection, page and children reads
    pub collection_reads: u64,
    pub updates: u64,
    pub deletes: u64,
}

#[derive(Debug, Default)]
struct StorageCounters {
    creates: AtomicU64,
    reads: AtomicU64,
    collection_reads: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
}

impl StorageCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StorageStats {
        StorageStats {
            creates: self.creates.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            collection_reads: self.collection_reads.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

fn require_positive_limit(limit: usize) -> Result<()> {
    require(limit > 0, || "Parameter limit must be greater than zero".to_string())
}

fn valid_until(span: Duration) -> Result<DateTime<Utc>> {
    let span = chrono::Duration::from_std(span)
        .map_err(|e| CacheError::Contract(format!("Lock duration out of range: {}", e)))?;
    Ok(Utc::now() + span)
}

fn paged<M: Clone>(matching: Vec<&M>, offset: usize, limit: Option<usize>) -> Result<PageEnvelope<M>> {
    let limit = limit.unwrap_or(PageInfo::DEFAULT_LIMIT);
    require_positive_limit(limit)?;
    let total = matching.len();
    let data = matching.into_iter().skip(offset).take(limit).cloned().collect();
    Ok(PageEnvelope::new(offset, limit, Some(total), data))
}

// == Crud Memory ==
/// A [`Crud`] service kept in process memory.
pub struct CrudMemory<C, M, Id> {
    items: RwLock<BTreeMap<Id, M>>,
    locks: DashMap<Id, Lock<Id>>,
    counters: StorageCounters,
    _create: PhantomData<fn(C)>,
}

impl<C, M, Id> Default for CrudMemory<C, M, Id>
where
    Id: StorageId,
{
    fn default() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            locks: DashMap::new(),
            counters: StorageCounters::default(),
            _create: PhantomData,
        }
    }
}

impl<C, M, Id> CrudMemory<C, M, Id>
where
    C: Into<M> + Send + 'static,
    M: UniquelyIdentifiable<Id> + Clone + Send + Sync + 'static,
    Id: StorageId,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls served so far.
    pub fn stats(&self) -> StorageStats {
        self.counters.snapshot()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    async fn insert_model(&self, id: Id, mut model: M) -> Result<M> {
        model.set_id(id.clone());
        let mut items = self.items.write().await;
        if items.contains_key(&id) {
            return Err(CacheError::Conflict(format!("Item with id {} already exists", id)));
        }
        items.insert(id.clone(), model.clone());
        StorageCounters::bump(&self.counters.creates);
        debug!("Memory storage created item {}", id);
        Ok(model)
    }

    async fn values_where<F>(&self, keep: F) -> Vec<M>
    where
        F: Fn(&M) -> bool,
    {
        self.items
            .read()
            .await
            .values()
            .filter(|item| keep(item))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl<C, M, Id> Crud<C, M, Id> for CrudMemory<C, M, Id>
where
    C: Into<M> + Send + 'static,
    M: UniquelyIdentifiable<Id> + Clone + Send + Sync + 'static,
    Id: StorageId,
{
    async fn create(&self, item: C) -> Result<Id> {
        let id = Id::generate();
        self.insert_model(id.clone(), item.into()).await?;
        Ok(id)
    }

    async fn create_and_return(&self, item: C) -> Result<M> {
        self.insert_model(Id::generate(), item.into()).await
    }

    async fn create_with_specified_id(&self, id: &Id, item: C) -> Result<()> {
        self.insert_model(id.clone(), item.into()).await.map(|_| ())
    }

    async fn create_with_specified_id_and_return(&self, id: &Id, item: C) -> Result<M> {
        self.insert_model(id.clone(), item.into()).await
    }

    async fn read(&self, id: &Id) -> Result<Option<M>> {
        StorageCounters::bump(&self.counters.reads);
        Ok(self.items.read().await.get(id).cloned())
    }

    async fn read_all(&self, limit: usize) -> Result<Vec<M>> {
        require_positive_limit(limit)?;
        StorageCounters::bump(&self.counters.collection_reads);
        Ok(self.items.read().await.values().take(limit).cloned().collect())
    }

    async fn read_all_with_paging(&self, offset: usize, limit: Option<usize>) -> Result<PageEnvelope<M>> {
        StorageCounters::bump(&self.counters.collection_reads);
        let items = self.items.read().await;
        paged(items.values().collect(), offset, limit)
    }

    async fn update(&self, id: &Id, item: M) -> Result<()> {
        self.update_and_return(id, item).await.map(|_| ())
    }

    async fn update_and_return(&self, id: &Id, mut item: M) -> Result<M> {
        item.set_id(id.clone());
        let mut items = self.items.write().await;
        match items.get_mut(id) {
            Some(stored) => {
                *stored = item.clone();
                StorageCounters::bump(&self.counters.updates);
                Ok(item)
            }
            None => Err(CacheError::NotFound(format!(
                "Update failed. Could not find an item with id {}",
                id
            ))),
        }
    }

    async fn delete(&self, id: &Id) -> Result<()> {
        StorageCounters::bump(&self.counters.deletes);
        self.items.write().await.remove(id);
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        StorageCounters::bump(&self.counters.deletes);
        self.items.write().await.clear();
        Ok(())
    }

    async fn claim_lock(&self, id: &Id) -> Result<Lock<Id>> {
        self.claim_distributed_lock(id, None, None).await
    }

    async fn release_lock(&self, id: &Id, lock_id: &Id) -> Result<()> {
        self.release_distributed_lock(id, lock_id).await
    }

    async fn claim_distributed_lock(
        &self,
        id: &Id,
        lock_time_span: Option<Duration>,
        current_lock_id: Option<&Id>,
    ) -> Result<Lock<Id>> {
        let valid_until = valid_until(lock_time_span.unwrap_or(DEFAULT_LOCK_DURATION))?;
        match self.locks.entry(id.clone()) {
            Entry::Occupied(mut entry) => {
                let held = entry.get();
                let ours = current_lock_id.map_or(false, |current| *current == held.lock_id);
                if held.is_valid() && !ours {
                    return Err(CacheError::Conflict(format!(
                        "Item {} is locked by someone else. The lock will be released before {}",
                        id, held.valid_until
                    )));
                }
                let lock_id = if ours { held.lock_id.clone() } else { Id::generate() };
                let lock = Lock {
                    item_id: id.clone(),
                    lock_id,
                    valid_until,
                };
                entry.insert(lock.clone());
                Ok(lock)
            }
            Entry::Vacant(entry) => {
                let lock = Lock {
                    item_id: id.clone(),
                    lock_id: Id::generate(),
                    valid_until,
                };
                entry.insert(lock.clone());
                Ok(lock)
            }
        }
    }

    async fn release_distributed_lock(&self, id: &Id, lock_id: &Id) -> Result<()> {
        if self.locks.remove_if(id, |_, lock| lock.lock_id == *lock_id).is_some() {
            return Ok(());
        }
        match self.locks.get(id) {
            Some(lock) if lock.is_valid() => Err(CacheError::Conflict(format!(
                "Item {} is locked with another lock id",
                id
            ))),
            _ => Ok(()),
        }
    }

    async fn claim_transaction_lock(&self, id: &Id) -> Result<()> {
        self.claim_lock(id).await.map(|_| ())
    }
}

// == Many To One Memory ==
/// A [`CrudManyToOne`] service kept in process memory.
pub struct ManyToOneMemory<C, M, Id> {
    crud: CrudMemory<C, M, Id>,
    parent_id: ParentIdFn<M, Id>,
}

impl<C, M, Id> ManyToOneMemory<C, M, Id>
where
    C: Into<M> + Send + 'static,
    M: UniquelyIdentifiable<Id> + Clone + Send + Sync + 'static,
    Id: StorageId,
{
    /// Creates an empty service; `parent_id` tells which parent an item belongs to.
    pub fn new<F>(parent_id: F) -> Self
    where
        F: Fn(&M) -> Id + Send + Sync + 'static,
    {
        Self {
            crud: CrudMemory::new(),
            parent_id: Arc::new(parent_id),
        }
    }

    pub fn stats(&self) -> StorageStats {
        self.crud.stats()
    }

    async fn children(&self, parent_id: &Id) -> Vec<M> {
        self.crud
            .values_where(|item| (self.parent_id)(item) == *parent_id)
            .await
    }

    fn child_of(&self, parent_id: &Id, item: C) -> Result<M> {
        let model: M = item.into();
        let actual = (self.parent_id)(&model);
        require(actual == *parent_id, || {
            format!("Item belongs to parent {}, not to parent {}", actual, parent_id)
        })?;
        Ok(model)
    }
}

#[async_trait]
impl<C, M, Id> Crud<C, M, Id> for ManyToOneMemory<C, M, Id>
where
    C: Into<M> + Send + 'static,
    M: UniquelyIdentifiable<Id> + Clone + Send + Sync + 'static,
    Id: StorageId,
{
    async fn create(&self, item: C) -> Result<Id> {
        self.crud.create(item).await
    }

    async fn create_and_return(&self, item: C) -> Result<M> {
        self.crud.create_and_return(item).await
    }

    async fn create_with_specified_id(&self, id: &Id, item: C) -> Result<()> {
        self.crud.create_with_specified_id(id, item).await
    }

    async fn create_with_specified_id_and_return(&self, id: &Id, item: C) -> Result<M> {
        self.crud.create_with_specified_id_and_return(id, item).await
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
        self.crud.update(id, item).await
    }

    async fn update_and_return(&self, id: &Id, item: M) -> Result<M> {
        self.crud.update_and_return(id, item).await
    }

    async fn delete(&self, id: &Id) -> Result<()> {
        self.crud.delete(id).await
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
impl<C, M, Id> CrudManyToOne<C, M, Id> for ManyToOneMemory<C, M, Id>
where
    C: Into<M> + Send + 'static,
    M: UniquelyIdentifiable<Id> + Clone + Send + Sync + 'static,
    Id: StorageId,
{
    async fn read_children(&self, parent_id: &Id, limit: usize) -> Result<Vec<M>> {
        require_positive_limit(limit)?;
        StorageCounters::bump(&self.crud.counters.collection_reads);
        let mut children = self.children(parent_id).await;
        children.truncate(limit);
        Ok(children)
    }

    async fn read_children_with_paging(
        &self,
        parent_id: &Id,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<PageEnvelope<M>> {
        StorageCounters::bump(&self.crud.counters.collection_reads);
        let children = self.children(parent_id).await;
        paged(children.iter().collect(), offset, limit)
    }

    async fn delete_children(&self, parent_id: &Id) -> Result<()> {
        StorageCounters::bump(&self.crud.counters.deletes);
        self.crud
            .items
            .write()
            .await
            .retain(|_, item| (self.parent_id)(&*item) != *parent_id);
        Ok(())
    }

    async fn create_child(&self, parent_id: &Id, item: C) -> Result<Id> {
        let model = self.child_of(parent_id, item)?;
        let id = Id::generate();
        self.crud.insert_model(id.clone(), model).await?;
        Ok(id)
    }

    async fn create_child_and_return(&self, parent_id: &Id, item: C) -> Result<M> {
        let model = self.child_of(parent_id, item)?;
        self.crud.insert_model(Id::generate(), model).await
    }

    async fn create_child_with_specified_id(&self, parent_id: &Id, child_id: &Id, item: C) -> Result<()> {
        let model = self.child_of(parent_id, item)?;
        self.crud.insert_model(child_id.clone(), model).await.map(|_| ())
    }

    async fn create_child_with_specified_id_and_return(
        &self,
        parent_id: &Id,
        child_id: &Id,
        item: C,
    ) -> Result<M> {
        let model = self.child_of(parent_id, item)?;
        self.crud.insert_model(child_id.clone(), model).await
    }
}

// == Slave To Master Memory ==
/// A [`CrudSlaveToMaster`] service kept in process memory.
pub struct SlaveToMasterMemory<C, M, Id> {
    items: RwLock<BTreeMap<SlaveToMasterId<Id>, M>>,
    locks: DashMap<SlaveToMasterId<Id>, SlaveLock<Id>>,
    counters: StorageCounters,
    _create: PhantomData<fn(C)>,
}

impl<C, M, Id> Default for SlaveToMasterMemory<C, M, Id>
where
    Id: StorageId,
{
    fn default() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            locks: DashMap::new(),
            counters: StorageCounters::default(),
            _create: PhantomData,
        }
    }
}

impl<C, M, Id> SlaveToMasterMemory<C, M, Id>
where
    C: Into<M> + Send + 'static,
    M: UniquelyIdentifiable<SlaveToMasterId<Id>> + Clone + Send + Sync + 'static,
    Id: StorageId,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> StorageStats {
        self.counters.snapshot()
    }

    async fn insert(&self, master_id: &Id, slave_id: Id, item: C) -> Result<M> {
        let id = SlaveToMasterId::new(master_id.clone(), slave_id);
        let mut model: M = item.into();
        model.set_id(id.clone());
        let mut items = self.items.write().await;
        if items.contains_key(&id) {
            return Err(CacheError::Conflict(format!("Item with id {} already exists", id)));
        }
        items.insert(id, model.clone());
        StorageCounters::bump(&self.counters.creates);
        Ok(model)
    }

    async fn children(&self, master_id: &Id) -> Vec<M> {
        self.items
            .read()
            .await
            .iter()
            .filter(|(id, _)| id.master_id == *master_id)
            .map(|(_, item)| item.clone())
            .collect()
    }
}

#[async_trait]
impl<C, M, Id> CrudSlaveToMaster<C, M, Id> for SlaveToMasterMemory<C, M, Id>
where
    C: Into<M> + Send + 'static,
    M: UniquelyIdentifiable<SlaveToMasterId<Id>> + Clone + Send + Sync + 'static,
    Id: StorageId,
{
    async fn create(&self, master_id: &Id, item: C) -> Result<Id> {
        let slave_id = Id::generate();
        self.insert(master_id, slave_id.clone(), item).await?;
        Ok(slave_id)
    }

    async fn create_and_return(&self, master_id: &Id, item: C) -> Result<M> {
        self.insert(master_id, Id::generate(), item).await
    }

    async fn create_with_specified_id(&self, master_id: &Id, slave_id: &Id, item: C) -> Result<()> {
        self.insert(master_id, slave_id.clone(), item).await.map(|_| ())
    }

    async fn create_with_specified_id_and_return(
        &self,
        master_id: &Id,
        slave_id: &Id,
        item: C,
    ) -> Result<M> {
        self.insert(master_id, slave_id.clone(), item).await
    }

    async fn read(&self, master_id: &Id, slave_id: &Id) -> Result<Option<M>> {
        StorageCounters::bump(&self.counters.reads);
        let id = SlaveToMasterId::new(master_id.clone(), slave_id.clone());
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn read_children(&self, master_id: &Id, limit: usize) -> Result<Vec<M>> {
        require_positive_limit(limit)?;
        StorageCounters::bump(&self.counters.collection_reads);
        let mut children = self.children(master_id).await;
        children.truncate(limit);
        Ok(children)
    }

    async fn read_children_with_paging(
        &self,
        master_id: &Id,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<PageEnvelope<M>> {
        StorageCounters::bump(&self.counters.collection_reads);
        let children = self.children(master_id).await;
        paged(children.iter().collect(), offset, limit)
    }

    async fn update(&self, master_id: &Id, slave_id: &Id, item: M) -> Result<()> {
        self.update_and_return(master_id, slave_id, item).await.map(|_| ())
    }

    async fn update_and_return(&self, master_id: &Id, slave_id: &Id, mut item: M) -> Result<M> {
        let id = SlaveToMasterId::new(master_id.clone(), slave_id.clone());
        item.set_id(id.clone());
        let mut items = self.items.write().await;
        match items.get_mut(&id) {
            Some(stored) => {
                *stored = item.clone();
                StorageCounters::bump(&self.counters.updates);
                Ok(item)
            }
            None => Err(CacheError::NotFound(format!(
                "Update failed. Could not find an item with id {}",
                id
            ))),
        }
    }

    async fn delete(&self, master_id: &Id, slave_id: &Id) -> Result<()> {
        StorageCounters::bump(&self.counters.deletes);
        let id = SlaveToMasterId::new(master_id.clone(), slave_id.clone());
        self.items.write().await.remove(&id);
        Ok(())
    }

    async fn delete_children(&self, master_id: &Id) -> Result<()> {
        StorageCounters::bump(&self.counters.deletes);
        self.items
            .write()
            .await
            .retain(|id, _| id.master_id != *master_id);
        Ok(())
    }

    async fn claim_lock(&self, master_id: &Id, slave_id: &Id) -> Result<SlaveLock<Id>> {
        let id = SlaveToMasterId::new(master_id.clone(), slave_id.clone());
        let valid_until = valid_until(DEFAULT_LOCK_DURATION)?;
        let lock = SlaveLock {
            master_id: master_id.clone(),
            slave_id: slave_id.clone(),
            lock_id: Id::generate(),
            valid_until,
        };
        match self.locks.entry(id.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_valid() {
                    return Err(CacheError::Conflict(format!(
                        "Item {} is locked by someone else. The lock will be released before {}",
                        id,
                        entry.get().valid_until
                    )));
                }
                entry.insert(lock.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(lock.clone());
            }
        }
        Ok(lock)
    }

    async fn release_lock(&self, master_id: &Id, slave_id: &Id, lock_id: &Id) -> Result<()> {
        let id = SlaveToMasterId::new(master_id.clone(), slave_id.clone());
        if self.locks.remove_if(&id, |_, lock| lock.lock_id == *lock_id).is_some() {
            return Ok(());
        }
        match self.locks.get(&id) {
            Some(lock) if lock.is_valid() => Err(CacheError::Conflict(format!(
                "Item {} is locked with another lock id",
                id
            ))),
            _ => Ok(()),
        }
    }

    async fn claim_distributed_lock(&self, master_id: &Id, slave_id: &Id) -> Result<SlaveLock<Id>> {
        self.claim_lock(master_id, slave_id).await
    }

    async fn release_distributed_lock(&self, master_id: &Id, slave_id: &Id, lock_id: &Id) -> Result<()> {
        self.release_lock(master_id, slave_id, lock_id).await
    }

    async fn claim_transaction_lock(&self, master_id: &Id, slave_id: &Id) -> Result<()> {
        self.claim_lock(master_id, slave_id).await.map(|_| ())
    }
}
