//! Backing service contracts
//!
//! The CRUD surfaces the auto-cache decorators wrap. `C` is the shape an
//! item is created from, `M` the stored model and `Id` its id.

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CacheError, Result};
use crate::models::{Lock, PageEnvelope, SlaveLock};

/// Create, read, update, delete and lock items of one model.
#[async_trait]
pub trait Crud<C, M, Id>: Send + Sync
where
    C: Send + 'static,
    M: Send + 'static,
    Id: Display + Send + Sync + 'static,
{
    /// Creates an item and returns its new id.
    async fn create(&self, item: C) -> Result<Id>;

    /// Creates an item and returns it as stored.
    async fn create_and_return(&self, item: C) -> Result<M>;

    /// Creates an item with a caller-chosen id.
    async fn create_with_specified_id(&self, id: &Id, item: C) -> Result<()>;

    async fn create_with_specified_id_and_return(&self, id: &Id, item: C) -> Result<M>;

    /// Returns the item, or None if there is no item with that id.
    async fn read(&self, id: &Id) -> Result<Option<M>>;

    /// Returns at most `limit` items.
    async fn read_all(&self, limit: usize) -> Result<Vec<M>>;

    /// Returns one page of items; `limit` defaults to [`PageInfo::DEFAULT_LIMIT`](crate::models::PageInfo::DEFAULT_LIMIT).
    async fn read_all_with_paging(&self, offset: usize, limit: Option<usize>) -> Result<PageEnvelope<M>>;

    async fn update(&self, id: &Id, item: M) -> Result<()>;

    async fn update_and_return(&self, id: &Id, item: M) -> Result<M>;

    async fn delete(&self, id: &Id) -> Result<()>;

    async fn delete_all(&self) -> Result<()>;

    /// Claims the item's lock for the default duration.
    async fn claim_lock(&self, id: &Id) -> Result<Lock<Id>>;

    async fn release_lock(&self, id: &Id, lock_id: &Id) -> Result<()>;

    /// Claims the item's lock, or extends it when `current_lock_id` already holds it.
    async fn claim_distributed_lock(
        &self,
        id: &Id,
        lock_time_span: Option<Duration>,
        current_lock_id: Option<&Id>,
    ) -> Result<Lock<Id>>;

    async fn release_distributed_lock(&self, id: &Id, lock_id: &Id) -> Result<()>;

    /// Claims a lock that lasts until the surrounding transaction ends.
    async fn claim_transaction_lock(&self, id: &Id) -> Result<()>;

    /// Claims the transaction lock, then reads the item.
    async fn claim_transaction_lock_and_read(&self, id: &Id) -> Result<M> {
        self.claim_transaction_lock(id).await?;
        self.read(id)
            .await?
            .ok_or_else(|| CacheError::NotFound(format!("Item {} not found", id)))
    }
}

/// A [`Crud`] whose items each belong to a parent item.
#[async_trait]
pub trait CrudManyToOne<C, M, Id>: Crud<C, M, Id>
where
    C: Send + 'static,
    M: Send + 'static,
    Id: Display + Send + Sync + 'static,
{
    /// Returns at most `limit` children of `parent_id`.
    async fn read_children(&self, parent_id: &Id, limit: usize) -> Result<Vec<M>>;

    async fn read_children_with_paging(
        &self,
        parent_id: &Id,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<PageEnvelope<M>>;

    async fn delete_children(&self, parent_id: &Id) -> Result<()>;

    async fn create_child(&self, parent_id: &Id, item: C) -> Result<Id>;

    async fn create_child_and_return(&self, parent_id: &Id, item: C) -> Result<M>;

    async fn create_child_with_specified_id(&self, parent_id: &Id, child_id: &Id, item: C) -> Result<()>;

    async fn create_child_with_specified_id_and_return(
        &self,
        parent_id: &Id,
        child_id: &Id,
        item: C,
    ) -> Result<M>;
}

/// Items that only exist under a master item and are addressed by
/// `(master_id, slave_id)`.
#[async_trait]
pub trait CrudSlaveToMaster<C, M, Id>: Send + Sync
where
    C: Send + 'static,
    M: Send + 'static,
    Id: Display + Send + Sync + 'static,
{
    /// Creates an item under `master_id` and returns its slave id.
    async fn create(&self, master_id: &Id, item: C) -> Result<Id>;

    async fn create_and_return(&self, master_id: &Id, item: C) -> Result<M>;

    async fn create_with_specified_id(&self, master_id: &Id, slave_id: &Id, item: C) -> Result<()>;

    async fn create_with_specified_id_and_return(
        &self,
        master_id: &Id,
        slave_id: &Id,
        item: C,
    ) -> Result<M>;

    async fn read(&self, master_id: &Id, slave_id: &Id) -> Result<Option<M>>;

    async fn read_children(&self, master_id: &Id, limit: usize) -> Result<Vec<M>>;

    async fn read_children_with_paging(
        &self,
        master_id: &Id,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<PageEnvelope<M>>;

    async fn update(&self, master_id: &Id, slave_id: &Id, item: M) -> Result<()>;

    async fn update_and_return(&self, master_id: &Id, slave_id: &Id, item: M) -> Result<M>;

    async fn delete(&self, master_id: &Id, slave_id: &Id) -> Result<()>;

    async fn delete_children(&self, master_id: &Id) -> Result<()>;

    async fn claim_lock(&self, master_id: &Id, slave_id: &Id) -> Result<SlaveLock<Id>>;

    async fn release_lock(&self, master_id: &Id, slave_id: &Id, lock_id: &Id) -> Result<()>;

    async fn claim_distributed_lock(&self, master_id: &Id, slave_id: &Id) -> Result<SlaveLock<Id>>;

    async fn release_distributed_lock(&self, master_id: &Id, slave_id: &Id, lock_id: &Id) -> Result<()>;

    async fn claim_transaction_lock(&self, master_id: &Id, slave_id: &Id) -> Result<()>;

    async fn claim_transaction_lock_and_read(&self, master_id: &Id, slave_id: &Id) -> Result<M> {
        self.claim_transaction_lock(master_id, slave_id).await?;
        self.read(master_id, slave_id).await?.ok_or_else(|| {
            CacheError::NotFound(format!("Item {}/{} not found", master_id, slave_id))
        })
    }
}
