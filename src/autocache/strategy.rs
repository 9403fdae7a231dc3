//! Cache Strategy Hooks
//!
//! Two optional decisions an application can plug into an auto-cache:
//! whether to look in the cache at all, and what to do with a particular
//! cached item once it has been found.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// What to do with a cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseCacheStrategy {
    /// Return the cached value
    Use,
    /// Pretend it is not there, but leave it in the store
    Ignore,
    /// Evict it and report a miss
    Remove,
}

/// Metadata about a cached item, handed to a [`UseCacheStrategyMethod`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedItemInformation<Id> {
    pub id: Id,
    pub written_at: DateTime<Utc>,
}

/// The shape of value a lookup is about to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachedValueKind {
    Item,
    Collection,
    Page,
}

/// Decides, per cached item, whether a fresh and current value may be used.
///
/// Only consulted for lookups by id, and only after the generation and age
/// checks have passed.
#[async_trait]
pub trait UseCacheStrategyMethod<Id>: Send + Sync {
    async fn use_cache_strategy(&self, info: &CachedItemInformation<Id>) -> Result<UseCacheStrategy>;
}

/// Decides whether the cache is consulted at all for a kind of value.
#[async_trait]
pub trait UseCacheAtAll: Send + Sync {
    async fn use_cache_at_all(&self, kind: CachedValueKind) -> Result<bool>;
}

/// Always returns the same verdict.
#[derive(Debug, Clone, Copy)]
pub struct FixedStrategy(pub UseCacheStrategy);

#[async_trait]
impl<Id: Send + Sync> UseCacheStrategyMethod<Id> for FixedStrategy {
    async fn use_cache_strategy(&self, _info: &CachedItemInformation<Id>) -> Result<UseCacheStrategy> {
        Ok(self.0)
    }
}

/// Adapts a synchronous closure into a [`UseCacheStrategyMethod`].
pub struct StrategyFn<F>(pub F);

#[async_trait]
impl<Id, F> UseCacheStrategyMethod<Id> for StrategyFn<F>
where
    Id: Send + Sync,
    F: Fn(&CachedItemInformation<Id>) -> UseCacheStrategy + Send + Sync,
{
    async fn use_cache_strategy(&self, info: &CachedItemInformation<Id>) -> Result<UseCacheStrategy> {
        Ok((self.0)(info))
    }
}

/// Adapts a synchronous closure into a [`UseCacheAtAll`].
pub struct UseCacheAtAllFn<F>(pub F);

#[async_trait]
impl<F> UseCacheAtAll for UseCacheAtAllFn<F>
where
    F: Fn(CachedValueKind) -> bool + Send + Sync,
{
    async fn use_cache_at_all(&self, kind: CachedValueKind) -> Result<bool> {
        Ok((self.0)(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: u32) -> CachedItemInformation<u32> {
        CachedItemInformation {
            id,
            written_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_fixed_strategy() {
        let strategy = FixedStrategy(UseCacheStrategy::Ignore);
        assert_eq!(
            strategy.use_cache_strategy(&info(1)).await.unwrap(),
            UseCacheStrategy::Ignore
        );
    }

    #[tokio::test]
    async fn test_closure_strategy_sees_id() {
        let strategy = StrategyFn(|info: &CachedItemInformation<u32>| {
            if info.id % 2 == 0 {
                UseCacheStrategy::Use
            } else {
                UseCacheStrategy::Remove
            }
        });
        assert_eq!(
            strategy.use_cache_strategy(&info(2)).await.unwrap(),
            UseCacheStrategy::Use
        );
        assert_eq!(
            strategy.use_cache_strategy(&info(3)).await.unwrap(),
            UseCacheStrategy::Remove
        );
    }

    #[tokio::test]
    async fn test_use_cache_at_all_closure() {
        let hook = UseCacheAtAllFn(|kind| kind == CachedValueKind::Item);
        assert!(hook.use_cache_at_all(CachedValueKind::Item).await.unwrap());
        assert!(!hook.use_cache_at_all(CachedValueKind::Page).await.unwrap());
    }
}
