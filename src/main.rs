//! AutoCache demo - runs the Widget scenario against in-memory services
//!
//! Creates a widget, reads it from the cache, lets the cached copy expire,
//! reads it again through the backing service and finally deletes it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crud_autocache::models::UniquelyIdentifiable;
use crud_autocache::{
    spawn_cleanup_task, AutoCacheOptions, Config, Crud, CrudAutoCache, CrudMemory,
    MemoryDistributedCache,
};

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

#[tokio::main]
async fn main() -> Result<()> {
    // Defaults to "crud_autocache=info", can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crud_autocache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let expiration = Duration::from_secs(1);
    let options = AutoCacheOptions::from_env().with_absolute_expiration(Some(expiration));
    info!(
        "Configuration loaded: cleanup_interval={}s, max_value_size={}, options={:?}",
        config.cleanup_interval, config.max_value_size, options
    );

    let store = MemoryDistributedCache::from_config(&config);
    let cleanup_handle = spawn_cleanup_task(store.store(), config.cleanup_interval);

    let storage: Arc<CrudMemory<Widget, Widget, i64>> = Arc::new(CrudMemory::new());
    let widgets = CrudAutoCache::for_identifiable(storage.clone(), Arc::new(store.clone()), options);

    // (a) Create and cache
    let created = widgets
        .create_with_specified_id_and_return(
            &1,
            Widget {
                id: 1,
                name: "A".to_string(),
            },
        )
        .await
        .context("creating widget 1")?;
    info!("Created {:?}", created);

    // (b) Served by the cache
    let read = widgets.read(&1).await?.context("widget 1 missing")?;
    ensure!(read == created, "cached widget differs from the created one");
    ensure!(storage.stats().reads == 0, "read was not served from the cache");
    info!("Read {:?} without touching the backing service", read);

    // (c) Expired, read through again
    tokio::time::sleep(expiration + Duration::from_millis(200)).await;
    let reread = widgets.read(&1).await?.context("widget 1 missing")?;
    ensure!(storage.stats().reads == 1, "expired entry was still served");
    info!("Read {:?} through the backing service after expiry", reread);

    // (d) Gone from both
    widgets.delete(&1).await.context("deleting widget 1")?;
    ensure!(storage.read(&1).await?.is_none(), "widget 1 still stored");
    ensure!(
        !widgets.cache().cache_item_exists(&1).await?,
        "widget 1 still cached"
    );
    info!("Deleted widget 1");

    info!(
        "Cache stats: {:?}, store stats: {:?}",
        widgets.cache().stats(),
        store.stats().await
    );

    cleanup_handle.abort();
    Ok(())
}
