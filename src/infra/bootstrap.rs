//! Builds the runtime services from resolved settings.
//!
//! Nothing here opens a network connection. The Postgres pool and the Redis
//! connection are both established on first use, so a retrieval served from
//! the cache never touches Postgres and maintenance needs no database at all.

use std::sync::Arc;

use tracing::{info, warn};

use crate::application::{CacheAsideCoordinator, CacheMaintenance, QueryExecutor};
use crate::cache::{CacheStore, MemoryCacheStore};
use crate::config::{CacheBackend, CacheSettings, DatabaseSettings, Settings};

use super::db::PostgresExecutor;
use super::error::InfraError;
use super::redis::RedisCacheStore;

pub fn coordinator(settings: &Settings) -> Result<CacheAsideCoordinator, InfraError> {
    let executor = executor(&settings.database)?;
    let cache = cache_store(&settings.cache)?;
    let retrieve = settings.retrieve_settings();
    info!(
        policy = %retrieve.policy,
        cache_timeout_ms = retrieve.cache_timeout.as_millis() as u64,
        query_timeout_ms = retrieve.query_timeout.as_millis() as u64,
        "Cache-aside coordinator ready"
    );
    Ok(CacheAsideCoordinator::new(executor, cache, retrieve))
}

/// Maintenance over the configured cache. `database.url` may be unset.
pub fn maintenance(settings: &Settings) -> Result<CacheMaintenance, InfraError> {
    let cache = cache_store(&settings.cache)?;
    Ok(CacheMaintenance::new(cache, settings.cache.timeout))
}

/// Lazy pool: connection failures surface per query, with `acquire_timeout`
/// bounding each wait.
pub fn executor(settings: &DatabaseSettings) -> Result<Arc<dyn QueryExecutor>, InfraError> {
    let url = settings
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresExecutor::connect_lazy(
        url,
        settings.max_connections.get(),
        settings.acquire_timeout,
    )
    .map_err(|err| InfraError::configuration(format!("invalid database url: {err}")))?;

    Ok(Arc::new(PostgresExecutor::new(pool)))
}

pub fn cache_store(settings: &CacheSettings) -> Result<Arc<dyn CacheStore>, InfraError> {
    match settings.backend {
        CacheBackend::Memory => {
            warn!("Using the process-local memory cache; entries are lost on exit");
            Ok(Arc::new(MemoryCacheStore::new()))
        }
        CacheBackend::Redis => {
            let store = RedisCacheStore::open(&settings.url)
                .map_err(|err| InfraError::configuration(format!("invalid cache url: {err}")))?;
            Ok(Arc::new(store))
        }
    }
}
