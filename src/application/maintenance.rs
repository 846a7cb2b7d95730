//! Cache maintenance: listing and flushing keys.
//!
//! Only the cache is involved, so this service can be built without any
//! backing-store configuration.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::cache::{CacheError, CacheKey, CacheStore};

use super::error::RetrieveError;

#[derive(Clone)]
pub struct CacheMaintenance {
    cache: Arc<dyn CacheStore>,
    timeout: Duration,
}

impl CacheMaintenance {
    pub fn new(cache: Arc<dyn CacheStore>, timeout: Duration) -> Self {
        Self { cache, timeout }
    }

    /// Every key currently held by the cache.
    pub async fn list_keys(&self) -> Result<BTreeSet<CacheKey>, RetrieveError> {
        bounded(self.timeout, "list_keys", self.cache.list_keys())
            .await
            .map_err(|source| RetrieveError::cache_unavailable("list_keys", source))
    }

    /// Delete every key in the cache and return how many were removed.
    pub async fn flush(&self) -> Result<u64, RetrieveError> {
        let keys: Vec<CacheKey> = self.list_keys().await?.into_iter().collect();
        if keys.is_empty() {
            debug!("Cache already empty");
            return Ok(0);
        }

        let removed = bounded(self.timeout, "delete_many", self.cache.delete_many(&keys))
            .await
            .map_err(|source| RetrieveError::cache_unavailable("delete_many", source))?;
        info!(listed = keys.len(), removed, "Flushed cache");
        Ok(removed)
    }
}

/// Run a cache call under `timeout`, mapping expiry to [`CacheError::Timeout`].
pub(crate) async fn bounded<T, F>(
    timeout: Duration,
    op: &'static str,
    fut: F,
) -> Result<T, CacheError>
where
    F: Future<Output = Result<T, CacheError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::Timeout {
            op,
            timeout_ms: millis(timeout),
        }),
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
