//! Cache-aside retrieval.
//!
//! One request runs through at most one cache read, one backing-store query and
//! one cache write:
//!
//! 1. Encode the template into its [`CacheKey`] and translate it into SQL.
//!    Invalid templates fail here, before any I/O.
//! 2. If the policy allows a read for this request, look the key up. A hit
//!    that deserializes is returned as-is.
//! 3. Otherwise query the backing store. An empty result is returned without
//!    touching the cache. A non-empty result is written back when the policy
//!    allows writes, whether or not this request read the cache.
//!
//! Cache failures (unreachable service, timeouts, undecodable payloads) are
//! logged and counted, and the request carries on against the backing store.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use rowcache_types::{RetrievalReport, RetrievalSource};
use tracing::{debug, info, instrument, warn};

use crate::cache::{self, CacheKey, CachePolicy, CacheStore};
use crate::domain::{QueryTemplate, ResultSet};

use super::error::RetrieveError;
use super::executor::{ExecError, QueryExecutor};
use super::maintenance::{CacheMaintenance, bounded, millis};
use super::query::{self, TranslatedQuery};

pub const METRIC_CACHE_HIT_TOTAL: &str = "rowcache_cache_hit_total";
pub const METRIC_CACHE_MISS_TOTAL: &str = "rowcache_cache_miss_total";
pub const METRIC_CACHE_BYPASS_TOTAL: &str = "rowcache_cache_bypass_total";
pub const METRIC_CACHE_ERROR_TOTAL: &str = "rowcache_cache_error_total";
pub const METRIC_CACHE_POPULATE_TOTAL: &str = "rowcache_cache_populate_total";
pub const METRIC_STORE_QUERY_MS: &str = "rowcache_store_query_ms";
pub const METRIC_STORE_EMPTY_TOTAL: &str = "rowcache_store_empty_total";

const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrieveSettings {
    pub policy: CachePolicy,
    pub cache_timeout: Duration,
    pub query_timeout: Duration,
}

impl Default for RetrieveSettings {
    fn default() -> Self {
        Self {
            policy: CachePolicy::default(),
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub key: CacheKey,
    pub source: RetrievalSource,
    /// Whether this request wrote the result into the cache.
    pub populated: bool,
    pub rows: ResultSet,
}

impl Retrieval {
    pub fn is_hit(&self) -> bool {
        self.source == RetrievalSource::Cache
    }

    /// Nothing matched the template.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_report(self) -> RetrievalReport {
        RetrievalReport {
            key: self.key.into_string(),
            source: self.source,
            populated: self.populated,
            rows: self.rows,
        }
    }
}

/// Coordinates the cache and the backing store for template retrieval.
///
/// Cheap to clone; clones share the executor's pool and the cache connection.
#[derive(Clone)]
pub struct CacheAsideCoordinator {
    executor: Arc<dyn QueryExecutor>,
    cache: Arc<dyn CacheStore>,
    settings: RetrieveSettings,
}

impl CacheAsideCoordinator {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        cache: Arc<dyn CacheStore>,
        settings: RetrieveSettings,
    ) -> Self {
        Self {
            executor,
            cache,
            settings,
        }
    }

    pub fn settings(&self) -> &RetrieveSettings {
        &self.settings
    }

    #[instrument(skip(self, template), fields(table = %template.table))]
    pub async fn retrieve(
        &self,
        template: &QueryTemplate,
        use_cache: bool,
    ) -> Result<Retrieval, RetrieveError> {
        let key = cache::encode(template)
            .map_err(|source| RetrieveError::invalid_template(template, source))?;
        let query = query::translate(template)
            .map_err(|source| RetrieveError::invalid_template(template, source))?;

        let read_cache = self.settings.policy.reads(use_cache);
        if read_cache {
            if let Some(rows) = self.lookup(&key).await {
                counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
                info!(key = %key, rows = rows.len(), outcome = "hit", "Served from cache");
                return Ok(Retrieval {
                    key,
                    source: RetrievalSource::Cache,
                    populated: false,
                    rows,
                });
            }
            counter!(METRIC_CACHE_MISS_TOTAL).increment(1);
        } else {
            counter!(METRIC_CACHE_BYPASS_TOTAL).increment(1);
            debug!(key = %key, use_cache, policy = %self.settings.policy, "Cache read bypassed");
        }

        let rows = self.run_query(template, &key, &query).await?;

        if rows.is_empty() {
            counter!(METRIC_STORE_EMPTY_TOTAL).increment(1);
            info!(key = %key, outcome = "empty", "No rows matched the template");
            return Ok(Retrieval {
                key,
                source: RetrievalSource::Store,
                populated: false,
                rows,
            });
        }

        let populated = self.settings.policy.writes() && self.populate(&key, &rows).await;
        info!(
            key = %key,
            rows = rows.len(),
            populated,
            outcome = if read_cache { "miss" } else { "bypass" },
            "Served from backing store"
        );

        Ok(Retrieval {
            key,
            source: RetrievalSource::Store,
            populated,
            rows,
        })
    }

    /// Cache-only maintenance sharing this coordinator's store and timeout.
    pub fn maintenance(&self) -> CacheMaintenance {
        CacheMaintenance::new(Arc::clone(&self.cache), self.settings.cache_timeout)
    }

    /// Every key currently held by the cache.
    pub async fn list_keys(&self) -> Result<BTreeSet<CacheKey>, RetrieveError> {
        self.maintenance().list_keys().await
    }

    /// Delete every key in the cache and return how many were removed.
    pub async fn flush(&self) -> Result<u64, RetrieveError> {
        self.maintenance().flush().await
    }

    async fn lookup(&self, key: &CacheKey) -> Option<ResultSet> {
        match bounded(self.settings.cache_timeout, "get", self.cache.get(key)).await {
            Ok(Some(payload)) => match serde_json::from_str::<ResultSet>(&payload) {
                Ok(rows) => Some(rows),
                Err(err) => {
                    counter!(METRIC_CACHE_ERROR_TOTAL).increment(1);
                    warn!(key = %key, error = %err, "Discarding undecodable cache payload");
                    None
                }
            },
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                None
            }
            Err(err) => {
                counter!(METRIC_CACHE_ERROR_TOTAL).increment(1);
                warn!(key = %key, error = %err, "Cache read failed; falling back to backing store");
                None
            }
        }
    }

    async fn run_query(
        &self,
        template: &QueryTemplate,
        key: &CacheKey,
        query: &TranslatedQuery,
    ) -> Result<ResultSet, RetrieveError> {
        debug!(sql = %query.sql, params = query.params.len(), "Executing backing-store query");

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.settings.query_timeout, self.executor.execute(query))
            .await;
        let elapsed = started.elapsed();
        histogram!(METRIC_STORE_QUERY_MS).record(elapsed.as_secs_f64() * 1000.0);
        debug!(key = %key, elapsed_ms = millis(elapsed), "Backing-store query finished");

        match outcome {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(source)) => Err(RetrieveError::backing_store(template, key, source)),
            Err(_) => Err(RetrieveError::backing_store(
                template,
                key,
                ExecError::Timeout {
                    timeout_ms: millis(self.settings.query_timeout),
                },
            )),
        }
    }

    async fn populate(&self, key: &CacheKey, rows: &ResultSet) -> bool {
        let payload = match serde_json::to_string(rows) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(key = %key, error = %err, "Could not serialize rows for the cache");
                return false;
            }
        };

        match bounded(self.settings.cache_timeout, "set", self.cache.set(key, &payload)).await {
            Ok(true) => {
                counter!(METRIC_CACHE_POPULATE_TOTAL).increment(1);
                debug!(key = %key, bytes = payload.len(), "Cache populated");
                true
            }
            Ok(false) => {
                warn!(key = %key, "Cache did not acknowledge write");
                false
            }
            Err(err) => {
                counter!(METRIC_CACHE_ERROR_TOTAL).increment(1);
                warn!(key = %key, error = %err, "Cache write failed");
                false
            }
        }
    }
}
