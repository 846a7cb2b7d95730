//! Key-value cache interface and the in-process implementation.
//!
//! [`CacheStore`] is the minimal contract the cache-aside layer needs from a
//! cache service: get, unconditional set, key listing and bulk delete. The
//! Redis adapter lives in `infra::redis`; [`MemoryCacheStore`] keeps entries in
//! process and backs the `memory` cache backend and the test suites.

use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use super::keys::CacheKey;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache service unavailable: {message}")]
    Unavailable { message: String },
    #[error("cache operation `{op}` timed out after {timeout_ms} ms")]
    Timeout { op: &'static str, timeout_ms: u64 },
}

impl CacheError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: err.to_string(),
        }
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// `Ok(None)` is a miss. `Ok(Some(""))` is a hit on an empty payload.
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError>;

    /// Overwrite unconditionally. Returns whether the service acknowledged the write.
    async fn set(&self, key: &CacheKey, payload: &str) -> Result<bool, CacheError>;

    async fn list_keys(&self) -> Result<BTreeSet<CacheKey>, CacheError>;

    /// Returns the number of keys that existed and were removed.
    async fn delete_many(&self, keys: &[CacheKey]) -> Result<u64, CacheError>;
}

/// In-process cache backed by a `HashMap` behind an `RwLock`.
///
/// Writers replace whole entries under the write lock, so concurrent `set`
/// calls on one key resolve to whichever ran last.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<CacheKey, String>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read("len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.read("contains").contains_key(key)
    }

    // A panic while holding the lock leaves whole entries behind, never a
    // half-written one, so a poisoned map is still usable.
    fn read(&self, op: &'static str) -> RwLockReadGuard<'_, HashMap<CacheKey, String>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!(op, lock_kind = "rwlock.read", "Recovered poisoned memory cache lock");
            poisoned.into_inner()
        })
    }

    fn write(&self, op: &'static str) -> RwLockWriteGuard<'_, HashMap<CacheKey, String>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!(op, lock_kind = "rwlock.write", "Recovered poisoned memory cache lock");
            poisoned.into_inner()
        })
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        Ok(self.read("get").get(key).cloned())
    }

    async fn set(&self, key: &CacheKey, payload: &str) -> Result<bool, CacheError> {
        self.write("set").insert(key.clone(), payload.to_string());
        Ok(true)
    }

    async fn list_keys(&self) -> Result<BTreeSet<CacheKey>, CacheError> {
        Ok(self.read("list_keys")
            .keys()
            .cloned()
            .collect())
    }

    async fn delete_many(&self, keys: &[CacheKey]) -> Result<u64, CacheError> {
        let mut entries = self.write("delete_many");
        let removed = keys
            .iter()
            .filter(|key| entries.remove(*key).is_some())
            .count();
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::Arc;

    use super::*;

    fn key(raw: &str) -> CacheKey {
        CacheKey::from(raw.to_string())
    }

    #[tokio::test]
    async fn miss_and_empty_hit_are_distinct() {
        let store = MemoryCacheStore::new();
        let k = key("players/team_id=NYA");

        assert_eq!(store.get(&k).await, Ok(None));

        assert_eq!(store.set(&k, "").await, Ok(true));
        assert_eq!(store.get(&k).await, Ok(Some(String::new())));
    }

    #[tokio::test]
    async fn set_overwrites_unconditionally() {
        let store = MemoryCacheStore::new();
        let k = key("teams/");
        store.set(&k, "[1]").await.expect("set");
        store.set(&k, "[2]").await.expect("set");
        assert_eq!(store.get(&k).await, Ok(Some("[2]".to_string())));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn list_and_delete_many() {
        let store = MemoryCacheStore::new();
        for raw in ["a/", "b/", "c/"] {
            store.set(&key(raw), "[]").await.expect("set");
        }

        let keys = store.list_keys().await.expect("list");
        let listed: Vec<&str> = keys.iter().map(CacheKey::as_str).collect();
        assert_eq!(listed, ["a/", "b/", "c/"]);

        let all: Vec<CacheKey> = keys.into_iter().chain([key("missing/")]).collect();
        assert_eq!(store.delete_many(&all).await, Ok(3));
        assert!(store.is_empty());
        assert_eq!(store.delete_many(&[]).await, Ok(0));
    }

    #[tokio::test]
    async fn concurrent_writers_leave_one_whole_entry() {
        let store = Arc::new(MemoryCacheStore::new());
        let k = key("people/nameLast=Ruth");

        let writers = (0..32).map(|i| {
            let store = Arc::clone(&store);
            let k = k.clone();
            tokio::spawn(async move {
                let payload = format!("[{{\"writer\":{i}}}]");
                store.set(&k, &payload).await
            })
        });
        for handle in futures::future::join_all(writers).await {
            assert_eq!(handle.expect("writer task"), Ok(true));
        }

        let payload = store.get(&k).await.expect("get").expect("present");
        let rows: Vec<serde_json::Value> =
            serde_json::from_str(&payload).expect("entry is never torn");
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn store_recovers_from_poisoned_lock() {
        let store = MemoryCacheStore::new();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        assert_eq!(store.len(), 0);
        assert!(!store.contains(&key("x/")));
    }
}
