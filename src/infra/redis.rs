//! Redis adapter for [`CacheStore`].

use std::collections::BTreeSet;

use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::cache::{CacheError, CacheKey, CacheStore};

const SCAN_BATCH: usize = 500;
const DELETE_BATCH: usize = 500;

/// Cache store backed by a Redis server.
///
/// The connection is established on first use, so an unreachable server turns
/// into per-call [`CacheError::Unavailable`] results rather than a startup
/// failure. Once up, `ConnectionManager` multiplexes the connection and
/// reconnects on its own.
pub struct RedisCacheStore {
    client: Client,
    manager: OnceCell<ConnectionManager>,
}

impl RedisCacheStore {
    /// Parse the URL without connecting.
    pub fn open(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(CacheError::unavailable)?;
        Ok(Self {
            client,
            manager: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        self.manager
            .get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone()).await?;
                info!("Connected to cache service");
                Ok::<_, redis::RedisError>(manager)
            })
            .await
            .cloned()
            .map_err(CacheError::unavailable)
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(CacheError::unavailable)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<String>>(key.as_str())
            .await
            .map_err(CacheError::unavailable)
    }

    async fn set(&self, key: &CacheKey, payload: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let reply = conn
            .set::<_, _, Option<String>>(key.as_str(), payload)
            .await
            .map_err(CacheError::unavailable)?;
        Ok(reply.as_deref() == Some("OK"))
    }

    async fn list_keys(&self) -> Result<BTreeSet<CacheKey>, CacheError> {
        let mut conn = self.connection().await?;
        let mut keys = BTreeSet::new();
        // Explicit cursor so a failed page surfaces as an error.
        let mut cursor: u64 = 0;
        loop {
            let (next, batch) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async::<(u64, Vec<String>)>(&mut conn)
                .await
                .map_err(CacheError::unavailable)?;
            keys.extend(batch.into_iter().map(CacheKey::from));
            if next == 0 {
                break;
            }
            cursor = next;
        }
        debug!(count = keys.len(), "Scanned cache keys");
        Ok(keys)
    }

    async fn delete_many(&self, keys: &[CacheKey]) -> Result<u64, CacheError> {
        let mut conn = self.connection().await?;
        let mut removed = 0;
        for chunk in keys.chunks(DELETE_BATCH) {
            let names: Vec<&str> = chunk.iter().map(CacheKey::as_str).collect();
            removed += conn
                .del::<_, u64>(names)
                .await
                .map_err(CacheError::unavailable)?;
        }
        Ok(removed)
    }
}
