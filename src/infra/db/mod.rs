//! Postgres-backed query executor.

mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{
    Postgres,
    postgres::{PgPool, PgPoolOptions},
    query, query_scalar,
};
use tracing::debug;

use crate::application::{ExecError, QueryExecutor, TranslatedQuery};
use crate::domain::{ResultSet, Row};

/// Runs translated queries against a pooled Postgres connection.
///
/// Each row is rendered by the server as a JSON object (`to_jsonb`), so column
/// names and values come back without per-table decoding.
#[derive(Clone)]
pub struct PostgresExecutor {
    pool: Arc<PgPool>,
}

impl PostgresExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
    }

    /// Build the pool without opening a connection until one is needed.
    pub fn connect_lazy(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(url)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}

fn wrap_as_json(sql: &str) -> String {
    format!("SELECT to_jsonb(q) AS row FROM ({sql}) AS q")
}

fn into_row(value: Value) -> Result<Row, ExecError> {
    match value {
        Value::Object(row) => Ok(row),
        other => Err(ExecError::decode(format!(
            "expected a JSON object per row, got `{other}`"
        ))),
    }
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    async fn execute(&self, translated: &TranslatedQuery) -> Result<ResultSet, ExecError> {
        let sql = wrap_as_json(&translated.sql);
        let mut stmt = query_scalar::<Postgres, Value>(&sql);
        for param in &translated.params {
            stmt = stmt.bind(param.as_str());
        }

        let values = stmt.fetch_all(self.pool()).await.map_err(map_sqlx_error)?;
        debug!(rows = values.len(), "Fetched rows");
        values.into_iter().map(into_row).collect()
    }
}
