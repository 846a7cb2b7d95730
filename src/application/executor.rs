//! Backing-store execution contract.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ResultSet;

use super::query::TranslatedQuery;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecError {
    #[error("query failed: {message}")]
    Query { message: String },
    #[error("connection failed: {message}")]
    Connection { message: String },
    #[error("row decoding failed: {message}")]
    Decode { message: String },
    #[error("query timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

impl ExecError {
    pub fn query(err: impl std::fmt::Display) -> Self {
        Self::Query {
            message: err.to_string(),
        }
    }

    pub fn connection(err: impl std::fmt::Display) -> Self {
        Self::Connection {
            message: err.to_string(),
        }
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }
}

/// Runs a translated query and materializes every row.
///
/// Implementations check a connection out of a pool for the duration of one
/// call and never hold one between calls.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &TranslatedQuery) -> Result<ResultSet, ExecError>;
}
