use std::error::Error as StdError;

use thiserror::Error;

use crate::cache::{CacheError, CacheKey};
use crate::domain::{QueryTemplate, TemplateError};
use crate::infra::error::InfraError;

use super::executor::ExecError;

/// Failure taxonomy of a retrieval.
///
/// Cache failures during retrieval are absorbed by falling back to the backing
/// store, so `CacheUnavailable` only reaches callers from maintenance
/// operations that have nothing to fall back to.
#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("invalid template for table `{table}`: {source}")]
    InvalidTemplate {
        table: String,
        source: TemplateError,
    },
    #[error("cache unavailable during `{op}`: {source}")]
    CacheUnavailable {
        op: &'static str,
        source: CacheError,
    },
    #[error("backing store query on `{table}` for key `{key}` failed: {source}")]
    BackingStore {
        table: String,
        key: CacheKey,
        source: ExecError,
    },
}

impl RetrieveError {
    pub fn invalid_template(template: &QueryTemplate, source: TemplateError) -> Self {
        Self::InvalidTemplate {
            table: template.table.clone(),
            source,
        }
    }

    pub fn cache_unavailable(op: &'static str, source: CacheError) -> Self {
        Self::CacheUnavailable { op, source }
    }

    pub fn backing_store(template: &QueryTemplate, key: &CacheKey, source: ExecError) -> Self {
        Self::BackingStore {
            table: template.table.clone(),
            key: key.clone(),
            source,
        }
    }
}

/// Error chain flattened for logging: the error itself, then each source.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit status: 2 for bad input, 3 for an unreachable dependency,
    /// 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Validation(_)
            | AppError::Retrieve(RetrieveError::InvalidTemplate { .. })
            | AppError::Infra(InfraError::Configuration { .. }) => 2,
            AppError::Retrieve(RetrieveError::CacheUnavailable { .. })
            | AppError::Retrieve(RetrieveError::BackingStore { .. })
            | AppError::Infra(InfraError::Database { .. })
            | AppError::Infra(InfraError::Cache { .. }) => 3,
            AppError::Infra(_) | AppError::Unexpected(_) => 1,
        }
    }
}
