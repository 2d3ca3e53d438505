// Storage trait for the relational metric store
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::error::Error as StdError;
use thiserror::Error;

/// Bound parameter for a storage statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Timestamp(DateTime<Utc>),
    Double(f64),
}

/// One statement with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// A registered series and its stable identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesRecord {
    pub id: i64,
    pub name: String,
}

/// Error raised by a storage backend, passed through untouched.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct StorageError(Box<dyn StdError + Send + Sync>);

impl StorageError {
    pub fn new(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Execute one statement with positional parameters, returning rows affected.
    async fn execute(&self, statement: &str, params: &[SqlParam]) -> Result<u64, StorageError>;

    /// Execute all statements in one transaction. On error nothing is applied.
    async fn execute_atomic(&self, statements: &[Statement]) -> Result<u64, StorageError>;

    async fn list_series(&self) -> Result<Vec<SeriesRecord>, StorageError>;
}
