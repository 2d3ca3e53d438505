// PostgreSQL storage implementation
use crate::application::metric_store::{SeriesRecord, SqlParam, Statement, StorageClient, StorageError};
use crate::infrastructure::config::DatabaseSettings;
use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use std::time::Duration;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::new(err)
    }
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a lazily connecting pool; the first statement opens a connection.
    pub fn connect_lazy(settings: &DatabaseSettings) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy(&settings.url)
            .context("Invalid PostgreSQL connection URL")?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Text(v) => query.bind(v.as_str()),
            SqlParam::Timestamp(v) => query.bind(*v),
            SqlParam::Double(v) => query.bind(*v),
        };
    }
    query
}

#[async_trait]
impl StorageClient for PostgresStorage {
    async fn execute(&self, statement: &str, params: &[SqlParam]) -> Result<u64, StorageError> {
        let result = bind_params(sqlx::query(statement), params)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn execute_atomic(&self, statements: &[Statement]) -> Result<u64, StorageError> {
        // Dropping the transaction before commit rolls it back
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for statement in statements {
            affected += bind_params(sqlx::query(&statement.sql), &statement.params)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    async fn list_series(&self) -> Result<Vec<SeriesRecord>, StorageError> {
        let rows = sqlx::query("SELECT id, name FROM data_series ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<SeriesRecord, StorageError> {
                Ok(SeriesRecord {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }
}
