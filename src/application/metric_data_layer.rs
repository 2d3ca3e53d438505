// Metric data layer - Write path from time series to persisted rows
use crate::application::metric_store::{SeriesRecord, SqlParam, Statement, StorageClient, StorageError};
use crate::domain::ingest_batch::IngestBatch;
use crate::domain::time_series::TimeSeries;
use async_trait::async_trait;
use std::fmt::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

const PARAMS_PER_POINT: usize = 3;
/// PostgreSQL caps bind parameters per statement at u16::MAX.
const MAX_BIND_PARAMS: usize = u16::MAX as usize;
pub const MAX_POINTS_PER_STATEMENT: usize = MAX_BIND_PARAMS / PARAMS_PER_POINT;

#[derive(Error, Debug)]
pub enum StorageWriteError {
    #[error(transparent)]
    Insert(#[from] StorageError),
}

/// Destination for the combined output of an ingest cycle.
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Persist every point in the batch, returning the number written.
    async fn write(&self, batch: IngestBatch) -> Result<usize, StorageWriteError>;
}

pub struct MetricDataLayer {
    storage: Arc<dyn StorageClient>,
    catalog: Mutex<Vec<SeriesRecord>>,
}

impl MetricDataLayer {
    pub fn new(storage: Arc<dyn StorageClient>) -> Self {
        Self {
            storage,
            catalog: Mutex::new(Vec::new()),
        }
    }

    /// Write a single series. An empty series touches no storage.
    pub async fn write_time_series_data(&self, series: &TimeSeries) -> Result<usize, StorageWriteError> {
        self.write_batch(std::slice::from_ref(series)).await
    }

    /// Write all points of all series in one storage call.
    ///
    /// Each point binds `(series name, timestamp, value)`; the statement
    /// registers unknown series and inserts the rows together. Past the bind
    /// parameter ceiling the rows are split over several statements that the
    /// storage applies in a single transaction.
    pub async fn write_batch(&self, batch: &[TimeSeries]) -> Result<usize, StorageWriteError> {
        let total: usize = batch.iter().map(TimeSeries::len).sum();
        if total == 0 {
            return Ok(0);
        }

        let mut params = Vec::with_capacity(total * PARAMS_PER_POINT);
        for series in batch {
            for point in series.points() {
                params.push(SqlParam::Text(series.name().to_string()));
                params.push(SqlParam::Timestamp(point.timestamp));
                params.push(SqlParam::Double(point.value));
            }
        }

        if total <= MAX_POINTS_PER_STATEMENT {
            self.storage.execute(&upsert_statement(total), &params).await?;
        } else {
            let statements: Vec<Statement> = params
                .chunks(MAX_POINTS_PER_STATEMENT * PARAMS_PER_POINT)
                .map(|chunk| Statement {
                    sql: upsert_statement(chunk.len() / PARAMS_PER_POINT),
                    params: chunk.to_vec(),
                })
                .collect();
            self.storage.execute_atomic(&statements).await?;
        }

        tracing::debug!(points = total, series = batch.len(), "wrote time series batch");
        Ok(total)
    }

    /// Known series catalog. Falls back to the last catalog read when the
    /// store cannot be reached, so callers always get a list.
    pub async fn get_metrics(&self) -> Vec<SeriesRecord> {
        match self.storage.list_series().await {
            Ok(records) => {
                *self.lock_catalog() = records.clone();
                records
            }
            Err(e) => {
                tracing::warn!("Failed to list series, using cached catalog: {}", e);
                self.lock_catalog().clone()
            }
        }
    }

    fn lock_catalog(&self) -> MutexGuard<'_, Vec<SeriesRecord>> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MetricSink for MetricDataLayer {
    async fn write(&self, batch: IngestBatch) -> Result<usize, StorageWriteError> {
        self.write_batch(batch.series()).await
    }
}

/// Insert `rows` points, registering their series in the same statement.
fn upsert_statement(rows: usize) -> String {
    let mut statement = String::from("WITH v (name, ts, value) AS (VALUES ");
    for row in 0..rows {
        let base = row * PARAMS_PER_POINT;
        if row > 0 {
            statement.push_str(", ");
        }
        let _ = write!(statement, "(${}, ${}, ${})", base + 1, base + 2, base + 3);
    }
    statement.push_str(
        "), series AS (\
         INSERT INTO data_series (name) SELECT DISTINCT name FROM v \
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
         RETURNING id, name) \
         INSERT INTO data_points (series_id, timestamp, value) \
         SELECT series.id, v.ts, v.value FROM v JOIN series ON series.name = v.name",
    );
    statement
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FakeStorage {
        executed: Mutex<Vec<(String, Vec<SqlParam>)>>,
        committed_rows: Mutex<usize>,
        transactions: Mutex<usize>,
        fail_execute: bool,
        fail_statement: Option<usize>,
        fail_list: AtomicBool,
    }

    #[async_trait]
    impl StorageClient for FakeStorage {
        async fn execute(&self, statement: &str, params: &[SqlParam]) -> Result<u64, StorageError> {
            if self.fail_execute {
                return Err(StorageError::new("Database error"));
            }
            self.executed
                .lock()
                .unwrap()
                .push((statement.to_string(), params.to_vec()));
            let rows = params.len() / PARAMS_PER_POINT;
            *self.committed_rows.lock().unwrap() += rows;
            Ok(rows as u64)
        }

        async fn execute_atomic(&self, statements: &[Statement]) -> Result<u64, StorageError> {
            *self.transactions.lock().unwrap() += 1;
            let mut staged = 0;
            for (index, statement) in statements.iter().enumerate() {
                if self.fail_statement == Some(index) {
                    return Err(StorageError::new("Database error"));
                }
                staged += statement.params.len() / PARAMS_PER_POINT;
            }
            *self.committed_rows.lock().unwrap() += staged;
            Ok(staged as u64)
        }

        async fn list_series(&self) -> Result<Vec<SeriesRecord>, StorageError> {
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(StorageError::new("connection reset"));
            }
            Ok(vec![SeriesRecord {
                id: 7,
                name: "net_revenue".to_string(),
            }])
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn series(name: &str, points: &[(f64, i64)]) -> TimeSeries {
        let mut s = TimeSeries::new(name).unwrap();
        for (value, secs) in points {
            s.add_point(*value, ts(*secs)).unwrap();
        }
        s
    }

    fn large_series(points: usize) -> TimeSeries {
        let start = ts(1680300000);
        let batch: Vec<(f64, DateTime<Utc>)> = (0..points)
            .map(|i| (i as f64, start + Duration::seconds(i as i64)))
            .collect();
        let mut s = TimeSeries::new("hours").unwrap();
        s.add_points(&batch).unwrap();
        s
    }

    #[tokio::test]
    async fn test_get_metrics() {
        let layer = MetricDataLayer::new(Arc::new(FakeStorage::default()));

        let metrics = layer.get_metrics().await;
        assert_eq!(metrics[0].name, "net_revenue");
    }

    #[tokio::test]
    async fn test_get_metrics_falls_back_to_cache() {
        let storage = Arc::new(FakeStorage::default());
        let layer = MetricDataLayer::new(storage.clone());
        let fresh = layer.get_metrics().await;

        storage.fail_list.store(true, Ordering::SeqCst);

        assert_eq!(layer.get_metrics().await, fresh);
    }

    #[tokio::test]
    async fn test_get_metrics_never_fails_when_cold() {
        let storage = Arc::new(FakeStorage::default());
        storage.fail_list.store(true, Ordering::SeqCst);
        let layer = MetricDataLayer::new(storage);

        assert!(layer.get_metrics().await.is_empty());
    }

    #[tokio::test]
    async fn test_write_time_series_data() {
        let storage = Arc::new(FakeStorage::default());
        let layer = MetricDataLayer::new(storage.clone());

        let written = layer
            .write_time_series_data(&series("revenue", &[(10.5, 1620000000), (11.2, 1620086400)]))
            .await
            .unwrap();

        assert_eq!(written, 2);
        let executed = storage.executed.lock().unwrap();
        assert_eq!(executed.len(), 1);
        let (statement, params) = &executed[0];
        assert!(statement.contains("INSERT INTO data_points"));
        assert!(statement.contains("VALUES ($1, $2, $3), ($4, $5, $6)"));
        assert_eq!(params.len(), 6);
        assert_eq!(
            &params[..3],
            &[
                SqlParam::Text("revenue".to_string()),
                SqlParam::Timestamp(ts(1620000000)),
                SqlParam::Double(10.5)
            ]
        );
    }

    #[tokio::test]
    async fn test_write_time_series_data_empty() {
        let storage = Arc::new(FakeStorage::default());
        let layer = MetricDataLayer::new(storage.clone());

        let written = layer
            .write_time_series_data(&TimeSeries::new("empty").unwrap())
            .await
            .unwrap();

        assert_eq!(written, 0);
        assert!(storage.executed.lock().unwrap().is_empty());
        assert_eq!(*storage.transactions.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_time_series_data_error() {
        let storage = Arc::new(FakeStorage {
            fail_execute: true,
            ..Default::default()
        });
        let layer = MetricDataLayer::new(storage);

        let err = layer
            .write_time_series_data(&series("revenue", &[(10.5, 1620000000)]))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageWriteError::Insert(_)));
        assert_eq!(err.to_string(), "Database error");
    }

    #[tokio::test]
    async fn test_write_batch_is_one_statement() {
        let storage = Arc::new(FakeStorage::default());
        let layer = MetricDataLayer::new(storage.clone());
        let batch = [
            series("hours", &[(4.0, 0), (5.0, 60)]),
            series("revenue", &[(1.0, 0)]),
            TimeSeries::new("idle").unwrap(),
            series("hours", &[(6.0, 120)]),
        ];

        assert_eq!(layer.write_batch(&batch).await.unwrap(), 4);

        let executed = storage.executed.lock().unwrap();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].1.len(), 12);
        assert_eq!(executed[0].1[6], SqlParam::Text("revenue".to_string()));
    }

    #[tokio::test]
    async fn test_write_past_param_ceiling_is_one_transaction() {
        let storage = Arc::new(FakeStorage::default());
        let layer = MetricDataLayer::new(storage.clone());

        let written = layer
            .write_time_series_data(&large_series(MAX_POINTS_PER_STATEMENT + 10))
            .await
            .unwrap();

        assert_eq!(written, MAX_POINTS_PER_STATEMENT + 10);
        assert!(storage.executed.lock().unwrap().is_empty());
        assert_eq!(*storage.transactions.lock().unwrap(), 1);
        assert_eq!(*storage.committed_rows.lock().unwrap(), MAX_POINTS_PER_STATEMENT + 10);
    }

    #[tokio::test]
    async fn test_failed_chunk_leaves_nothing_written() {
        let storage = Arc::new(FakeStorage {
            fail_statement: Some(1),
            ..Default::default()
        });
        let layer = MetricDataLayer::new(storage.clone());

        let result = layer
            .write_time_series_data(&large_series(MAX_POINTS_PER_STATEMENT + 10))
            .await;

        assert!(result.is_err());
        assert_eq!(*storage.transactions.lock().unwrap(), 1);
        assert_eq!(*storage.committed_rows.lock().unwrap(), 0);
    }

    #[test]
    fn test_upsert_statement_placeholders() {
        let statement = upsert_statement(1);
        assert!(statement.starts_with("WITH v (name, ts, value) AS (VALUES ($1, $2, $3)), series AS ("));
        assert!(statement.contains("ON CONFLICT (name) DO UPDATE"));
        assert!(upsert_statement(MAX_POINTS_PER_STATEMENT).contains("($65533, $65534, $65535))"));
    }
}
