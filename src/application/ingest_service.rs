// Ingest service - Runs every plugin and persists the combined result
use crate::application::metric_data_layer::{MetricSink, StorageWriteError};
use crate::application::plugin::{Plugin, PluginFetchError, PluginResult};
use crate::domain::ingest_batch::IngestBatch;
use crate::infrastructure::metrics::Metrics;
use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("an ingest cycle is already in flight")]
    CycleInFlight,

    #[error("failed to write ingest batch: {0}")]
    Write(#[source] StorageWriteError),
}

#[derive(Debug, Clone, Serialize)]
pub struct PluginFailure {
    pub plugin: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub plugins_invoked: usize,
    pub failures: Vec<PluginFailure>,
    pub records_written: usize,
}

pub struct IngestOrchestrator {
    plugins: Vec<Arc<dyn Plugin>>,
    sink: Arc<dyn MetricSink>,
    metrics: Arc<Metrics>,
    plugin_timeout: Duration,
    in_flight: AtomicBool,
    state: Mutex<CycleState>,
}

/// Held for the duration of one cycle. Releases the single-flight flag on
/// drop; a cycle dropped before `finish` (panic or cancellation) is recorded
/// as a failed write.
struct CycleGuard<'a> {
    orchestrator: &'a IngestOrchestrator,
    finished: bool,
}

impl CycleGuard<'_> {
    fn finish(mut self, state: CycleState) {
        self.orchestrator.set_state(state);
        self.finished = true;
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::error!("Ingest cycle ended before its write completed");
            self.orchestrator.metrics.increment_database_errors();
            self.orchestrator.set_state(CycleState::Failed);
        }
        self.orchestrator.in_flight.store(false, Ordering::Release);
    }
}

impl IngestOrchestrator {
    pub fn new(
        plugins: Vec<Arc<dyn Plugin>>,
        sink: Arc<dyn MetricSink>,
        metrics: Arc<Metrics>,
        plugin_timeout: Duration,
    ) -> Self {
        Self {
            plugins,
            sink,
            metrics,
            plugin_timeout,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(CycleState::Idle),
        }
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn state(&self) -> CycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one cycle and report only whether it succeeded.
    pub async fn process(&self) -> bool {
        self.run_cycle().await.is_ok()
    }

    /// Call `connect` on every plugin concurrently.
    pub async fn check_connectivity(&self) -> Vec<(String, bool)> {
        let results = join_all(self.plugins.iter().map(|p| p.connect())).await;
        self.plugins
            .iter()
            .zip(results)
            .map(|(p, connected)| (p.name().to_string(), connected))
            .collect()
    }

    /// Fetch from every plugin, then write everything in one call.
    ///
    /// A plugin failure or timeout only costs that plugin's data. A write
    /// failure fails the cycle. Overlapping calls are rejected.
    pub async fn run_cycle(&self) -> Result<CycleReport, IngestError> {
        let guard = self.try_begin().ok_or(IngestError::CycleInFlight)?;
        self.set_state(CycleState::Running);
        self.metrics.increment_ingest_function_invocations();

        let outcomes = self.fetch_all().await;

        let mut batch = IngestBatch::new();
        let mut failures = Vec::new();
        for (plugin, outcome) in self.plugins.iter().zip(outcomes) {
            match outcome {
                Ok(result) => batch.extend(result.into_values()),
                Err(e) => {
                    tracing::warn!(plugin = plugin.name(), "Plugin fetch failed: {}", e);
                    self.metrics.increment_plugin_api_errors(plugin.name(), 1);
                    failures.push(PluginFailure {
                        plugin: plugin.name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        match self.sink.write(batch).await {
            Ok(written) => {
                self.metrics.increment_data_records_written(written as u64);
                guard.finish(CycleState::Completed);
                tracing::info!(
                    plugins = self.plugins.len(),
                    failed = failures.len(),
                    records = written,
                    "Ingest cycle completed"
                );
                Ok(CycleReport {
                    plugins_invoked: self.plugins.len(),
                    failures,
                    records_written: written,
                })
            }
            Err(e) => {
                tracing::error!("Ingest cycle failed to write: {}", e);
                self.metrics.increment_database_errors();
                guard.finish(CycleState::Failed);
                Err(IngestError::Write(e))
            }
        }
    }

    async fn fetch_all(&self) -> Vec<Result<PluginResult, PluginFetchError>> {
        let handles = self.plugins.iter().map(|plugin| {
            let plugin = plugin.clone();
            let timeout = self.plugin_timeout;
            tokio::spawn(async move {
                tokio::time::timeout(timeout, plugin.get_data_last_day())
                    .await
                    .unwrap_or_else(|_| {
                        Err(PluginFetchError::Timeout {
                            plugin: plugin.name().to_string(),
                            after: timeout,
                        })
                    })
            })
        });

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap_or_else(|e| Err(PluginFetchError::Aborted(e.to_string()))))
            .collect()
    }

    fn try_begin(&self) -> Option<CycleGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| CycleGuard {
                orchestrator: self,
                finished: false,
            })
    }

    fn set_state(&self, state: CycleState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}
