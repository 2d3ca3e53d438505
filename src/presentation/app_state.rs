// Application state for exporter HTTP handlers
use crate::application::ingest_service::IngestOrchestrator;
use crate::application::metric_data_layer::MetricDataLayer;
use crate::infrastructure::metrics::Metrics;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<Metrics>,
    pub data_layer: Arc<MetricDataLayer>,
    pub orchestrator: Arc<IngestOrchestrator>,
}
