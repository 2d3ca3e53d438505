// Main entry point - Dependency injection and invocation loop
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::application::ingest_service::IngestOrchestrator;
use crate::application::metric_data_layer::MetricDataLayer;
use crate::application::plugin::Plugin;
use crate::application::plugins::monday::MondayPlugin;
use crate::application::plugins::quickbooks::QuickbooksPlugin;
use crate::infrastructure::config::{load_ingest_config, IngestConfig};
use crate::infrastructure::docker_probe::DockerStatsProbe;
use crate::infrastructure::metrics::Metrics;
use crate::infrastructure::postgres_storage::PostgresStorage;
use crate::infrastructure::providers::monday_client::MondayClient;
use crate::infrastructure::providers::quickbooks_client::QuickbooksClient;
use crate::presentation::app_state::AppState;
use crate::presentation::exporter_server::ExporterServer;
use crate::presentation::invocation::{IngestHandler, InvocationContext, ResourcePolling};

fn build_plugins(config: &IngestConfig) -> anyhow::Result<Vec<Arc<dyn Plugin>>> {
    let mut plugins: Vec<Arc<dyn Plugin>> = Vec::new();

    if let Some(settings) = &config.monday {
        let client = Arc::new(MondayClient::new(settings)?);
        plugins.push(Arc::new(MondayPlugin::new(client)));
    }
    if let Some(settings) = &config.quickbooks {
        let client = Arc::new(QuickbooksClient::new(settings)?);
        plugins.push(Arc::new(QuickbooksPlugin::new(client)));
    }

    if plugins.is_empty() {
        tracing::warn!("No provider configured, cycles will write nothing");
    }
    Ok(plugins)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = load_ingest_config()?;

    // Create storage (infrastructure layer)
    let storage = Arc::new(PostgresStorage::connect_lazy(&config.database)?);
    let metrics = Arc::new(Metrics::new());

    // Create services (application layer)
    let data_layer = Arc::new(MetricDataLayer::new(storage.clone()));
    let orchestrator = Arc::new(IngestOrchestrator::new(
        build_plugins(&config)?,
        data_layer.clone(),
        metrics.clone(),
        config.ingest.plugin_timeout(),
    ));

    let polling = match &config.exporter.docker_host {
        Some(host) => Some(ResourcePolling {
            probe: Arc::new(DockerStatsProbe::new(host)?),
            containers: config.exporter.containers.clone(),
            interval: Duration::from_secs(config.exporter.poll_interval_secs),
        }),
        None => None,
    };

    // Start exporter (presentation layer)
    let state = Arc::new(AppState {
        metrics: metrics.clone(),
        data_layer,
        orchestrator: orchestrator.clone(),
    });
    let server = ExporterServer::start(&config.exporter.bind_addr, state).await?;
    let handler = IngestHandler::new(orchestrator, metrics, polling);

    match config.ingest.interval_secs {
        None => {
            let response = handler.handle(json!({}), InvocationContext::default()).await;
            println!("{}", serde_json::to_string(&response)?);
        }
        Some(secs) => {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            let mut invocation: u64 = 0;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Shutdown requested");
                        break;
                    }
                    _ = ticker.tick() => {
                        invocation += 1;
                        let context = InvocationContext {
                            request_id: format!("scheduled-{}", invocation),
                        };
                        let response = handler.handle(json!({ "source": "schedule" }), context).await;
                        tracing::info!(status = response.status_code, "Invocation finished");
                    }
                }
            }
        }
    }

    server.shutdown().await;
    storage.close().await;
    Ok(())
}
