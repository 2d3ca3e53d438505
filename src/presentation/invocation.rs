// Invocation entry point - One request, one ingest cycle
use crate::application::ingest_service::{CycleReport, IngestError, IngestOrchestrator};
use crate::infrastructure::metrics::Metrics;
use crate::infrastructure::resource_poller::{ResourcePoller, ResourceProbe};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvocationContext {
    #[serde(default)]
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl InvocationResponse {
    fn new(status_code: u16, body: Value) -> Self {
        Self {
            status_code,
            body: body.to_string(),
        }
    }
}

/// Resource polling that runs only while an invocation is in progress.
pub struct ResourcePolling {
    pub probe: Arc<dyn ResourceProbe>,
    pub containers: Vec<String>,
    pub interval: Duration,
}

pub struct IngestHandler {
    orchestrator: Arc<IngestOrchestrator>,
    metrics: Arc<Metrics>,
    polling: Option<ResourcePolling>,
}

impl IngestHandler {
    pub fn new(
        orchestrator: Arc<IngestOrchestrator>,
        metrics: Arc<Metrics>,
        polling: Option<ResourcePolling>,
    ) -> Self {
        Self {
            orchestrator,
            metrics,
            polling,
        }
    }

    /// Run one ingest cycle. Resource polling is always stopped before
    /// returning, including when the cycle panics.
    pub async fn handle(&self, event: Value, context: InvocationContext) -> InvocationResponse {
        let span = tracing::info_span!("invocation", request_id = %context.request_id);

        async move {
            tracing::debug!(%event, "Invocation received");

            let poller = self.polling.as_ref().map(|p| {
                ResourcePoller::start(
                    p.probe.clone(),
                    p.containers.clone(),
                    self.metrics.clone(),
                    p.interval,
                )
            });

            let outcome = AssertUnwindSafe(self.run()).catch_unwind().await;

            if let Some(poller) = poller {
                poller.stop().await;
            }

            match outcome {
                Ok(Ok(report)) => InvocationResponse::new(
                    200,
                    json!({ "message": "Function executed successfully", "report": report }),
                ),
                Ok(Err(e @ IngestError::CycleInFlight)) => {
                    tracing::warn!("{}", e);
                    InvocationResponse::new(409, json!({ "error": e.to_string() }))
                }
                Ok(Err(e)) => InvocationResponse::new(500, json!({ "error": e.to_string() })),
                Err(_) => {
                    tracing::error!("Ingest cycle panicked");
                    InvocationResponse::new(500, json!({ "error": "ingest cycle panicked" }))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self) -> Result<CycleReport, IngestError> {
        for (plugin, connected) in self.orchestrator.check_connectivity().await {
            if !connected {
                tracing::warn!(plugin, "Plugin is not connected, its fetch will likely fail");
            }
        }
        self.orchestrator.run_cycle().await
    }
}
