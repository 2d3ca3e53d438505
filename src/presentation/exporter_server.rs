// Exporter HTTP server lifecycle
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::router;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct ExporterServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl ExporterServer {
    pub async fn start(bind_addr: &str, state: Arc<AppState>) -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind exporter on {}", bind_addr))?;
        let addr = listener.local_addr()?;
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router(state))
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        tracing::info!("Metrics exporter listening on {}", addr);
        Ok(Self {
            addr,
            shutdown,
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        match self.handle.await {
            Ok(Ok(())) => tracing::debug!("Metrics exporter stopped"),
            Ok(Err(e)) => tracing::warn!("Metrics exporter failed: {}", e),
            Err(e) => tracing::warn!("Metrics exporter task ended abnormally: {}", e),
        }
    }
}
