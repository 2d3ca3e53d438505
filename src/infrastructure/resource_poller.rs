// Background polling of container resource usage into gauges
use crate::infrastructure::metrics::Metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSample {
    pub cpu_total: u64,
    pub memory_bytes: u64,
}

#[async_trait]
pub trait ResourceProbe: Send + Sync {
    async fn sample(&self, container: &str) -> anyhow::Result<ResourceSample>;
}

/// A running poll loop. Dropping it without `stop` lets the task exit on its
/// next wake-up; `stop` waits for it.
pub struct ResourcePoller {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ResourcePoller {
    pub fn start(
        probe: Arc<dyn ResourceProbe>,
        containers: Vec<String>,
        metrics: Arc<Metrics>,
        interval: Duration,
    ) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = async {
                        ticker.tick().await;
                        poll_once(probe.as_ref(), &containers, &metrics).await;
                    } => {}
                }
            }
            tracing::debug!("Resource poller stopped");
        });

        Self { shutdown, handle }
    }

    /// Signal the loop and wait until it has fully terminated.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!("Resource poller task ended abnormally: {}", e);
        }
    }
}

pub async fn poll_once(probe: &dyn ResourceProbe, containers: &[String], metrics: &Metrics) {
    for container in containers {
        match probe.sample(container).await {
            Ok(sample) => {
                metrics.set_resource_utilization(container, sample.cpu_total, sample.memory_bytes)
            }
            Err(e) => tracing::warn!(container, "Error updating resource utilization: {:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::metrics::ContainerLabels;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeProbe {
        samples: AtomicUsize,
    }

    #[async_trait]
    impl ResourceProbe for FakeProbe {
        async fn sample(&self, container: &str) -> anyhow::Result<ResourceSample> {
            self.samples.fetch_add(1, Ordering::SeqCst);
            if container == "missing" {
                anyhow::bail!("No such container: {}", container);
            }
            Ok(ResourceSample {
                cpu_total: 42,
                memory_bytes: 1024,
            })
        }
    }

    #[tokio::test]
    async fn test_poll_once_skips_failing_container() {
        let probe = FakeProbe::default();
        let metrics = Metrics::new();

        poll_once(&probe, &["missing".to_string(), "database".to_string()], &metrics).await;

        let labels = ContainerLabels {
            container: "database".to_string(),
        };
        assert_eq!(probe.samples.load(Ordering::SeqCst), 2);
        assert_eq!(metrics.container_memory_usage.get_or_create(&labels).get(), 1024);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let probe = Arc::new(FakeProbe::default());
        let metrics = Arc::new(Metrics::new());

        let poller = ResourcePoller::start(
            probe.clone(),
            vec!["grafana".to_string()],
            metrics.clone(),
            Duration::from_millis(5),
        );
        while probe.samples.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        poller.stop().await;

        let after_stop = probe.samples.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(probe.samples.load(Ordering::SeqCst), after_stop);

        let labels = ContainerLabels {
            container: "grafana".to_string(),
        };
        assert_eq!(metrics.container_cpu_usage.get_or_create(&labels).get(), 42);
    }
}
