//! Prometheus metrics for the ingest pipeline.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Labels for per-plugin counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PluginLabels {
    pub plugin: String,
}

/// Labels for per-container resource gauges.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ContainerLabels {
    pub container: String,
}

/// Container for all Prometheus metrics.
pub struct Metrics {
    registry: Registry,

    /// Counter of failed or timed-out plugin fetches, by plugin.
    pub plugin_api_errors: Family<PluginLabels, Counter>,

    /// Counter of failed storage writes.
    pub database_errors: Counter,

    /// Counter of ingest cycles started.
    pub ingest_function_invocations: Counter,

    /// Counter of data points persisted.
    pub data_records_written: Counter,

    /// Cumulative CPU time of a monitored container, in nanoseconds.
    pub container_cpu_usage: Family<ContainerLabels, Gauge>,

    /// Memory usage of a monitored container, in bytes.
    pub container_memory_usage: Family<ContainerLabels, Gauge>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics registry with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let plugin_api_errors = Family::<PluginLabels, Counter>::default();
        registry.register(
            "plugin_api_errors",
            "Number of Plugin API Errors",
            plugin_api_errors.clone(),
        );

        let database_errors = Counter::default();
        registry.register(
            "database_errors",
            "Number of Database Errors",
            database_errors.clone(),
        );

        let ingest_function_invocations = Counter::default();
        registry.register(
            "ingest_function_invocations",
            "Number of Plugin Ingest Function invocations",
            ingest_function_invocations.clone(),
        );

        let data_records_written = Counter::default();
        registry.register(
            "data_records_written",
            "Number of Data records (KPIs) written to the database",
            data_records_written.clone(),
        );

        let container_cpu_usage = Family::<ContainerLabels, Gauge>::default();
        registry.register(
            "container_cpu_usage",
            "CPU usage of a monitored container",
            container_cpu_usage.clone(),
        );

        let container_memory_usage = Family::<ContainerLabels, Gauge>::default();
        registry.register(
            "container_memory_usage",
            "Memory usage of a monitored container",
            container_memory_usage.clone(),
        );

        Self {
            registry,
            plugin_api_errors,
            database_errors,
            ingest_function_invocations,
            data_records_written,
            container_cpu_usage,
            container_memory_usage,
        }
    }

    pub fn increment_plugin_api_errors(&self, plugin: &str, quantity: u64) {
        self.plugin_api_errors
            .get_or_create(&PluginLabels {
                plugin: plugin.to_string(),
            })
            .inc_by(quantity);
    }

    pub fn increment_database_errors(&self) {
        self.database_errors.inc();
    }

    pub fn increment_ingest_function_invocations(&self) {
        self.ingest_function_invocations.inc();
    }

    pub fn increment_data_records_written(&self, count: u64) {
        self.data_records_written.inc_by(count);
    }

    pub fn set_resource_utilization(&self, container: &str, cpu_total: u64, memory_bytes: u64) {
        let labels = ContainerLabels {
            container: container.to_string(),
        };
        self.container_cpu_usage
            .get_or_create(&labels)
            .set(saturating_i64(cpu_total));
        self.container_memory_usage
            .get_or_create(&labels)
            .set(saturating_i64(memory_bytes));
    }

    /// Encode all metrics to Prometheus text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
