use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_MONDAY_QUERY: &str = "query { boards(ids: [${board_id}]) { items_page { items { name column_values(types: [time_tracking]) { ... on TimeTrackingValue { history { started_at ended_at } } } } } } }";

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    pub database: DatabaseSettings,
    #[serde(default)]
    pub ingest: IngestSettings,
    #[serde(default)]
    pub exporter: ExporterSettings,
    pub monday: Option<MondaySettings>,
    pub quickbooks: Option<QuickbooksSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestSettings {
    #[serde(default = "default_plugin_timeout_secs")]
    pub plugin_timeout_secs: u64,
    /// Absent means run one invocation and exit.
    pub interval_secs: Option<u64>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            plugin_timeout_secs: default_plugin_timeout_secs(),
            interval_secs: None,
        }
    }
}

impl IngestSettings {
    pub fn plugin_timeout(&self) -> Duration {
        Duration::from_secs(self.plugin_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExporterSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Docker Engine API base URL; resource polling is off without it.
    pub docker_host: Option<String>,
    #[serde(default = "default_containers")]
    pub containers: Vec<String>,
}

impl Default for ExporterSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            poll_interval_secs: default_poll_interval_secs(),
            docker_host: None,
            containers: default_containers(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MondaySettings {
    #[serde(default = "default_monday_api_url")]
    pub api_url: String,
    pub api_token: String,
    pub board_id: String,
    #[serde(default = "default_monday_query")]
    pub query: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuickbooksSettings {
    #[serde(default = "default_quickbooks_api_url")]
    pub api_url: String,
    pub realm_id: String,
    pub access_token: String,
}

fn default_max_connections() -> u32 {
    5
}

fn default_plugin_timeout_secs() -> u64 {
    30
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_containers() -> Vec<String> {
    vec!["database".to_string(), "grafana".to_string()]
}

fn default_monday_api_url() -> String {
    "https://api.monday.com/v2".to_string()
}

fn default_monday_query() -> String {
    DEFAULT_MONDAY_QUERY.to_string()
}

fn default_quickbooks_api_url() -> String {
    "https://quickbooks.api.intuit.com".to_string()
}

/// Load `config/ingest.*` (optional) overlaid with `INGEST__*` environment variables.
pub fn load_ingest_config() -> anyhow::Result<IngestConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/ingest").required(false))
        .add_source(
            config::Environment::with_prefix("INGEST")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("exporter.containers")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Replace template variables in a query string
pub fn prepare_query(query: &str, vars: &HashMap<String, String>) -> String {
    let mut result = query.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}
