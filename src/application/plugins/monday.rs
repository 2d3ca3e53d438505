// Project-management plugin - Hours logged on Monday.com boards
use crate::application::plugin::{
    build_series, connect_client, parse_data_points, FetchWindow, Plugin, PluginFetchError,
    PluginResult, ProviderClient,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

pub const PLUGIN_NAME: &str = "monday";
pub const PROJECT_HOURS_SERIES: &str = "total_project_hours_logged";

pub struct MondayPlugin {
    client: Arc<dyn ProviderClient>,
}

impl MondayPlugin {
    pub fn new(client: Arc<dyn ProviderClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Plugin for MondayPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    async fn connect(&self) -> bool {
        connect_client(PLUGIN_NAME, self.client.as_ref()).await
    }

    async fn get_data_last_day(&self) -> Result<PluginResult, PluginFetchError> {
        let window = FetchWindow::last_day(Utc::now());
        let payload = self
            .client
            .fetch_window(&window)
            .await
            .map_err(PluginFetchError::Provider)?;

        let mut result = PluginResult::new();
        for (name, raw) in &payload {
            let mut points = parse_data_points(name, raw, &window)?;
            // Time-tracking history comes back grouped by item, not by time
            points.sort_by_key(|(_, timestamp)| *timestamp);
            result.insert(name.clone(), build_series(name, &points)?);
        }

        tracing::debug!(plugin = PLUGIN_NAME, series = result.len(), "fetched last day");
        Ok(result)
    }
}
