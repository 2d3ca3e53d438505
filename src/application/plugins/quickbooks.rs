// Accounting plugin - Revenue from QuickBooks Online
use crate::application::plugin::{
    build_series, connect_client, parse_data_points, FetchWindow, Plugin, PluginFetchError,
    PluginResult, ProviderClient,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const PLUGIN_NAME: &str = "quickbooks";
pub const NET_REVENUE_SERIES: &str = "net_revenue";
pub const PAYMENTS_KEY: &str = "payments";
pub const REFUNDS_KEY: &str = "refunds";

pub struct QuickbooksPlugin {
    client: Arc<dyn ProviderClient>,
}

impl QuickbooksPlugin {
    pub fn new(client: Arc<dyn ProviderClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Plugin for QuickbooksPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    async fn connect(&self) -> bool {
        connect_client(PLUGIN_NAME, self.client.as_ref()).await
    }

    /// Payments and refunds are folded into one `net_revenue` series, refunds
    /// negated. Any other series in the payload passes through unchanged.
    async fn get_data_last_day(&self) -> Result<PluginResult, PluginFetchError> {
        let window = FetchWindow::last_day(Utc::now());
        let payload = self
            .client
            .fetch_window(&window)
            .await
            .map_err(PluginFetchError::Provider)?;

        let mut net: Vec<(f64, DateTime<Utc>)> = Vec::new();
        let mut result = PluginResult::new();

        for (name, raw) in &payload {
            let points = parse_data_points(name, raw, &window)?;
            match name.as_str() {
                PAYMENTS_KEY | NET_REVENUE_SERIES => net.extend(points),
                REFUNDS_KEY => net.extend(points.into_iter().map(|(v, ts)| (-v, ts))),
                _ => {
                    result.insert(name.clone(), build_series(name, &points)?);
                }
            }
        }

        if !net.is_empty() {
            // Payload order is unspecified, ties on timestamp are broken by value
            net.sort_by(|(a, at), (b, bt)| at.cmp(bt).then(a.total_cmp(b)));
            result.insert(
                NET_REVENUE_SERIES.to_string(),
                build_series(NET_REVENUE_SERIES, &net)?,
            );
        }

        tracing::debug!(plugin = PLUGIN_NAME, series = result.len(), "fetched last day");
        Ok(result)
    }
}
