// QuickBooks Online REST client
use crate::application::plugin::{FetchWindow, ProviderClient, ProviderPayload};
use crate::application::plugins::quickbooks::{PAYMENTS_KEY, REFUNDS_KEY};
use crate::infrastructure::config::QuickbooksSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

const MINOR_VERSION: u32 = 65;

#[derive(Clone)]
pub struct QuickbooksClient {
    api_url: String,
    realm_id: String,
    access_token: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    #[serde(rename = "QueryResponse", default)]
    query_response: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    #[serde(rename = "TotalAmt")]
    total_amt: f64,
    #[serde(rename = "MetaData")]
    meta_data: TransactionMetaData,
}

#[derive(Debug, Deserialize)]
struct TransactionMetaData {
    #[serde(rename = "CreateTime")]
    create_time: String,
}

impl QuickbooksClient {
    pub fn new(settings: &QuickbooksSettings) -> Result<Self> {
        if settings.realm_id.trim().is_empty() {
            anyhow::bail!("QuickBooks realm id is empty");
        }
        Ok(Self {
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            realm_id: settings.realm_id.clone(),
            access_token: settings.access_token.clone(),
            http: crate::infrastructure::http_client()?,
        })
    }

    fn company_url(&self, path: &str) -> String {
        format!("{}/v3/company/{}/{}", self.api_url, self.realm_id, path)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.http
            .get(url)
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send request to QuickBooks")
    }

    async fn query_transactions(&self, entity: &str, window: &FetchWindow) -> Result<Vec<Transaction>> {
        let query = format!(
            "SELECT * FROM {} WHERE MetaData.CreateTime >= '{}' AND MetaData.CreateTime < '{}'",
            entity,
            window.since.to_rfc3339_opts(SecondsFormat::Secs, true),
            window.until.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        let url = format!(
            "{}?query={}&minorversion={}",
            self.company_url("query"),
            urlencoding::encode(&query),
            MINOR_VERSION
        );

        tracing::debug!("Executing QuickBooks query: {}", query);
        let response = self.get(&url).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("QuickBooks query failed with status {}: {}", status, body);
        }

        let envelope = response
            .json::<QueryEnvelope>()
            .await
            .context("Failed to parse QuickBooks response")?;

        transactions_from(&envelope, entity)
    }
}

fn transactions_from(envelope: &QueryEnvelope, entity: &str) -> Result<Vec<Transaction>> {
    match envelope.query_response.get(entity) {
        // QuickBooks omits the entity key when nothing matched
        None => Ok(Vec::new()),
        Some(rows) => serde_json::from_value(rows.clone())
            .with_context(|| format!("Unexpected {} rows in QuickBooks response", entity)),
    }
}

fn to_series(transactions: &[Transaction]) -> Value {
    let points: Vec<Value> = transactions
        .iter()
        .map(|t| json!({ "timestamp": t.meta_data.create_time, "amount": t.total_amt }))
        .collect();
    json!({ "dataPoints": points })
}

#[async_trait]
impl ProviderClient for QuickbooksClient {
    async fn connect(&self) -> Result<bool> {
        let url = self.company_url(&format!("companyinfo/{}", self.realm_id));
        let response = self.get(&url).await?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            status if status.is_success() => Ok(true),
            status => anyhow::bail!("QuickBooks connection check failed with status {}", status),
        }
    }

    async fn fetch_window(&self, window: &FetchWindow) -> Result<ProviderPayload> {
        let (payments, refunds) = futures::try_join!(
            self.query_transactions("Payment", window),
            self.query_transactions("RefundReceipt", window),
        )?;

        Ok(ProviderPayload::from([
            (PAYMENTS_KEY.to_string(), to_series(&payments)),
            (REFUNDS_KEY.to_string(), to_series(&refunds)),
        ]))
    }
}
