// Monday.com GraphQL client
use crate::application::plugin::{FetchWindow, ProviderClient, ProviderPayload};
use crate::application::plugins::monday::PROJECT_HOURS_SERIES;
use crate::infrastructure::config::{prepare_query, MondaySettings};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

#[derive(Clone)]
pub struct MondayClient {
    api_url: String,
    api_token: String,
    board_id: String,
    query_template: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct BoardsData {
    #[serde(default)]
    boards: Vec<Board>,
}

#[derive(Debug, Deserialize)]
struct Board {
    items_page: ItemsPage,
}

#[derive(Debug, Deserialize)]
struct ItemsPage {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    column_values: Vec<ColumnValue>,
}

#[derive(Debug, Deserialize)]
struct ColumnValue {
    #[serde(default)]
    history: Vec<TrackingSession>,
}

#[derive(Debug, Deserialize)]
struct TrackingSession {
    started_at: Option<String>,
    ended_at: Option<String>,
}

impl MondayClient {
    pub fn new(settings: &MondaySettings) -> Result<Self> {
        if settings.api_token.trim().is_empty() {
            anyhow::bail!("Monday API token is empty");
        }
        Ok(Self {
            api_url: settings.api_url.clone(),
            api_token: settings.api_token.clone(),
            board_id: settings.board_id.clone(),
            query_template: settings.query.clone(),
            http: crate::infrastructure::http_client()?,
        })
    }

    async fn post_query(&self, query: &str) -> Result<reqwest::Response> {
        self.http
            .post(&self.api_url)
            .header("Authorization", &self.api_token)
            .header("Accept", "application/json")
            .json(&json!({ "query": query }))
            .send()
            .await
            .context("Failed to send request to Monday")
    }

    async fn execute_query<T: for<'de> Deserialize<'de>>(&self, query: &str) -> Result<T> {
        let response = self.post_query(query).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Monday query failed with status {}: {}", status, body);
        }

        let data = response
            .json::<GraphQlResponse<T>>()
            .await
            .context("Failed to parse Monday response")?;

        if let Some(error) = data.errors.first() {
            anyhow::bail!("Monday query error: {}", error.message);
        }

        data.data.context("Monday response has no data")
    }
}

#[async_trait]
impl ProviderClient for MondayClient {
    async fn connect(&self) -> Result<bool> {
        let response = self.post_query("query { me { id } }").await?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            status if status.is_success() => Ok(true),
            status => anyhow::bail!("Monday connection check failed with status {}", status),
        }
    }

    async fn fetch_window(&self, window: &FetchWindow) -> Result<ProviderPayload> {
        let mut vars = HashMap::new();
        vars.insert("board_id".to_string(), self.board_id.clone());
        vars.insert("since".to_string(), window.since.to_rfc3339_opts(SecondsFormat::Secs, true));
        vars.insert("until".to_string(), window.until.to_rfc3339_opts(SecondsFormat::Secs, true));
        let query = prepare_query(&self.query_template, &vars);

        tracing::debug!("Executing Monday query for board {}", self.board_id);
        let data: BoardsData = self.execute_query(&query).await?;
        Ok(sessions_to_payload(&data, window))
    }
}

/// Turn finished time-tracking sessions inside the window into hour points.
fn sessions_to_payload(data: &BoardsData, window: &FetchWindow) -> ProviderPayload {
    let parse = |s: &Option<String>| {
        s.as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| ts.with_timezone(&Utc))
    };

    let points: Vec<serde_json::Value> = data
        .boards
        .iter()
        .flat_map(|b| &b.items_page.items)
        .flat_map(|i| &i.column_values)
        .flat_map(|c| &c.history)
        .filter_map(|session| {
            let started = parse(&session.started_at)?;
            let ended = parse(&session.ended_at)?;
            if ended < window.since || ended > window.until || ended < started {
                return None;
            }
            let hours = (ended - started).num_seconds() as f64 / 3600.0;
            Some(json!({
                "timestamp": ended.to_rfc3339_opts(SecondsFormat::Secs, true),
                "value": hours,
            }))
        })
        .collect();

    ProviderPayload::from([(
        PROJECT_HOURS_SERIES.to_string(),
        json!({ "dataPoints": points }),
    )])
}
