// Plugin abstraction - Provider adapters that normalize data into time series
use crate::domain::error::ValidationError;
use crate::domain::time_series::TimeSeries;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Series produced by one plugin call, keyed by series name.
pub type PluginResult = BTreeMap<String, TimeSeries>;

/// Provider-native response: series name to an object carrying `dataPoints`.
pub type ProviderPayload = HashMap<String, Value>;

const DATA_POINTS_KEY: &str = "dataPoints";
const TIMESTAMP_KEYS: [&str; 4] = ["timestamp", "date_time", "date", "time"];
const VALUE_KEYS: [&str; 3] = ["value", "amount", "hours"];

#[derive(Error, Debug)]
pub enum PluginFetchError {
    #[error("provider request failed: {0:#}")]
    Provider(anyhow::Error),

    #[error("malformed data for series {series}: {reason}")]
    MalformedPayload { series: String, reason: String },

    #[error("invalid data for series {series}: {source}")]
    Validation {
        series: String,
        #[source]
        source: ValidationError,
    },

    #[error("plugin task aborted: {0}")]
    Aborted(String),

    #[error("plugin {plugin} timed out after {after:?}")]
    Timeout {
        plugin: String,
        after: std::time::Duration,
    },
}

/// Time range requested from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl FetchWindow {
    pub fn last_day(now: DateTime<Utc>) -> Self {
        Self {
            since: now - Duration::hours(24),
            until: now,
        }
    }
}

/// Client for one external provider, injected into a plugin.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// `Ok(false)` means the provider rejected the credentials.
    async fn connect(&self) -> anyhow::Result<bool>;

    async fn fetch_window(&self, window: &FetchWindow) -> anyhow::Result<ProviderPayload>;
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self) -> bool;

    async fn get_data_last_day(&self) -> Result<PluginResult, PluginFetchError>;
}

/// Run `connect` on a provider client, folding errors into `false`.
pub async fn connect_client(plugin: &str, client: &dyn ProviderClient) -> bool {
    match client.connect().await {
        Ok(true) => true,
        Ok(false) => {
            tracing::warn!(plugin, "provider rejected credentials");
            false
        }
        Err(e) => {
            tracing::warn!(plugin, "provider connection failed: {:#}", e);
            false
        }
    }
}

/// Convert one provider-native series into `(value, timestamp)` pairs.
///
/// Points without a timestamp are stamped with the window end.
pub fn parse_data_points(
    series: &str,
    raw: &Value,
    window: &FetchWindow,
) -> Result<Vec<(f64, DateTime<Utc>)>, PluginFetchError> {
    let malformed = |reason: String| PluginFetchError::MalformedPayload {
        series: series.to_string(),
        reason,
    };

    let entries = find_data_points(raw)
        .ok_or_else(|| malformed(format!("no {} field", DATA_POINTS_KEY)))?;

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| parse_entry(entry, window).map_err(|e| malformed(format!("point {}: {}", index, e))))
        .collect()
}

/// Build a `TimeSeries` from parsed pairs, rejecting the batch as a whole.
pub fn build_series(
    name: &str,
    points: &[(f64, DateTime<Utc>)],
) -> Result<TimeSeries, PluginFetchError> {
    let to_error = |source| PluginFetchError::Validation {
        series: name.to_string(),
        source,
    };
    let mut series = TimeSeries::new(name).map_err(to_error)?;
    series.add_points(points).map_err(to_error)?;
    Ok(series)
}

fn find_data_points(raw: &Value) -> Option<&Vec<Value>> {
    match raw {
        Value::Array(items) => Some(items),
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get(DATA_POINTS_KEY) {
                return Some(items);
            }
            map.values()
                .filter(|v| v.is_object())
                .find_map(find_data_points)
        }
        _ => None,
    }
}

fn parse_entry(entry: &Value, window: &FetchWindow) -> Result<(f64, DateTime<Utc>), String> {
    match entry {
        Value::Array(pair) if pair.len() == 2 => {
            Ok((parse_value(&pair[1])?, parse_timestamp(&pair[0])?))
        }
        Value::Object(map) => {
            let value = VALUE_KEYS
                .iter()
                .find_map(|k| map.get(*k))
                .ok_or("missing value")?;
            let timestamp = match TIMESTAMP_KEYS.iter().find_map(|k| map.get(*k)) {
                Some(ts) => parse_timestamp(ts)?,
                None => window.until,
            };
            Ok((parse_value(value)?, timestamp))
        }
        Value::Number(_) | Value::String(_) => Ok((parse_value(entry)?, window.until)),
        other => Err(format!("unsupported entry {}", other)),
    }
}

fn parse_value(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("value {} out of range", n)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("value {:?} is not numeric", s)),
        other => Err(format!("value {} is not numeric", other)),
    }
}

fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, String> {
    match value {
        Value::Number(n) => {
            let secs = n.as_f64().ok_or_else(|| format!("timestamp {} out of range", n))?;
            DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
                .ok_or_else(|| format!("timestamp {} out of range", n))
        }
        Value::String(s) => parse_timestamp_str(s.trim()),
        other => Err(format!("timestamp {} is not a date", other)),
    }
}

fn parse_timestamp_str(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("timestamp {:?} is not a recognised date", s))
}
