// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod docker_probe;
pub mod metrics;
pub mod postgres_storage;
pub mod providers;
pub mod resource_poller;

use anyhow::Context;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub(crate) fn http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}
