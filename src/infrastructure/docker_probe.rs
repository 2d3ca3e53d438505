// Docker Engine API probe for container stats
use crate::infrastructure::resource_poller::{ResourceProbe, ResourceSample};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct DockerStatsProbe {
    host: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ContainerStats {
    cpu_stats: CpuStats,
    #[serde(default)]
    memory_stats: MemoryStats,
}

#[derive(Debug, Deserialize)]
struct CpuStats {
    cpu_usage: CpuUsage,
}

#[derive(Debug, Deserialize)]
struct CpuUsage {
    total_usage: u64,
}

#[derive(Debug, Default, Deserialize)]
struct MemoryStats {
    #[serde(default)]
    usage: u64,
}

impl DockerStatsProbe {
    pub fn new(host: &str) -> Result<Self> {
        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            http: crate::infrastructure::http_client()?,
        })
    }

    fn stats_url(&self, container: &str) -> String {
        format!(
            "{}/containers/{}/stats?stream=false",
            self.host,
            urlencoding::encode(container)
        )
    }
}

#[async_trait]
impl ResourceProbe for DockerStatsProbe {
    async fn sample(&self, container: &str) -> Result<ResourceSample> {
        let response = self
            .http
            .get(self.stats_url(container))
            .send()
            .await
            .context("Failed to send request to Docker")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Docker stats for {} failed with status {}: {}", container, status, body);
        }

        let stats = response
            .json::<ContainerStats>()
            .await
            .context("Failed to parse Docker stats")?;

        Ok(ResourceSample {
            cpu_total: stats.cpu_stats.cpu_usage.total_usage,
            memory_bytes: stats.memory_stats.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_url() {
        let probe = DockerStatsProbe::new("http://localhost:2375/").unwrap();
        assert_eq!(
            probe.stats_url("database"),
            "http://localhost:2375/containers/database/stats?stream=false"
        );
    }

    #[test]
    fn test_parse_stats() {
        let stats: ContainerStats = serde_json::from_str(
            r#"{"cpu_stats": {"cpu_usage": {"total_usage": 123456}, "online_cpus": 4}, "memory_stats": {"usage": 2048, "limit": 4096}}"#,
        )
        .unwrap();
        assert_eq!(stats.cpu_stats.cpu_usage.total_usage, 123456);
        assert_eq!(stats.memory_stats.usage, 2048);
    }
}
