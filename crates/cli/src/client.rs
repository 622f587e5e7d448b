//! API client for communicating with the GPU hub

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// Non-success reply from the hub
#[derive(Debug, Error)]
#[error("hub returned {status}: {message}")]
pub struct HubError {
    pub status: StatusCode,
    pub message: String,
}

impl HubError {
    /// Build from a response body, preferring the hub's `message` field
    fn from_body(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ApiResponse>(body)
            .map(|r| r.message)
            .unwrap_or_else(|_| body.trim().to_string());
        Self { status, message }
    }
}

/// API client for the hub
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let mut base_url = Url::parse(base_url).context("Invalid API URL")?;
        // Relative joins replace the last segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to reach the hub")?;

        Self::decode(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to reach the hub")?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HubError::from_body(status, &body).into());
        }

        response.json().await.context("Failed to parse response")
    }

    /// Latest status of every agent
    pub async fn data(&self) -> Result<BTreeMap<String, AgentStatus>> {
        self.get("api/data").await
    }

    /// History of one agent
    pub async fn agent_history(&self, agent: &str) -> Result<AgentHistory> {
        let mut url = self.base_url.join("api/history/").context("Invalid path")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API URL cannot be a base"))?
            .pop_if_empty()
            .push(agent);
        self.get(url.as_str()).await
    }

    /// Fleet counters
    pub async fn summary(&self) -> Result<FleetSummary> {
        self.get("api/summary").await
    }

    /// Push one snapshot
    pub async fn update(&self, snapshot: &serde_json::Value) -> Result<ApiResponse> {
        self.post("api/update", snapshot).await
    }
}

// API response types, mirroring the hub's camelCase JSON

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessUsage {
    pub pid: u32,
    pub name: String,
    pub memory_bytes_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSample {
    pub index: u32,
    pub name: String,
    pub temperature_c: Option<f64>,
    pub utilization_percent: f64,
    pub memory_used_label: String,
    pub memory_total_label: String,
    pub memory_used_percent: f64,
    pub power_draw_label: String,
    pub power_limit_label: String,
    #[serde(default)]
    pub processes: Vec<ProcessUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub online: bool,
    pub latest_timestamp: String,
    pub devices: Vec<DeviceSample>,
    #[serde(default)]
    pub last_seen_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentHistory {
    pub timestamps: Vec<String>,
    pub total_memory_percent: Vec<f64>,
    pub per_device_memory_percent: BTreeMap<u32, Vec<Option<f64>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetSummary {
    pub total_agents: usize,
    pub online_agents: usize,
    pub offline_agents: usize,
    pub online_devices: usize,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA_BODY: &str = r#"{
        "gpu-box-1": {
            "online": true,
            "latestTimestamp": "2024-01-01 10:00:00",
            "lastSeenSecs": 3,
            "devices": [{
                "index": 0, "name": "RTX4090", "temperatureC": null,
                "utilizationPercent": 45.0, "memoryUsedLabel": "8000 MiB",
                "memoryTotalLabel": "24000 MiB", "memoryUsedPercent": 33.3,
                "powerDrawLabel": "N/A", "powerLimitLabel": "N/A", "processes": []
            }]
        }
    }"#;

    #[tokio::test]
    async fn test_data_decodes_camel_case() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/data")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(DATA_BODY)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let data = tokio_test::assert_ok!(client.data().await);

        mock.assert_async().await;
        let agent = &data["gpu-box-1"];
        assert!(agent.online);
        assert_eq!(agent.last_seen_secs, 3);
        assert_eq!(agent.devices[0].memory_used_percent, 33.3);
        assert!(agent.devices[0].temperature_c.is_none());
    }

    #[tokio::test]
    async fn test_agent_history_decodes_null_gaps() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/history/gpu-box-1")
            .with_status(200)
            .with_body(
                r#"{"timestamps":["10:00:00"],"totalMemoryPercent":[12.5],
                    "perDeviceMemoryPercent":{"0":[12.5],"1":[null]}}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let history = client.agent_history("gpu-box-1").await.unwrap();

        mock.assert_async().await;
        assert_eq!(history.timestamps, vec!["10:00:00"]);
        assert_eq!(history.per_device_memory_percent[&1], vec![None]);
    }

    #[tokio::test]
    async fn test_error_body_message_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/history/ghost")
            .with_status(404)
            .with_body(r#"{"status":"error","message":"unknown agent: ghost"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.agent_history("ghost").await.unwrap_err();
        let hub_err = err.downcast_ref::<HubError>().unwrap();

        assert_eq!(hub_err.status, StatusCode::NOT_FOUND);
        assert_eq!(hub_err.message, "unknown agent: ghost");
    }

    #[tokio::test]
    async fn test_update_posts_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/update")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"agentName":"gpu-box-1"}"#.to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"status":"success","message":"Data updated"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let reply = client
            .update(&serde_json::json!({"agentName": "gpu-box-1", "devices": []}))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(reply.status, "success");
    }

    #[tokio::test]
    async fn test_base_path_prefix_is_kept() {
        let mut server = mockito::Server::new_async().await;
        let data = server
            .mock("GET", "/gpu/api/data")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let history = server
            .mock("GET", "/gpu/api/history/gpu-box-1")
            .with_status(200)
            .with_body(r#"{"timestamps":[],"totalMemoryPercent":[],"perDeviceMemoryPercent":{}}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&format!("{}/gpu", server.url())).unwrap();
        assert!(client.data().await.unwrap().is_empty());
        assert!(client.agent_history("gpu-box-1").await.unwrap().timestamps.is_empty());

        data.assert_async().await;
        history.assert_async().await;
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
