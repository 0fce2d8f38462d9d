//! API client for communicating with the podium daemon

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the podium operator API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    ///
    /// Registration and timed runs block on the daemon for as long as the
    /// fleet takes, so the request timeout is generous.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("Invalid path")
    }

    async fn send(request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        Ok(response)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = Self::send(self.client.get(self.url(path)?)).await?;
        response.json().await.context("Failed to parse response")
    }

    /// Make a GET request with query parameters
    pub async fn get_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T> {
        let response = Self::send(self.client.get(self.url(path)?).query(query)).await?;
        response.json().await.context("Failed to parse response")
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let response = Self::send(self.client.post(self.url(path)?).json(body)).await?;
        response.json().await.context("Failed to parse response")
    }

    /// Make a POST request whose response carries no body
    pub async fn post_no_content<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        Self::send(self.client.post(self.url(path)?).json(body)).await?;
        Ok(())
    }

    /// Make a PUT request whose response carries no body
    pub async fn put<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        Self::send(self.client.put(self.url(path)?).json(body)).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

// API request and response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddHostsRequest {
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddHostsResponse {
    pub added: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopServiceRequest {
    pub hosts: Vec<String>,
    pub remove_db: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostsResponse {
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostUpResponse {
    pub host: String,
    pub up: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointResponse {
    pub endpoint: String,
    pub host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTrafficRequest {
    pub src: String,
    pub dst: String,
    pub port: u16,
    pub protocol: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshRequest {
    pub hosts: Vec<String>,
    pub port: u16,
    pub protocol: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReqidResponse {
    pub reqid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficRule {
    pub reqid: String,
    pub ruleid: String,
    pub src: String,
    pub dst: String,
    pub port: u16,
    pub protocol: String,
    pub connected: bool,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficRecord {
    pub source: String,
    pub destination: String,
    pub protocol: String,
    pub port: u16,
    pub result: bool,
    pub reqid: String,
    pub ruleid: String,
    pub latency: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficStats {
    pub reqid: String,
    pub success: usize,
    pub failure: usize,
    pub pass_percent: f64,
    pub fail_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Latency {
    pub reqid: String,
    pub method: String,
    pub latency: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamValue {
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub resource_sampler: bool,
    pub mock_traffic: bool,
    pub record_manager: bool,
    pub traffic_queue_depth: usize,
    pub resource_queue_depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_parses_stats() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/traffic/r1/stats")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"reqid":"r1","success":3,"failure":1,"pass_percent":75.0,"fail_percent":25.0}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let stats: TrafficStats = client.get("api/v1/traffic/r1/stats").await.unwrap();

        mock.assert_async().await;
        assert_eq!(stats.success, 3);
        assert_eq!(stats.pass_percent, 75.0);
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/endpoints/10.0.0.9")
            .with_status(404)
            .with_body(r#"{"error":"no host found for endpoint 10.0.0.9"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .get::<EndpointResponse>("api/v1/endpoints/10.0.0.9")
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("404"));
        assert!(message.contains("no host found for endpoint 10.0.0.9"));
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/traffic/mesh")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "hosts": ["h1", "h2"],
                "protocol": "TCP",
            })))
            .with_status(200)
            .with_body(r#"{"reqid":"abc"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let response: ReqidResponse = client
            .post(
                "api/v1/traffic/mesh",
                &MeshRequest {
                    hosts: vec!["h1".into(), "h2".into()],
                    port: 5000,
                    protocol: "TCP".into(),
                    connected: true,
                    duration_secs: None,
                },
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.reqid, "abc");
    }

    #[tokio::test]
    async fn test_query_parameters_are_encoded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/traffic/r1/latency")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("method".into(), "max".into()),
                mockito::Matcher::UrlEncoded("duration".into(), "60".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"reqid":"r1","method":"max","latency":20.5}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let query = vec![
            ("method".to_string(), "max".to_string()),
            ("duration".to_string(), "60".to_string()),
        ];
        let latency: Latency = client
            .get_query("api/v1/traffic/r1/latency", &query)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(latency.latency, 20.5);
    }
}
