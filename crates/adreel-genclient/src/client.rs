//! Generation service HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::error::{GenError, GenResult};
use crate::types::{PollResponse, SubmitRequest, SubmitResponse};

/// Contract with the external video generation service.
///
/// The pipeline is written against this trait; tests drive it with
/// scripted fakes. Retry policy lives with the caller; implementations
/// report each failure once.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Submit a prompt for generation, returning the service's job id.
    async fn submit(
        &self,
        prompt: &str,
        reference_image_url: Option<&str>,
    ) -> GenResult<String>;

    /// Poll a submitted job. Safe to call repeatedly.
    async fn poll(&self, external_job_id: &str) -> GenResult<PollResponse>;

    /// Download the produced asset from its short-lived URL.
    async fn fetch(&self, asset_url: &str) -> GenResult<Vec<u8>>;
}

/// Configuration for the HTTP generation client.
#[derive(Debug, Clone)]
pub struct GenClientConfig {
    /// Base URL of the generation service
    pub base_url: String,
    /// API key sent as a bearer token, if the deployment requires one
    pub api_key: Option<String>,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for GenClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl GenClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("GEN_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8002".to_string()),
            api_key: std::env::var("GEN_SERVICE_API_KEY").ok(),
            timeout: Duration::from_secs(
                std::env::var("GEN_SERVICE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }
}

/// HTTP implementation of `GenerationClient`.
pub struct HttpGenerationClient {
    http: Client,
    config: GenClientConfig,
}

impl HttpGenerationClient {
    /// Create a new client.
    pub fn new(config: GenClientConfig) -> GenResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(GenError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> GenResult<Self> {
        Self::new(GenClientConfig::from_env())
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn submit(
        &self,
        prompt: &str,
        reference_image_url: Option<&str>,
    ) -> GenResult<String> {
        let url = format!("{}/v1/videos", self.config.base_url);
        let body = SubmitRequest {
            prompt: prompt.to_string(),
            reference_image_url: reference_image_url.map(|s| s.to_string()),
        };

        debug!("Submitting generation request to {}", url);

        let response = self
            .request(self.http.post(&url))
            .json(&body)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let submit: SubmitResponse = response.json().await?;
                Ok(submit.job_id)
            }
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let detail = response.text().await.unwrap_or_default();
                Err(GenError::submission_rejected(detail))
            }
            status if status.is_server_error() => {
                let detail = response.text().await.unwrap_or_default();
                warn!("Generation service returned {}: {}", status, detail);
                Err(GenError::service_unavailable(format!("{status}: {detail}")))
            }
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(GenError::InvalidResponse(format!("{status}: {detail}")))
            }
        }
    }

    async fn poll(&self, external_job_id: &str) -> GenResult<PollResponse> {
        let url = format!("{}/v1/videos/{}", self.config.base_url, external_job_id);

        let response = self.request(self.http.get(&url)).send().await?;

        match response.status() {
            status if status.is_success() => {
                let poll: PollResponse = response.json().await?;
                Ok(poll)
            }
            StatusCode::NOT_FOUND => Err(GenError::NotFound(external_job_id.to_string())),
            status if status.is_server_error() => {
                let detail = response.text().await.unwrap_or_default();
                Err(GenError::service_unavailable(format!("{status}: {detail}")))
            }
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(GenError::InvalidResponse(format!("{status}: {detail}")))
            }
        }
    }

    async fn fetch(&self, asset_url: &str) -> GenResult<Vec<u8>> {
        debug!("Fetching generated asset from {}", asset_url);

        let response = self.http.get(asset_url).send().await?;

        match response.status() {
            status if status.is_success() => {
                let bytes = response.bytes().await?;
                Ok(bytes.to_vec())
            }
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN | StatusCode::GONE => Err(
                GenError::asset_unavailable(format!("{} returned {}", asset_url, response.status())),
            ),
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(GenError::InvalidResponse(format!("{status}: {detail}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RemoteJobState;
    use wiremock::matchers::{body_json_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpGenerationClient {
        HttpGenerationClient::new(GenClientConfig {
            base_url: server.uri(),
            api_key: None,
            timeout: Duration::from_secs(5),
        })
        .expect("client builds")
    }

    #[tokio::test]
    async fn test_submit_returns_job_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/videos"))
            .and(body_json_string(r#"{"prompt":"p"}"#))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "job_id": "ext-123"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let job_id = client.submit("p", None).await.unwrap();
        assert_eq!(job_id, "ext-123");
    }

    #[tokio::test]
    async fn test_submit_maps_rejection_and_outage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/videos"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad prompt"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/videos"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server);

        let rejected = client.submit("p", None).await.unwrap_err();
        assert!(matches!(rejected, GenError::SubmissionRejected(_)));
        assert!(!rejected.is_retryable());

        let outage = client.submit("p", None).await.unwrap_err();
        assert!(matches!(outage, GenError::ServiceUnavailable(_)));
        assert!(outage.is_retryable());
    }

    #[tokio::test]
    async fn test_poll_states() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/videos/ext-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "state": "done",
                "asset_url": "https://gen.example/out.mp4"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/videos/ext-missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);

        let poll = client.poll("ext-1").await.unwrap();
        assert_eq!(poll.state, RemoteJobState::Done);
        assert_eq!(poll.asset_url.as_deref(), Some("https://gen.example/out.mp4"));

        let missing = client.poll("ext-missing").await.unwrap_err();
        assert!(matches!(missing, GenError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fetch_maps_expired_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assets/out.mp4"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .fetch(&format!("{}/assets/out.mp4", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, GenError::AssetUnavailable(_)));
    }

    #[tokio::test]
    async fn test_fetch_returns_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assets/out.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"video-bytes".to_vec()))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let bytes = client
            .fetch(&format!("{}/assets/out.mp4", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, b"video-bytes");
    }
}
