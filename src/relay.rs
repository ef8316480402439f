use crate::messages::InferenceRequest;
use std::sync::LazyLock;
use std::time::Duration;

/// Time allowed for the remote service to describe a video.
pub const RELAY_TIMEOUT: Duration = Duration::from_secs(120);

// one connection pool for the whole process
static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(reqwest::Client::new);

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),
}

/// Client of the remote inference service.
#[derive(Clone)]
pub struct RelayClient {
    url: String,
    api_key: String,
    http: reqwest::Client,
}

impl RelayClient {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            http: HTTP_CLIENT.clone(),
        }
    }

    /// Uses `http` instead of the process-wide client.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Forwards `request` and returns the service's JSON answer untouched.
    ///
    /// Any non-2xx status is an error. Nothing is retried.
    pub async fn predict(&self, request: &InferenceRequest) -> Result<serde_json::Value, RelayError> {
        log::info!("Sending request to {}", self.url);
        log::info!("Request payload: {:?}", request);

        let response = self
            .http
            .post(&self.url)
            .header("Authorization", format!("Api-Key {}", self.api_key))
            .json(request)
            .timeout(RELAY_TIMEOUT)
            .send()
            .await?;

        log::info!("Inference service response status: {}", response.status());
        let result: serde_json::Value = response.error_for_status()?.json().await?;
        log::debug!("Inference service response body: {}", result);

        Ok(result)
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}
