//! HTTP transport for OpenAI-compatible chat completion endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::ChatTransport;
use super::request::ChatResponse;
use crate::error::RecognitionError;
use crate::models::config::AppConfig;

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends chat completion requests over HTTPS with bearer authentication.
pub struct HttpTransport {
    http: Client,
    url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &AppConfig) -> Result<Self, RecognitionError> {
        Self::with_timeout(config, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(config: &AppConfig, timeout: Duration) -> Result<Self, RecognitionError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecognitionError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            url: format!("{}/chat/completions", config.base_url()),
            api_key: config.api_key.clone(),
            timeout,
        })
    }

    /// The full completions URL requests are sent to.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn map_error(&self, error: reqwest::Error) -> RecognitionError {
        if error.is_timeout() {
            RecognitionError::Timeout(self.timeout)
        } else {
            RecognitionError::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn complete(&self, payload: &Value) -> Result<String, RecognitionError> {
        debug!("POST {}", self.url);

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RecognitionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatResponse = response.json().await.map_err(|e| self.map_error(e))?;
        Ok(body.into_content())
    }
}
