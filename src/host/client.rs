//! HTTP client for the helper's `/health` and `/troubleshoot` endpoints

use std::time::Duration;

use thiserror::Error;

use crate::helper::{ErrorBody, HealthStatus, TroubleshootRequest, TroubleshootResponse};

/// Why a helper call failed
///
/// Only `Transport` means the helper may be gone; the other variants come
/// from a helper that answered.
#[derive(Debug, Error)]
pub enum CallError {
    /// Connection refused, reset or timed out
    #[error("helper unreachable: {0}")]
    Transport(String),

    /// The helper answered with an error status
    #[error("helper returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The helper answered 2xx with a body we could not read
    #[error("invalid helper response: {0}")]
    Decode(String),
}

/// Client for the helper's HTTP contract
#[derive(Clone)]
pub struct HelperClient {
    base_url: String,
    client: reqwest::Client,
}

impl HelperClient {
    /// Create a new helper client
    ///
    /// # Arguments
    /// * `base_url` - Helper base URL (e.g., "http://127.0.0.1:5000")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Single liveness probe; true only for `200 {"status":"ok"}`
    pub async fn health(&self, timeout: Duration) -> bool {
        let endpoint = format!("{}/health", self.base_url);
        let response = match self.client.get(&endpoint).timeout(timeout).send().await {
            Ok(response) => response,
            Err(_) => return false,
        };
        if !response.status().is_success() {
            return false;
        }
        response
            .json::<HealthStatus>()
            .await
            .map(|status| status.is_ok())
            .unwrap_or(false)
    }

    /// POST `/troubleshoot` with an explicit deadline
    pub async fn troubleshoot(
        &self,
        request: &TroubleshootRequest,
        timeout: Duration,
    ) -> Result<TroubleshootResponse, CallError> {
        let endpoint = format!("{}/troubleshoot", self.base_url);
        let response = self
            .client
            .post(&endpoint)
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // Prefer the helper's {"error": ...} body, fall back to the status text
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or_else(|_| {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                });
            return Err(CallError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<TroubleshootResponse>().await.map_err(|e| {
            if e.is_timeout() {
                CallError::Transport(e.to_string())
            } else {
                CallError::Decode(e.to_string())
            }
        })
    }
}
