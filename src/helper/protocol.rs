//! Wire types of the helper's HTTP contract
//!
//! ```text
//! GET  /health        → 200 {"status": "ok"}
//! POST /troubleshoot  {query, context?}
//!                     → 200 {answer, score, explanation, sources?}
//!                     → 4xx/5xx {error}
//! ```

use serde::{Deserialize, Serialize};

/// Body of `POST /troubleshoot`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TroubleshootRequest {
    pub query: String,
    #[serde(default)]
    pub context: String,
}

impl TroubleshootRequest {
    pub fn new(query: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            context: context.into(),
        }
    }
}

/// Successful answer from the helper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TroubleshootResponse {
    pub answer: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
