//! Panel ⇄ host messages
//!
//! Every message is a JSON object tagged by `command`:
//!
//! ```text
//! panel → host   {"command":"askQuestion","text":"..."}
//!                {"command":"feedback","messageId":"msg_..","isPositive":false,"content":".."}
//!                {"command":"improvementFeedback","originalQuery":"..","feedback":"..","messageId":"msg_.."}
//! host → panel   {"command":"response","text":"..","sources":[..],"score":0.95,"explanation":".."}
//!                {"command":"improvedResponse",...,"originalMessageId":"msg_.."}
//!                {"command":"error","text":".."}
//! ```

use serde::{Deserialize, Serialize};

use crate::helper::TroubleshootResponse;

/// Messages sent by the panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum InboundMessage {
    AskQuestion {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Feedback {
        message_id: String,
        is_positive: bool,
        #[serde(default)]
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    ImprovementFeedback {
        original_query: String,
        feedback: String,
        message_id: String,
    },
}

impl InboundMessage {
    /// The `command` tag, for logs and metrics
    pub fn command(&self) -> &'static str {
        match self {
            InboundMessage::AskQuestion { .. } => "askQuestion",
            InboundMessage::Feedback { .. } => "feedback",
            InboundMessage::ImprovementFeedback { .. } => "improvementFeedback",
        }
    }
}

/// Messages sent to the panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum OutboundMessage {
    Response {
        text: String,
        sources: Vec<String>,
        score: f64,
        explanation: String,
    },
    #[serde(rename_all = "camelCase")]
    ImprovedResponse {
        text: String,
        sources: Vec<String>,
        score: f64,
        explanation: String,
        original_message_id: String,
    },
    Error {
        text: String,
    },
}

impl OutboundMessage {
    pub fn response(answer: TroubleshootResponse) -> Self {
        OutboundMessage::Response {
            text: answer.answer,
            sources: answer.sources,
            score: answer.score,
            explanation: answer.explanation,
        }
    }

    pub fn improved(answer: TroubleshootResponse, original_message_id: impl Into<String>) -> Self {
        OutboundMessage::ImprovedResponse {
            text: answer.answer,
            sources: answer.sources,
            score: answer.score,
            explanation: answer.explanation,
            original_message_id: original_message_id.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        OutboundMessage::Error { text: text.into() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, OutboundMessage::Error { .. })
    }
}
