//! Chat bridge between a panel and its host controller
//!
//! Turns panel messages into helper requests and helper answers (or
//! failures) back into panel messages. Every failure is reported twice: as
//! a notification and as an inline `error` message.

pub mod messages;

pub use messages::{InboundMessage, OutboundMessage};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::HostError;
use crate::helper::TroubleshootRequest;
use crate::host::{HostController, Notifier};
use crate::metrics;

/// Inline text when the helper could not be brought up
pub const STARTUP_FAILED_TEXT: &str =
    "Failed to start the helper server. Please check the logs for details.";
/// Inline text when a question could not be answered
pub const ASK_FAILED_TEXT: &str =
    "Error connecting to the helper server. It is being restarted, please try again in a moment.";
/// Inline text when an improved answer could not be produced
pub const IMPROVE_FAILED_TEXT: &str = "Failed to get an improved response. Please try again.";

/// Context sent along with the original query to ask for a better answer
pub fn improvement_context(feedback: &str) -> String {
    format!(
        "The previous answer was not helpful.\nUser feedback: \"{}\".\nPlease provide an improved answer that addresses this feedback.",
        feedback
    )
}

/// One panel's message handler
pub struct ChatBridge {
    controller: HostController,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
}

impl ChatBridge {
    pub fn new(controller: HostController, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            controller,
            notifier,
            cancel: CancellationToken::new(),
        }
    }

    pub fn controller(&self) -> &HostController {
        &self.controller
    }

    /// Handle one inbound message; `None` when nothing goes back to the panel
    pub async fn handle(&self, message: InboundMessage) -> Option<OutboundMessage> {
        match message {
            InboundMessage::AskQuestion { text } => {
                let request = TroubleshootRequest::new(text, "");
                Some(
                    self.ask("askQuestion", request, ASK_FAILED_TEXT)
                        .await
                        .map_or_else(|text| text, OutboundMessage::response),
                )
            }
            InboundMessage::ImprovementFeedback {
                original_query,
                feedback,
                message_id,
            } => {
                let request =
                    TroubleshootRequest::new(original_query, improvement_context(&feedback));
                Some(
                    self.ask("improvementFeedback", request, IMPROVE_FAILED_TEXT)
                        .await
                        .map_or_else(|text| text, |answer| {
                            OutboundMessage::improved(answer, message_id)
                        }),
                )
            }
            InboundMessage::Feedback {
                message_id,
                is_positive,
                content,
            } => {
                info!(
                    message_id = %message_id,
                    positive = is_positive,
                    has_content = !content.is_empty(),
                    "Feedback received"
                );
                None
            }
        }
    }

    /// Bring the helper up when the panel opens
    ///
    /// Returns the inline error to show when startup failed; the failure has
    /// already been notified.
    pub async fn start(&self) -> Option<OutboundMessage> {
        match self.controller.ensure_ready().await {
            Ok(()) => None,
            Err(e) => Some(self.fail(&e, STARTUP_FAILED_TEXT)),
        }
    }

    /// Cancel in-flight requests and kill the helper
    pub async fn close(&self) {
        self.cancel.cancel();
        self.controller.shutdown().await;
    }

    async fn ask(
        &self,
        command: &'static str,
        request: TroubleshootRequest,
        failure_text: &str,
    ) -> Result<crate::helper::TroubleshootResponse, OutboundMessage> {
        let preview: String = request.query.chars().take(50).collect();
        info!(command, query = %preview, "Forwarding question to helper");

        if let Err(e) = self.controller.ensure_ready().await {
            return Err(self.fail(&e, STARTUP_FAILED_TEXT));
        }

        metrics::FORWARDED_REQUESTS.with_label_values(&[command]).inc();
        let token = self.cancel.child_token();
        self.controller
            .forward(&request, &token)
            .await
            .map_err(|e| self.fail(&e, failure_text))
    }

    fn fail(&self, error: &HostError, inline_text: &str) -> OutboundMessage {
        metrics::HOST_ERRORS.with_label_values(&[error.kind()]).inc();
        warn!(error = %error, kind = error.kind(), "Request failed");

        match error {
            HostError::Cancelled => OutboundMessage::error("Request cancelled."),
            HostError::UpstreamError(_) => {
                self.notifier
                    .show_error(&format!("Error connecting to helper server: {}", error));
                OutboundMessage::error(inline_text)
            }
            _ => {
                self.notifier
                    .show_error(&format!("Failed to start helper server: {}", error));
                OutboundMessage::error(inline_text)
            }
        }
    }
}
