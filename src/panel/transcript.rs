//! Per-panel chat transcript
//!
//! Holds the messages shown in one panel session plus the loading
//! indicators of requests still outstanding. Indicators are keyed by
//! request id, so a reply only clears its own.

use serde::Serialize;
use uuid::Uuid;

use super::markdown::{escape_html, render};
use crate::bridge::OutboundMessage;

/// First assistant message of every session
pub const WELCOME_TEXT: &str = "Hello! I'm your MATLAB troubleshooting assistant. Describe the error or problem you're seeing and I'll suggest a fix.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the transcript
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub source_refs: Vec<String>,
    pub confidence_score: f64,
    pub explanation: String,
    /// Question this answer responds to, used for improvement requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub improved: bool,
    pub is_error: bool,
    /// Thumbs up (true) or down (false), once given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<bool>,
}

impl ChatMessage {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role,
            text: text.into(),
            source_refs: Vec::new(),
            confidence_score: 0.0,
            explanation: String::new(),
            query: None,
            improved: false,
            is_error: false,
            feedback: None,
        }
    }
}

/// Loading indicator of an outstanding request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingRequest {
    pub request_id: String,
    pub label: String,
}

/// `msg_<uuid v7>`, unique and time-ordered within a session
pub fn new_message_id() -> String {
    format!("msg_{}", Uuid::now_v7().simple())
}

#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    pending: Vec<PendingRequest>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    /// New session, opened with the welcome message
    pub fn new() -> Self {
        Self {
            messages: vec![ChatMessage::new(Role::Assistant, WELCOME_TEXT)],
            pending: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn pending(&self) -> &[PendingRequest] {
        &self.pending
    }

    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Append the user's question, returning its id
    pub fn push_user(&mut self, text: &str) -> String {
        let message = ChatMessage::new(Role::User, text);
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    /// Show a loading indicator, returning its request id
    pub fn begin_request(&mut self, label: &str) -> String {
        let request_id = Uuid::now_v7().to_string();
        self.pending.push(PendingRequest {
            request_id: request_id.clone(),
            label: label.to_string(),
        });
        request_id
    }

    /// Remove the loading indicator of `request_id` only
    pub fn finish_request(&mut self, request_id: &str) {
        self.pending.retain(|p| p.request_id != request_id);
    }

    /// Apply a bridge reply to the transcript and clear its indicator
    ///
    /// `query` is the question that produced the reply. Returns the id of the
    /// message that was added or updated.
    pub fn apply(&mut self, request_id: &str, reply: OutboundMessage, query: &str) -> String {
        self.finish_request(request_id);

        match reply {
            OutboundMessage::Response {
                text,
                sources,
                score,
                explanation,
            } => self.push_answer(text, sources, score, explanation, query),
            OutboundMessage::ImprovedResponse {
                text,
                sources,
                score,
                explanation,
                original_message_id,
            } => match self
                .messages
                .iter_mut()
                .find(|m| m.id == original_message_id)
            {
                Some(message) => {
                    message.text = text;
                    message.source_refs = sources;
                    message.confidence_score = score;
                    message.explanation = explanation;
                    message.improved = true;
                    message.feedback = None;
                    message.id.clone()
                }
                // Unknown target: show the answer as a new message
                None => self.push_answer(text, sources, score, explanation, query),
            },
            OutboundMessage::Error { text } => {
                let mut message = ChatMessage::new(Role::Assistant, text);
                message.is_error = true;
                let id = message.id.clone();
                self.messages.push(message);
                id
            }
        }
    }

    /// Record thumbs up/down; false when the id is unknown
    pub fn record_feedback(&mut self, id: &str, positive: bool) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.feedback = Some(positive);
                true
            }
            None => false,
        }
    }

    fn push_answer(
        &mut self,
        text: String,
        sources: Vec<String>,
        score: f64,
        explanation: String,
        query: &str,
    ) -> String {
        let mut message = ChatMessage::new(Role::Assistant, text);
        message.source_refs = sources;
        message.confidence_score = score;
        message.explanation = explanation;
        message.query = Some(query.to_string());
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    /// Render the whole transcript as HTML for the page
    pub fn render_html(&self) -> String {
        let mut html = String::new();
        for message in &self.messages {
            render_message(&mut html, message);
        }
        for pending in &self.pending {
            html.push_str(&format!(
                r#"<div class="message bot-message loading" data-request-id="{}"><div class="dot-flashing"></div><span>{}</span></div>"#,
                escape_html(&pending.request_id),
                escape_html(&pending.label)
            ));
        }
        html
    }
}

fn render_message(html: &mut String, message: &ChatMessage) {
    let class = match (message.role, message.is_error) {
        (Role::User, _) => "message user-message",
        (Role::Assistant, true) => "message bot-message error",
        (Role::Assistant, false) => "message bot-message",
    };
    let query_attr = message
        .query
        .as_deref()
        .map(|q| format!(r#" data-query="{}""#, escape_html(q)))
        .unwrap_or_default();

    html.push_str(&format!(
        r#"<div class="{}" data-message-id="{}"{}>"#,
        class,
        escape_html(&message.id),
        query_attr
    ));

    // User text is shown verbatim; answers go through markdown
    let content = match message.role {
        Role::User => render(&escape_html(&message.text)),
        Role::Assistant => render(&message.text),
    };
    html.push_str(&format!(r#"<div class="message-content">{}</div>"#, content));

    if message.role == Role::Assistant && !message.is_error {
        if message.query.is_some() {
            let (up, down) = match message.feedback {
                Some(true) => (" chosen", " disabled"),
                Some(false) => (" disabled", " chosen"),
                None => ("", ""),
            };
            html.push_str(&format!(
                r#"<div class="message-feedback"><button class="feedback-button thumbs-up{}" title="This answer was helpful">&#128077;</button><button class="feedback-button thumbs-down{}" title="This answer needs improvement">&#128078;</button></div>"#,
                up, down
            ));
        }
        if !message.source_refs.is_empty() {
            let sources: Vec<String> = message
                .source_refs
                .iter()
                .map(|s| format!("- {}", escape_html(s)))
                .collect();
            html.push_str(&format!(
                r#"<div class="sources"><strong>Sources:</strong><br>{}</div>"#,
                sources.join("<br>")
            ));
        }
        if message.improved {
            html.push_str(r#"<div class="improved-tag">Improved</div>"#);
        }
    }

    html.push_str("</div>");
}
