//! Local web panel
//!
//! Serves the chat page and carries bridge messages over HTTP:
//! - `GET  /`                the page
//! - `POST /api/message`     one inbound bridge message, answered with the reply
//! - `GET  /api/transcript`  rendered transcript, helper phase, notifications
//! - `GET  /api/status`      helper lifecycle counters
//! - `GET  /metrics`         Prometheus text format
//! - `POST /api/close`       cancel in-flight requests, kill the helper, stop serving
//!
//! Asks are dispatched one at a time in arrival order.

pub mod markdown;
pub mod page;
pub mod transcript;

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::bridge::{ChatBridge, InboundMessage, OutboundMessage};
use crate::host::{ControllerStatus, HelperPhase, Notifier};
use crate::metrics;

pub use transcript::{ChatMessage, Role, Transcript};

const STARTING_LABEL: &str = "Starting helper server...";
const THINKING_LABEL: &str = "Thinking...";
const IMPROVING_LABEL: &str = "Improving answer based on your feedback...";
const MAX_NOTICES: usize = 50;

/// Where the panel listens
#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub host: String,
    pub port: u16,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

impl PanelConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A notification shown as a toast
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub id: u64,
    pub level: NoticeLevel,
    pub text: String,
}

/// Notifier that keeps the latest notifications for the page
#[derive(Default)]
pub struct NoticeBoard {
    notices: std::sync::Mutex<VecDeque<Notice>>,
    next_id: AtomicU64,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recent(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|notices| notices.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn push(&self, level: NoticeLevel, text: &str) {
        let notice = Notice {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            level,
            text: text.to_string(),
        };
        if let Ok(mut notices) = self.notices.lock() {
            if notices.len() == MAX_NOTICES {
                notices.pop_front();
            }
            notices.push_back(notice);
        }
    }
}

impl Notifier for NoticeBoard {
    fn show_info(&self, message: &str) {
        info!(notice = message, "Notification");
        self.push(NoticeLevel::Info, message);
    }

    fn show_error(&self, message: &str) {
        error!(notice = message, "Notification");
        self.push(NoticeLevel::Error, message);
    }
}

struct PanelInner {
    bridge: ChatBridge,
    transcript: Mutex<Transcript>,
    dispatch: Mutex<()>,
    notices: Arc<NoticeBoard>,
    closed: CancellationToken,
}

/// Panel application state
#[derive(Clone)]
pub struct PanelState {
    inner: Arc<PanelInner>,
}

impl PanelState {
    pub fn new(bridge: ChatBridge, notices: Arc<NoticeBoard>) -> Self {
        Self {
            inner: Arc::new(PanelInner {
                bridge,
                transcript: Mutex::new(Transcript::new()),
                dispatch: Mutex::new(()),
                notices,
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Resolves once the panel has been closed
    pub fn closed(&self) -> CancellationToken {
        self.inner.closed.clone()
    }

    pub async fn transcript(&self) -> Transcript {
        self.inner.transcript.lock().await.clone()
    }

    /// Start the helper as the panel opens
    ///
    /// Holds the dispatch turn so early asks queue behind startup. A failure
    /// is shown as a notification and as an inline error message.
    pub async fn open(&self) {
        let _turn = self.inner.dispatch.lock().await;
        let request_id = self.inner.transcript.lock().await.begin_request(STARTING_LABEL);
        let reply = self.inner.bridge.start().await;

        let mut transcript = self.inner.transcript.lock().await;
        match reply {
            Some(reply) => {
                transcript.apply(&request_id, reply, "");
            }
            None => transcript.finish_request(&request_id),
        }
    }

    /// Close the panel: cancel in-flight requests and kill the helper
    pub async fn close(&self) {
        if self.inner.closed.is_cancelled() {
            return;
        }
        info!("Panel closing");
        self.inner.closed.cancel();
        self.inner.bridge.close().await;
    }

    /// Run one inbound message through the transcript and the bridge
    pub async fn dispatch(&self, message: InboundMessage) -> MessageReply {
        match message {
            InboundMessage::AskQuestion { ref text } => {
                let query = text.trim().to_string();
                let request_id = {
                    let mut transcript = self.inner.transcript.lock().await;
                    transcript.push_user(&query);
                    transcript.begin_request(THINKING_LABEL)
                };
                let message = InboundMessage::AskQuestion { text: query.clone() };
                self.run(request_id, message, &query).await
            }
            InboundMessage::ImprovementFeedback {
                original_query,
                feedback,
                message_id,
            } => {
                let (request_id, query) = {
                    let mut transcript = self.inner.transcript.lock().await;
                    // The page may not know the question; the transcript does
                    let query = if original_query.trim().is_empty() {
                        transcript
                            .get(&message_id)
                            .and_then(|m| m.query.clone())
                            .unwrap_or_default()
                    } else {
                        original_query
                    };
                    (transcript.begin_request(IMPROVING_LABEL), query)
                };
                let message = InboundMessage::ImprovementFeedback {
                    original_query: query.clone(),
                    feedback,
                    message_id,
                };
                self.run(request_id, message, &query).await
            }
            InboundMessage::Feedback {
                message_id,
                is_positive,
                content,
            } => {
                {
                    let mut transcript = self.inner.transcript.lock().await;
                    if !transcript.record_feedback(&message_id, is_positive) {
                        debug!(message_id = %message_id, "Feedback for unknown message");
                    }
                }
                let feedback = InboundMessage::Feedback {
                    message_id,
                    is_positive,
                    content,
                };
                let reply = self.inner.bridge.handle(feedback).await;
                MessageReply {
                    request_id: None,
                    message_id: None,
                    reply,
                }
            }
        }
    }

    async fn run(&self, request_id: String, message: InboundMessage, query: &str) -> MessageReply {
        let reply = {
            // FIFO: tokio's mutex grants the lock in request order
            let _turn = self.inner.dispatch.lock().await;
            if self.inner.closed.is_cancelled() {
                OutboundMessage::error("Panel closed.")
            } else {
                self.inner
                    .bridge
                    .handle(message)
                    .await
                    .unwrap_or_else(|| OutboundMessage::error("No reply from helper."))
            }
        };

        let message_id = self
            .inner
            .transcript
            .lock()
            .await
            .apply(&request_id, reply.clone(), query);

        MessageReply {
            request_id: Some(request_id),
            message_id: Some(message_id),
            reply: Some(reply),
        }
    }
}

/// Response body of `POST /api/message`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReply {
    pub request_id: Option<String>,
    pub message_id: Option<String>,
    pub reply: Option<OutboundMessage>,
}

/// Response body of `GET /api/transcript`
#[derive(Serialize)]
struct TranscriptView {
    html: String,
    busy: bool,
    phase: HelperPhase,
    notices: Vec<Notice>,
}

/// Response body of `GET /api/status`
#[derive(Serialize)]
struct PanelStatus {
    helper: ControllerStatus,
    messages: usize,
    pending: usize,
    closed: bool,
}

/// Create the panel router
pub fn create_router(state: PanelState) -> Router {
    Router::new()
        .route("/", get(panel_page))
        .route("/api/message", post(post_message))
        .route("/api/transcript", get(get_transcript))
        .route("/api/status", get(get_status))
        .route("/api/close", post(close_panel))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
}

/// Serve the panel until `shutdown` resolves or the panel is closed
pub async fn serve<F>(listener: TcpListener, state: PanelState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Panel available at http://{}", addr);
    }
    let closed = state.closed();
    let shutdown_state = state.clone();
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown => {}
                _ = closed.cancelled() => {}
            }
            shutdown_state.close().await;
        })
        .await
}

async fn panel_page() -> Html<&'static str> {
    Html(page::PANEL_HTML)
}

async fn post_message(
    State(state): State<PanelState>,
    Json(message): Json<InboundMessage>,
) -> Response {
    if state.inner.closed.is_cancelled() {
        return (StatusCode::GONE, Json(OutboundMessage::error("Panel closed."))).into_response();
    }
    if let InboundMessage::AskQuestion { text } = &message {
        if text.trim().is_empty() {
            return (
                StatusCode::BAD_REQUEST,
                Json(OutboundMessage::error("Question is empty.")),
            )
                .into_response();
        }
    }
    debug!(command = message.command(), "Panel message");
    Json(state.dispatch(message).await).into_response()
}

async fn get_transcript(State(state): State<PanelState>) -> impl IntoResponse {
    let (html, busy) = {
        let transcript = state.inner.transcript.lock().await;
        (transcript.render_html(), !transcript.pending().is_empty())
    };
    Json(TranscriptView {
        html,
        busy,
        phase: state.inner.bridge.controller().phase().await,
        notices: state.inner.notices.recent(),
    })
}

async fn get_status(State(state): State<PanelState>) -> impl IntoResponse {
    let (messages, pending) = {
        let transcript = state.inner.transcript.lock().await;
        (transcript.messages().len(), transcript.pending().len())
    };
    Json(PanelStatus {
        helper: state.inner.bridge.controller().status().await,
        messages,
        pending,
        closed: state.inner.closed.is_cancelled(),
    })
}

async fn close_panel(State(state): State<PanelState>) -> impl IntoResponse {
    state.close().await;
    StatusCode::NO_CONTENT
}

async fn prometheus_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}
