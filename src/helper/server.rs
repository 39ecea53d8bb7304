//! Native helper HTTP server
//!
//! Serves the same contract as the materialized default program, so the host
//! can be pointed at either.

use std::future::Future;

use axum::{
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::protocol::{ErrorBody, HealthStatus, TroubleshootRequest};
use super::responder;
use crate::metrics::HELPER_QUERIES;

/// Create the helper router
pub fn create_router() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/troubleshoot", post(troubleshoot))
}

/// Serve the helper on an already bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Helper listening");
    }
    axum::serve(listener, create_router())
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> Json<HealthStatus> {
    debug!("Health check endpoint called");
    Json(HealthStatus::ok())
}

async fn troubleshoot(body: Bytes) -> Response {
    let request = match parse_request(&body) {
        Some(request) => request,
        None => {
            warn!("Missing query parameter");
            return error_response(StatusCode::BAD_REQUEST, "Missing query parameter");
        }
    };

    let preview: String = request.query.chars().take(50).collect();
    info!(query = %preview, has_context = !request.context.is_empty(), "Troubleshoot endpoint called");

    let answer = responder::respond(&request.query, &request.context);
    HELPER_QUERIES
        .with_label_values(&[answer.template.label()])
        .inc();

    Json(answer.into_response()).into_response()
}

/// Accept any JSON object carrying a string `query`; anything else is a 400
fn parse_request(body: &[u8]) -> Option<TroubleshootRequest> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let query = value.get("query")?.as_str()?.to_string();
    let context = value
        .get("context")
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string();
    Some(TroubleshootRequest { query, context })
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
