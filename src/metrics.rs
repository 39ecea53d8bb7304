//! Prometheus metrics for the host and the native helper
//!
//! All metrics live in the default registry and are exposed by the panel at
//! `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_int_gauge, CounterVec, Encoder,
    Histogram, IntGauge, TextEncoder,
};

lazy_static! {
    /// Helper processes spawned, by reason ("startup" or "respawn")
    pub static ref HELPER_SPAWNS: CounterVec = register_counter_vec!(
        "troubleshooter_helper_spawns_total",
        "Helper processes spawned",
        &["reason"]
    )
    .expect("helper spawn counter registers");

    /// Liveness probes sent to the helper, by outcome ("ok" or "fail")
    pub static ref HEALTH_PROBES: CounterVec = register_counter_vec!(
        "troubleshooter_health_probes_total",
        "Liveness probes sent to the helper",
        &["outcome"]
    )
    .expect("health probe counter registers");

    /// Requests forwarded to the helper, by bridge command
    pub static ref FORWARDED_REQUESTS: CounterVec = register_counter_vec!(
        "troubleshooter_forwarded_requests_total",
        "Requests forwarded to the helper",
        &["command"]
    )
    .expect("forwarded request counter registers");

    /// Host errors surfaced to the panel, by error kind
    pub static ref HOST_ERRORS: CounterVec = register_counter_vec!(
        "troubleshooter_host_errors_total",
        "Errors surfaced to the panel",
        &["kind"]
    )
    .expect("host error counter registers");

    /// Round trip of a forwarded request in seconds
    pub static ref FORWARD_DURATION: Histogram = register_histogram!(
        "troubleshooter_forward_duration_seconds",
        "Round trip of a forwarded troubleshoot request"
    )
    .expect("forward duration histogram registers");

    /// 1 while the controller considers the helper healthy
    pub static ref HELPER_HEALTHY: IntGauge = register_int_gauge!(
        "troubleshooter_helper_healthy",
        "Whether the helper is considered healthy"
    )
    .expect("helper health gauge registers");

    /// Queries answered by the native helper, by matched template
    pub static ref HELPER_QUERIES: CounterVec = register_counter_vec!(
        "troubleshooter_helper_queries_total",
        "Queries answered by the native helper",
        &["template"]
    )
    .expect("helper query counter registers");
}

/// Render every registered metric in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
