//! Logging and optional OpenTelemetry export
//!
//! Console logging always goes to stderr (stdout stays free for the helper
//! binary's own banner). When an OTLP endpoint is given, spans are also
//! exported through a batching tonic exporter.
//!
//! ```text
//! troubleshooter → fmt layer (stderr, text or JSON)
//!                → OTLP (gRPC) → collector   [only with --otlp-endpoint]
//! ```

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
const DEFAULT_FILTER: &str = "info,matlab_troubleshooter=debug";

/// Options for [`init_tracing`]
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Force debug level for everything
    pub verbose: bool,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
    /// OTLP collector endpoint, e.g. `http://localhost:4317`
    pub otlp_endpoint: Option<String>,
}

/// Initialize the tracing subsystem
///
/// # Arguments
/// * `service_name` - Name for the service in exported traces
/// * `options` - Verbosity, output format and optional OTLP endpoint
pub fn init_tracing(
    service_name: &str,
    options: &LogOptions,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = if options.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    let otel_layer = match options.otlp_endpoint.as_deref() {
        Some(endpoint) => {
            let tracer = build_tracer(service_name, endpoint)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let text_layer = (!options.json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
    });
    let json_layer = options
        .json
        .then(|| fmt::layer().json().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(otel_layer)
        .init();

    tracing::info!(
        service = service_name,
        otlp = options.otlp_endpoint.as_deref().unwrap_or("disabled"),
        "Tracing initialized"
    );

    Ok(())
}

fn build_tracer(
    service_name: &str,
    endpoint: &str,
) -> Result<sdktrace::Tracer, Box<dyn std::error::Error + Send + Sync>> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint);

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(vec![
            KeyValue::new("service.name", service_name.to_string()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])))
        .install_batch(runtime::Tokio)?;

    Ok(tracer)
}

/// Flush pending spans, if OTLP export was enabled
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}
