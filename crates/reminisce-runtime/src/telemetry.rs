//! Log output and span export for the session core.
//!
//! [`init_tracing`] installs one global subscriber: an [`EnvFilter`], a
//! console formatter, and (when a collector is configured) an OTLP/HTTP
//! span exporter.
//!
//! # Spans
//!
//! Every background job the session core starts runs inside its own span,
//! so an exported trace shows one row per piece of slow work:
//!
//! | Span | Level | Fields | Opened by |
//! |---|---|---|---|
//! | `recognition` | debug | `tick` | presence loop, one per polled frame |
//! | `greeting` | info | `identity`, `token` | orchestrator, per session start |
//! | `playback` | info | `token` | playback arbiter, per utterance |
//! | `consolidation` | info | `identity` | consolidation worker, per transcript |
//!
//! Aborted greetings and utterances close their span early, which makes
//! cancelled work visible next to the session that replaced it.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `info`). `reminisce_runtime=debug` adds the recognition spans. |
//! | `REMINISCE_LOG_FORMAT` | `json` for newline-delimited JSON, anything else for compact text. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | Collector base URL (e.g. `http://localhost:4318`); enables span export. |
//!
//! # Example
//!
//! ```rust,no_run
//! // Keep the guard alive until the process exits.
//! let _guard = reminisce_runtime::telemetry::init_tracing("reminisce");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info";
const TRACER_NAME: &str = "reminisce-session";

/// Console log encoding, chosen by `REMINISCE_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        Self::parse(std::env::var("REMINISCE_LOG_FORMAT").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Install the global subscriber. Call once, before the Tokio runtime is
/// built.
///
/// The returned guard flushes exported spans when dropped; hold it in
/// `main`.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let console = match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
    };
    let provider = build_provider(service_name);
    let export = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(TRACER_NAME)));

    tracing_subscriber::registry()
        .with(console)
        .with(export)
        .with(filter)
        .init();

    tracing::info!(
        service = service_name,
        exporting = provider.is_some(),
        "tracing initialised"
    );
    TracerProviderGuard(provider)
}

/// Shuts the tracer provider down on drop, flushing pending spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// `true` when spans are being exported to a collector.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[reminisce] span exporter shutdown failed: {e}");
        }
    }
}

/// `None` without `OTEL_EXPORTER_OTLP_ENDPOINT`, or when the exporter
/// cannot be built (reported on stderr; logging still works).
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[reminisce] span exporter unavailable: {e}"))
        .ok()?;

    // Simple (synchronous) export: no runtime exists yet when this runs.
    Some(
        SdkTracerProvider::builder()
            .with_resource(Resource::builder().with_service_name(service_name.to_string()).build())
            .with_simple_exporter(exporter)
            .build(),
    )
}
