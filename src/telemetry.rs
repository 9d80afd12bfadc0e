use once_cell::sync::Lazy;
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::{Protocol, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::{
    SCHEMA_URL,
    attribute::{SERVICE_NAME, SERVICE_VERSION},
    resource::DEPLOYMENT_ENVIRONMENT_NAME,
};
use rocket::{
    Data, Orbit, Request, Response, Rocket,
    fairing::{Fairing, Info, Kind},
};
use std::sync::Mutex;
use std::time::Instant;
use tonic::metadata::MetadataMap;
use tracing::{Span, info_span};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::env::is_production;

const DEFAULT_OTLP_ENDPOINT: &str = "https://api.honeycomb.io:443";

static TELEMETRY_GUARD: Lazy<Mutex<Option<OtelGuard>>> = Lazy::new(|| Mutex::new(None));

/// Per-request span and start time, kept in the request's local cache.
struct RequestTrace {
    span: Span,
    started: Instant,
}

impl RequestTrace {
    fn start(request: &Request<'_>) -> Self {
        let method = request.method().as_str();
        let path = request.uri().path().to_string();
        let headers = request.headers();
        let has_api_key = headers.contains("x-api-key") || headers.contains("authorization");

        let span = info_span!(
            "http_request",
            otel.name = format!("{} {}", method, path),
            http.method = method,
            http.uri = %request.uri(),
            http.route = tracing::field::Empty,
            http.status_code = tracing::field::Empty,
            http.duration_ms = tracing::field::Empty,
            auth.api_key = has_api_key,
        );

        Self {
            span,
            started: Instant::now(),
        }
    }
}

/// Opens one span per request and logs status and latency when it completes.
pub struct TelemetryFairing;

#[rocket::async_trait]
impl Fairing for TelemetryFairing {
    fn info(&self) -> Info {
        Info {
            name: "Request tracing",
            kind: Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let trace = RequestTrace::start(request);
        request.local_cache(|| trace);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let trace = request.local_cache(|| RequestTrace::start(request));
        let elapsed = trace.started.elapsed().as_millis() as i64;
        let status = response.status().code;

        // Routing has happened by now, so the matched route is known.
        if let Some(route) = request.route() {
            trace.span.record("http.route", route.uri.to_string());
        }
        trace.span.record("http.status_code", status);
        trace.span.record("http.duration_ms", elapsed);

        let _entered = trace.span.enter();
        if status >= 500 {
            tracing::error!(status, elapsed_ms = elapsed, "Request failed");
        } else {
            tracing::info!(status, elapsed_ms = elapsed, "Request completed");
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        shutdown_telemetry();
    }
}

fn resource() -> Resource {
    let environment = if is_production() { "production" } else { "develop" };

    Resource::builder()
        .with_schema_url(
            [
                KeyValue::new(SERVICE_NAME, env!("CARGO_PKG_NAME")),
                KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, environment),
            ],
            SCHEMA_URL,
        )
        .build()
}

/// OTLP/gRPC span exporter authenticated with a Honeycomb team key.
fn build_tracer_provider(api_key: &str, endpoint: &str) -> anyhow::Result<SdkTracerProvider> {
    let mut metadata = MetadataMap::new();
    metadata.insert("x-honeycomb-team", api_key.parse()?);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_tls_config(tonic::transport::ClientTlsConfig::new().with_native_roots())
        .with_protocol(Protocol::Grpc)
        .with_metadata(metadata)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource())
        .with_batch_exporter(exporter)
        .build())
}

/// Exporter from `HONEYCOMB_API_KEY` and optional `OTEL_EXPORTER_OTLP_ENDPOINT`.
/// `None` when no key is configured or the exporter cannot be built.
fn tracer_provider_from_env() -> Option<SdkTracerProvider> {
    let api_key = dotenvy::var("HONEYCOMB_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())?;
    let endpoint = dotenvy::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string());

    match build_tracer_provider(&api_key, &endpoint) {
        Ok(provider) => Some(provider),
        Err(err) => {
            eprintln!("OTLP exporter unavailable, logging locally only: {}", err);
            None
        }
    }
}

pub struct OtelGuard {
    tracer_provider: SdkTracerProvider,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(err) = self.tracer_provider.shutdown() {
            eprintln!("Failed to shut down tracer provider: {:?}", err);
        }
    }
}

/// Installs the global subscriber. A second call is a no-op.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let tracer_provider = tracer_provider_from_env();
    let otel_layer = tracer_provider
        .as_ref()
        .map(|provider| OpenTelemetryLayer::new(provider.tracer(env!("CARGO_PKG_NAME"))));

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer)
        .try_init()
        .is_ok();

    if let (true, Some(tracer_provider)) = (installed, tracer_provider) {
        if let Ok(mut guard) = TELEMETRY_GUARD.lock() {
            *guard = Some(OtelGuard { tracer_provider });
        }
    }
}

/// Flushes and stops the exporter, if one was installed.
pub fn shutdown_telemetry() {
    tracing::info!("Shutting down telemetry");

    let guard = TELEMETRY_GUARD.lock().ok().and_then(|mut g| g.take());
    drop(guard);
}
