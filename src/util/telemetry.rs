use std::time::Duration;

use opentelemetry::{KeyValue, global};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{self, Protocol, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::util::env;

pub type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>;

/// OTLP log/trace/metric providers behind a single register/shutdown lifecycle.
///
/// When no collector endpoint is configured the tracer falls back to a stdout
/// span exporter and the log/metric providers are skipped entirely, so a dev
/// box without a collector still gets console output.
pub struct Telemetry {
    pub tracer_name: String,

    logger_provider: Option<SdkLoggerProvider>,
    tracer_provider: SdkTracerProvider,
    meter_provider: Option<SdkMeterProvider>,
}

impl Telemetry {
    pub async fn new() -> Result<Telemetry> {
        let vars = env::vars().await?;
        let service_name = vars.api_service_name.clone();
        let tracer_name = vars.api_tracer_name.clone();
        let service_version = env!("CARGO_PKG_VERSION");

        let base_resource = base_attrs(service_name, service_version);

        let (logger_provider, tracer_provider, meter_provider) =
            match vars.otel_exporter_otlp_endpoint.as_deref() {
                Some(collector_url) => (
                    Some(build_logger_provider(collector_url, base_resource.clone())?),
                    build_tracer_provider(collector_url, base_resource.clone())?,
                    Some(build_meter_provider(collector_url, base_resource.clone())?),
                ),
                None => (None, build_stdout_provider()?, None),
            };

        Ok(Self {
            tracer_name,
            logger_provider,
            tracer_provider,
            meter_provider,
        })
    }

    pub fn register(self) -> Self {
        global::set_tracer_provider(self.tracer_provider.clone());
        let tracer = global::tracer(self.tracer_name.clone());
        let trace_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        let log_layer = self
            .logger_provider
            .as_ref()
            .map(OpenTelemetryTracingBridge::new);
        let meter_layer = self
            .meter_provider
            .clone()
            .map(tracing_opentelemetry::MetricsLayer::new);

        tracing_subscriber::registry()
            .with(trace_layer)
            .with(log_layer)
            .with(meter_layer)
            .with(EnvFilter::new(
                "verdant_server=debug,tower_http=debug,axum=debug,sqlx=info,info",
            ))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .init();

        self
    }

    pub fn shutdown(self) {
        if let Some(meter_provider) = self.meter_provider {
            if let Err(e) = meter_provider.shutdown() {
                eprintln!("error during metering shutdown: {e:?}");
            } else {
                println!("metering shut down ok");
            }
        }

        if let Some(logger_provider) = self.logger_provider {
            if let Err(e) = logger_provider.shutdown() {
                eprintln!("error during logging shutdown: {e:?}");
            } else {
                println!("logging shut down ok");
            }
        }

        if let Err(e) = self.tracer_provider.shutdown() {
            eprintln!("error during tracing shutdown: {e:?}");
        } else {
            println!("tracing shut down ok");
        }
    }
}

pub fn build_logger_provider(
    collector_url: &str,
    base_resource: Resource,
) -> Result<SdkLoggerProvider> {
    let exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(Endpoint::Logs.to_url(collector_url))
        .with_timeout(Duration::from_secs(5))
        .build()?;

    Ok(SdkLoggerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(base_resource.clone())
        .build())
}

pub fn build_tracer_provider(
    collector_url: &str,
    base_resource: Resource,
) -> Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(Endpoint::Traces.to_url(collector_url))
        .with_timeout(Duration::from_secs(5))
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(base_resource.clone())
        .build();

    Ok(provider)
}

pub fn build_meter_provider(
    collector_url: &str,
    base_resource: Resource,
) -> Result<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(Endpoint::Metrics.to_url(collector_url))
        .with_timeout(Duration::from_secs(5))
        .build()?;

    Ok(SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .with_resource(base_resource.clone())
        .build())
}

/// Console-only span export for development boxes without an OTEL collector
fn build_stdout_provider() -> Result<SdkTracerProvider> {
    let exporter = opentelemetry_stdout::SpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter)
        .with_id_generator(RandomIdGenerator::default())
        .with_sampler(Sampler::AlwaysOn)
        .build();

    Ok(provider)
}

fn base_attrs(name: String, version: &'static str) -> Resource {
    Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", name),
            KeyValue::new("service.version", version),
        ])
        .build()
}

enum Endpoint {
    Logs,
    Traces,
    Metrics,
}

impl Endpoint {
    pub fn to_url(&self, collector_endpoint: &str) -> String {
        let location: &str = match self {
            Endpoint::Logs => "/v1/logs",
            Endpoint::Traces => "/v1/traces",
            Endpoint::Metrics => "/v1/metrics",
        };
        format!("{collector_endpoint}{location}")
    }
}
