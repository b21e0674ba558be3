use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, logs::SdkLoggerProvider, metrics::SdkMeterProvider, trace::SdkTracerProvider,
};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

const DEFAULT_FILTER: &str =
    "info,earnings_analyst=debug,h2=warn,hyper=warn,tonic=warn,opentelemetry=warn";

/// Holds the OpenTelemetry providers so they can be flushed on exit.
#[derive(Default)]
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
    logger_provider: Option<SdkLoggerProvider>,
}

impl TelemetryGuard {
    pub fn is_exporting(&self) -> bool {
        self.tracer_provider.is_some()
    }

    pub fn shutdown(self) {
        if let Some(provider) = self.tracer_provider
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!(error = %e, "tracer provider shutdown failed");
        }
        if let Some(provider) = self.meter_provider
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!(error = %e, "meter provider shutdown failed");
        }
        if let Some(provider) = self.logger_provider
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!(error = %e, "logger provider shutdown failed");
        }
    }
}

/// Installs the global tracing subscriber. OTLP export of spans, metrics and
/// logs is enabled only when an exporter endpoint is configured.
pub fn init_telemetry(config: &Config) -> anyhow::Result<TelemetryGuard> {
    let mut guard = TelemetryGuard::default();

    let (trace_layer, log_layer) = match &config.otel_exporter_endpoint {
        Some(endpoint) => {
            let resource = Resource::builder()
                .with_service_name(config.otel_service_name.clone())
                .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
                .with_attribute(KeyValue::new(
                    "deployment.environment",
                    config.environment.clone(),
                ))
                .build();

            let span_exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .with_timeout(Duration::from_secs(10))
                .build()?;
            let tracer_provider = SdkTracerProvider::builder()
                .with_batch_exporter(span_exporter)
                .with_resource(resource.clone())
                .build();
            global::set_tracer_provider(tracer_provider.clone());

            let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()?;
            let meter_provider = SdkMeterProvider::builder()
                .with_periodic_exporter(metric_exporter)
                .with_resource(resource.clone())
                .build();
            global::set_meter_provider(meter_provider.clone());

            let log_exporter = opentelemetry_otlp::LogExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()?;
            let logger_provider = SdkLoggerProvider::builder()
                .with_batch_exporter(log_exporter)
                .with_resource(resource)
                .build();

            let tracer = global::tracer(config.otel_service_name.clone());
            let trace_layer = OpenTelemetryLayer::new(tracer);
            let log_layer = OpenTelemetryTracingBridge::new(&logger_provider);

            guard.tracer_provider = Some(tracer_provider);
            guard.meter_provider = Some(meter_provider);
            guard.logger_provider = Some(logger_provider);

            (Some(trace_layer), Some(log_layer))
        }
        None => (None, None),
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = if config.is_production() {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().pretty().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(trace_layer)
        .with(log_layer)
        .with(fmt_layer)
        .try_init()?;

    tracing::info!(
        service = %config.otel_service_name,
        endpoint = config.otel_exporter_endpoint.as_deref().unwrap_or("disabled"),
        "Telemetry initialized"
    );

    Ok(guard)
}
