pub mod meter;

use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{ExporterBuildError, WithExportConfig};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use std::error::Error;
use std::time::Duration;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

//KNOWN ISSUES:
// - EnvFilter on layer-level looses log-statements when shared between layers, so every layer gets its own instance

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitoringConfig {
    pub service_name: String,
    #[serde(default)]
    pub logs: EnvFilterConfig,
    #[serde(default)]
    pub traces: EnvFilterConfig,
    pub otlp: Option<OtlpConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EnvFilterConfig {
    pub default_level: String,
    #[serde(default)]
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct OtlpConfig {
    pub url: Option<String>,
}

impl Default for EnvFilterConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_owned(),
            filters: vec![],
        }
    }
}

impl TryInto<EnvFilter> for EnvFilterConfig {
    type Error = tracing_subscriber::filter::ParseError;

    fn try_into(self) -> Result<EnvFilter, Self::Error> {
        EnvFilter::builder()
            .with_default_directive(self.default_level.parse()?)
            .parse(self.filters.join(","))
    }
}

impl MonitoringConfig {
    pub fn init(&self) -> Result<(), Box<dyn Error>> {
        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::default());

        match &self.otlp {
            Some(otlp_config) => self.init_with_otlp(otlp_config),
            None => self.init_console_only(),
        }
    }

    fn init_console_only(&self) -> Result<(), Box<dyn Error>> {
        let logging_filter: EnvFilter = self.logs.clone().try_into()?;
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(logging_filter)
            .init();

        Ok(())
    }

    fn init_with_otlp(&self, otlp_config: &OtlpConfig) -> Result<(), Box<dyn Error>> {
        let resource = Resource::builder()
            .with_attribute(KeyValue::new("service.name", self.service_name.clone()))
            .build();

        let fmt_filter: EnvFilter = self.logs.clone().try_into()?;
        let fmt_layer = tracing_subscriber::fmt::layer().with_filter(fmt_filter);

        let logger_provider = init_logs(resource.clone(), otlp_config.url.clone())?;
        let logging_filter: EnvFilter = self.logs.clone().try_into()?;
        let logging_layer = OpenTelemetryTracingBridge::new(&logger_provider).with_filter(logging_filter);

        let tracer_provider = init_traces(resource.clone(), otlp_config.url.clone())?;
        let tracer = tracer_provider.tracer(self.service_name.to_owned());
        let tracing_filter: EnvFilter = self.traces.clone().try_into()?;
        let tracing_layer = OpenTelemetryLayer::new(tracer).with_filter(tracing_filter);

        let metrics = init_metrics(resource, otlp_config.url.clone())?;
        opentelemetry::global::set_meter_provider(metrics);

        tracing_subscriber::registry()
            .with(tracing_layer)
            .with(logging_layer)
            .with(fmt_layer)
            .init();

        Ok(())
    }
}

fn init_traces(resource: Resource, url: Option<String>) -> Result<SdkTracerProvider, ExporterBuildError> {
    let builder = SdkTracerProvider::builder().with_resource(resource);

    match url {
        Some(url) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(url)
                .build()?;
            Ok(builder.with_batch_exporter(exporter).build())
        }
        None => Ok(builder
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build()),
    }
}

fn init_metrics(resource: Resource, url: Option<String>) -> Result<SdkMeterProvider, ExporterBuildError> {
    let builder = SdkMeterProvider::builder().with_resource(resource);

    match url {
        Some(url) => {
            let exporter = opentelemetry_otlp::MetricExporter::builder()
                .with_tonic()
                .with_endpoint(url)
                .build()?;
            let reader = PeriodicReader::builder(exporter)
                .with_interval(Duration::from_secs(15))
                .build();
            Ok(builder.with_reader(reader).build())
        }
        None => {
            let reader = PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
                .with_interval(Duration::from_secs(60))
                .build();
            Ok(builder.with_reader(reader).build())
        }
    }
}

fn init_logs(resource: Resource, url: Option<String>) -> Result<SdkLoggerProvider, ExporterBuildError> {
    let builder = SdkLoggerProvider::builder().with_resource(resource);

    match url {
        Some(url) => {
            let exporter = opentelemetry_otlp::LogExporter::builder()
                .with_tonic()
                .with_endpoint(url)
                .build()?;
            Ok(builder.with_batch_exporter(exporter).build())
        }
        None => Ok(builder
            .with_simple_exporter(opentelemetry_stdout::LogExporter::default())
            .build()),
    }
}
