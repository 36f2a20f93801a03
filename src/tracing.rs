use anyhow::Result;
use opentelemetry::{global, trace::TracerProvider as _};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    trace::{SdkTracerProvider, TracerProviderBuilder},
    Resource,
};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, Layer};

use crate::config::ServerConfig;

const SERVICE_NAME: &str = "memoria-server";

pub fn get_env_filter() -> tracing_subscriber::EnvFilter {
    // RUST_LOG used to control logging level.
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::default()
            .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
    })
}

pub fn get_log_layer<S>(config: &ServerConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    S: tracing::Subscriber,
{
    if config.structured_logging() {
        return Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_span_list(false)
                .flatten_event(true)
                .with_current_span(true),
        );
    }

    Box::new(tracing_subscriber::fmt::layer().compact())
}

fn span_exporter(config: &ServerConfig) -> Result<SdkTracerProvider> {
    let mut otlp = SpanExporter::builder().with_tonic();
    if let Some(endpoint) = &config.telemetry.endpoint {
        otlp = otlp.with_endpoint(endpoint.clone());
    }
    let exporter = otlp.build()?;
    Ok(TracerProviderBuilder::default()
        .with_resource(
            Resource::builder_empty()
                .with_service_name(SERVICE_NAME)
                .build(),
        )
        .with_batch_exporter(exporter)
        .build())
}

/// Log layer plus, when a tracer provider is given, a layer that turns
/// `tracing` spans into OpenTelemetry spans.
pub fn build_subscriber(
    config: &ServerConfig,
    tracer_provider: Option<&SdkTracerProvider>,
) -> Box<dyn tracing::Subscriber + Send + Sync> {
    let base = tracing_subscriber::Registry::default();
    match tracer_provider {
        Some(provider) => {
            let span_layer = tracing_opentelemetry::layer()
                .with_tracer(provider.tracer(SERVICE_NAME))
                .with_filter(get_env_filter());
            let log_layer = get_log_layer(config).with_filter(get_env_filter());
            Box::new(base.with(span_layer).with(log_layer))
        }
        None => {
            let log_layer = get_log_layer(config).with_filter(get_env_filter());
            Box::new(base.with(log_layer))
        }
    }
}

/// Installs the global subscriber. With `enable_tracing` spans are also
/// exported over OTLP; the returned provider must be shut down on exit to
/// flush them.
pub fn setup_tracing(config: &ServerConfig) -> Result<Option<SdkTracerProvider>> {
    let tracer_provider = if config.telemetry.enable_tracing {
        let provider = span_exporter(config)?;
        global::set_tracer_provider(provider.clone());
        Some(provider)
    } else {
        None
    };

    let subscriber = build_subscriber(config, tracer_provider.as_ref());
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        error!("logger was already initiated, continuing: {:?}", e);
    }
    Ok(tracer_provider)
}
