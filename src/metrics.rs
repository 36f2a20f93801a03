use std::time::{Duration, Instant};

use anyhow::Result;
use opentelemetry::{metrics::Histogram, KeyValue};
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::{
    metrics::{PeriodicReader, SdkMeterProvider},
    Resource,
};

pub fn low_latency_boundaries() -> Vec<f64> {
    vec![
        0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0,
    ]
}

pub fn init_provider(
    enable_metrics: bool,
    endpoint: Option<&String>,
    interval: Duration,
    instance_id: Option<&String>,
    service_version: &str,
) -> Result<Option<SdkMeterProvider>> {
    if !enable_metrics {
        return Ok(None);
    }

    let mut resource_builder = Resource::builder()
        .with_attribute(KeyValue::new("service.namespace", "memoria"))
        .with_attribute(KeyValue::new("service.name", "memoria-server"))
        .with_attribute(KeyValue::new(
            "service.version",
            service_version.to_string(),
        ));

    if let Some(instance_id) = instance_id {
        resource_builder = resource_builder.with_attribute(KeyValue::new(
            "memoria.instance.id",
            instance_id.to_owned(),
        ));
    }

    let resource = resource_builder.build();

    let mut exporter = MetricExporter::builder().with_tonic();
    if let Some(endpoint) = endpoint {
        exporter = exporter.with_endpoint(endpoint.to_owned());
    }
    let exporter = exporter.build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(interval)
        .build();

    let provider = SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build();

    opentelemetry::global::set_meter_provider(provider.clone());
    Ok(Some(provider))
}

pub mod upload_stats {
    use opentelemetry::metrics::{Counter, Histogram};

    use super::low_latency_boundaries;

    #[derive(Debug)]
    pub struct Metrics {
        pub uploads: Counter<u64>,
        pub upload_bytes: Counter<u64>,
        pub upload_failures: Counter<u64>,
        pub gateway_latency: Histogram<f64>,
    }

    impl Default for Metrics {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Metrics {
        pub fn new() -> Metrics {
            let meter = opentelemetry::global::meter("upload-gateway");
            let uploads = meter
                .u64_counter("memoria.uploads")
                .with_description("number of uploads accepted by the storage network")
                .build();
            let upload_bytes = meter
                .u64_counter("memoria.upload_bytes")
                .with_description("number of bytes submitted to the storage network")
                .build();
            let upload_failures = meter
                .u64_counter("memoria.upload_failures")
                .with_description("number of failed uploads, by failure kind")
                .build();
            let gateway_latency = meter
                .f64_histogram("memoria.gateway_request_duration")
                .with_unit("s")
                .with_boundaries(low_latency_boundaries())
                .with_description("storage gateway request latencies in seconds")
                .build();
            Metrics {
                uploads,
                upload_bytes,
                upload_failures,
                gateway_latency,
            }
        }
    }
}

/// Records the time between creation and drop into a histogram.
pub struct Timer<'a> {
    start: Instant,
    metric: &'a Histogram<f64>,
    labels: &'a [KeyValue],
}

impl<'a> Timer<'a> {
    pub fn start_with_labels(metric: &'a Histogram<f64>, labels: &'a [KeyValue]) -> Self {
        Self {
            start: Instant::now(),
            metric,
            labels,
        }
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.metric
            .record(self.start.elapsed().as_secs_f64(), self.labels);
    }
}
