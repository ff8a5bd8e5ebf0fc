//! Test utilities for otlp-stack integration tests.
//!
//! Provides:
//! - Addresses nothing listens on
//! - In-memory trace and metric pipelines
//! - Ready-made telemetry configurations

#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};

use otlp_stack::observability::init_test_logging;
use otlp_stack::telemetry::{EnvLevel, Meter, Providers, Telemetry, TelemetryConfig};
use opentelemetry_sdk::metrics::{InMemoryMetricExporter, PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};

/// Returns a local address that refuses connections.
pub fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    let addr = listener.local_addr().expect("no local addr");
    drop(listener);
    addr
}

/// Valid configuration exporting traces only.
pub fn trace_only_config(endpoint: &str) -> TelemetryConfig {
    init_test_logging();
    TelemetryConfig::new("svc", EnvLevel::Dev)
        .with_trace_endpoint(endpoint)
        .with_insecure(true)
}

/// Providers backed by in-memory exporters.
pub struct InMemoryPipelines {
    pub providers: Providers,
    pub spans: InMemorySpanExporter,
    pub metrics: InMemoryMetricExporter,
}

impl InMemoryPipelines {
    pub fn new(service_name: &str) -> Self {
        init_test_logging();
        let spans = InMemorySpanExporter::default();
        let metrics = InMemoryMetricExporter::default();

        let tracer_provider = SdkTracerProvider::builder()
            .with_simple_exporter(spans.clone())
            .build();
        let meter_provider = SdkMeterProvider::builder()
            .with_reader(PeriodicReader::builder(metrics.clone()).build())
            .build();

        Self {
            providers: Providers {
                trace: Some(Telemetry::from_provider(tracer_provider, service_name)),
                metric: Some(Meter::from_provider(meter_provider, service_name)),
            },
            spans,
            metrics,
        }
    }
}
