//! Exporter construction for each supported transport.
//!
//! - gRPC: OTLP over tonic, with metadata headers and optional gzip
//! - HTTP: OTLP/HTTP protobuf with plain headers
//! - Jaeger: OTLP/HTTP against a Jaeger collector's OTLP receiver (traces only)

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry_otlp::tonic_types::metadata::MetadataMap;
use opentelemetry_otlp::{
    Compression, MetricExporter, Protocol, SpanExporter, WithExportConfig, WithHttpConfig,
    WithTonicConfig,
};
use tokio::net::TcpStream;

use super::endpoint::{self, METRICS_PATH, TRACES_PATH};
use super::error::{BoxError, Error, Result};
use super::options::{TelemetryConfig, TransportOptions};

/// Transport used to reach the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Grpc,
    Http,
    Jaeger,
}

impl Transport {
    pub(crate) fn span_wire(self) -> Wire {
        match self {
            Self::Grpc => Wire::Grpc,
            Self::Http | Self::Jaeger => Wire::Http,
        }
    }

    /// Wire used for metrics, `None` when the transport only carries spans.
    pub(crate) fn metric_wire(self) -> Option<Wire> {
        match self {
            Self::Grpc => Some(Wire::Grpc),
            Self::Http => Some(Wire::Http),
            Self::Jaeger => None,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Grpc => "grpc",
            Self::Http => "http",
            Self::Jaeger => "jaeger",
        })
    }
}

/// OTLP encoding actually spoken on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wire {
    Grpc,
    Http,
}

/// Checks export headers and converts them into an HTTP header map.
pub(crate) fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let invalid = || Error::InvalidHeader { name: name.clone() };
        let key = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        map.insert(key, value);
    }
    Ok(map)
}

/// Dials `endpoint` once, bounded by `timeout`.
///
/// Used when a blocking gRPC connection is requested so that an unreachable
/// collector fails construction instead of the first export.
pub(crate) async fn dial(endpoint: &str, timeout: Duration) -> Result<()> {
    let authority = endpoint::normalize(endpoint)
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string();

    match tokio::time::timeout(timeout, TcpStream::connect(authority.as_str())).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(source)) => Err(Error::Connect {
            endpoint: authority,
            source,
        }),
        Err(_) => Err(Error::ConnectTimeout {
            endpoint: authority,
            timeout,
        }),
    }
}

macro_rules! otlp_exporter {
    ($exporter:ident, $wire:expr, $endpoint:expr, $path:expr, $options:expr) => {{
        let options: &TransportOptions = $options;
        match $wire {
            Wire::Grpc => {
                let mut builder = $exporter::builder()
                    .with_tonic()
                    .with_endpoint(endpoint::transport_url($endpoint, options.insecure, None))
                    .with_timeout(options.effective_timeout());
                if !options.headers.is_empty() {
                    let metadata = MetadataMap::from_headers(header_map(&options.headers)?);
                    builder = builder.with_metadata(metadata);
                }
                if options.gzip {
                    builder = builder.with_compression(Compression::Gzip);
                }
                builder.build().map_err(BoxError::from)
            }
            Wire::Http => {
                let mut builder = $exporter::builder()
                    .with_http()
                    .with_endpoint(endpoint::transport_url(
                        $endpoint,
                        options.insecure,
                        Some($path),
                    ))
                    .with_protocol(Protocol::HttpBinary)
                    .with_timeout(options.effective_timeout());
                if !options.headers.is_empty() {
                    header_map(&options.headers)?;
                    builder = builder.with_headers(options.headers.clone());
                }
                builder.build().map_err(BoxError::from)
            }
        }
    }};
}

pub(crate) fn span_exporter(transport: Transport, config: &TelemetryConfig) -> Result<SpanExporter> {
    otlp_exporter!(
        SpanExporter,
        transport.span_wire(),
        &config.trace_endpoint,
        TRACES_PATH,
        &config.transport
    )
    .map_err(Error::TraceExporter)
}

pub(crate) fn metric_exporter(wire: Wire, config: &TelemetryConfig) -> Result<MetricExporter> {
    otlp_exporter!(
        MetricExporter,
        wire,
        &config.metric_endpoint,
        METRICS_PATH,
        &config.transport
    )
    .map_err(Error::MetricExporter)
}
