//! Error taxonomy for telemetry provider construction and shutdown.

use std::time::Duration;
use thiserror::Error;

/// Boxed error coming out of the OpenTelemetry SDK or exporters.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used across the telemetry module.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while building or stopping telemetry providers.
#[derive(Debug, Error)]
pub enum Error {
    /// The application stage string is not one of dev/qa/prod.
    #[error("invalid application environment: {0:?}")]
    InvalidEnvironment(String),

    /// The configuration gate rejected the options before any network use.
    #[error("missing required fields: {}", fields.join(", "))]
    MissingConfig { fields: Vec<&'static str> },

    /// A header could not be turned into gRPC metadata or an HTTP header.
    #[error("invalid export header {name:?}")]
    InvalidHeader { name: String },

    /// An instrument name violates the OpenTelemetry naming rules.
    #[error("invalid instrument name {0:?}")]
    InvalidInstrumentName(String),

    /// Blocking dial to the collector failed.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// Blocking dial did not complete within its timeout.
    #[error("timed out after {timeout:?} connecting to {endpoint}")]
    ConnectTimeout { endpoint: String, timeout: Duration },

    /// The span exporter could not be built.
    #[error("failed to build span exporter: {0}")]
    TraceExporter(#[source] BoxError),

    /// The metric exporter could not be built.
    #[error("failed to build metric exporter: {0}")]
    MetricExporter(#[source] BoxError),

    /// Tracer provider shutdown failed.
    #[error("{0}")]
    TraceShutdown(#[source] BoxError),

    /// Meter provider shutdown failed.
    #[error("{0}")]
    MetricShutdown(#[source] BoxError),

    /// Both providers failed to shut down.
    #[error("trace: {trace}, metric: {metric}")]
    Shutdown { trace: Box<Error>, metric: Box<Error> },
}

impl Error {
    /// True for errors raised before any exporter or connection was created.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidEnvironment(_)
                | Self::MissingConfig { .. }
                | Self::InvalidHeader { .. }
                | Self::InvalidInstrumentName(_)
        )
    }
}
