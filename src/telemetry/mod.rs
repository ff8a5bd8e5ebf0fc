//! Trace and metric provider construction.
//!
//! A [`TelemetryConfig`] is validated, turned into an OTLP exporter for the
//! chosen [`Transport`], and wrapped into narrow handles:
//!
//! - [`Telemetry`] for traces, starting [`ActiveSpan`]s
//! - [`Meter`] for metrics, creating typed instruments
//!
//! [`new_provider`] builds both from one configuration and
//! [`Providers::install_global`] makes them the process defaults.

mod endpoint;
mod env;
mod error;
pub mod host;
pub mod instrument;
mod metric;
mod options;
mod provider;
mod resource;
mod trace;
mod transport;

pub use endpoint::{normalize as normalize_endpoint, METRICS_PATH, TRACES_PATH};
pub use env::EnvLevel;
pub use error::{BoxError, Error, Result};
pub use instrument::{
    AsyncKind, InstrumentOptions, Number, ObservableInstrument, Observer, Registration,
    SyncInstrument, SyncKind,
};
pub use metric::{Meter, DEFAULT_HISTOGRAM_BOUNDARIES};
pub use options::{
    MeterProviderHook, MetricOptions, RetryPolicy, TelemetryConfig, TraceOptions,
    TransportOptions, DEFAULT_TIMEOUT,
};
pub use provider::{
    new_grpc_provider, new_http_provider, new_jaeger_provider, new_provider, shutdown, Providers,
};
pub use resource::{build_resource, DEPLOYMENT_ENVIRONMENT, SERVICE_NAME};
pub use trace::{ActiveSpan, Telemetry};
pub(crate) use trace::start_span as trace_start;
pub use transport::Transport;
