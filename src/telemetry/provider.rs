//! Provider facade: validates a configuration, builds the enabled pipelines
//! and installs them as process-wide defaults.

use opentelemetry::global;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use tracing::{debug, info, warn};

use super::error::{Error, Result};
use super::metric::{self, Meter};
use super::options::TelemetryConfig;
use super::resource::build_resource;
use super::trace::{self, Telemetry};
use super::transport::{self, Transport};

/// The pipelines built from one configuration.
///
/// A missing endpoint leaves the matching signal as `None`.
#[derive(Debug, Default)]
pub struct Providers {
    pub trace: Option<Telemetry>,
    pub metric: Option<Meter>,
}

impl Providers {
    pub fn is_empty(&self) -> bool {
        self.trace.is_none() && self.metric.is_none()
    }

    /// Installs the built providers and the W3C trace-context plus baggage
    /// propagator as process-wide defaults. Later installs replace earlier ones.
    pub fn install_global(&self) {
        if let Some(trace) = &self.trace {
            global::set_tracer_provider(trace.provider().clone());
        }
        if let Some(provider) = self.metric.as_ref().and_then(Meter::provider) {
            global::set_meter_provider(provider.clone());
        }
        global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ]));
    }

    pub fn shutdown(&self) -> Result<()> {
        shutdown(self.trace.as_ref(), self.metric.as_ref())
    }
}

/// Validates `config` and builds a provider for every enabled signal.
///
/// Validation runs before any exporter is created or connection attempted.
/// With a blocking gRPC connection requested, each endpoint is dialed first
/// and an unreachable collector fails the call.
pub async fn new_provider(transport: Transport, mut config: TelemetryConfig) -> Result<Providers> {
    match transport {
        Transport::Jaeger => config.validate_jaeger()?,
        Transport::Grpc | Transport::Http => config.validate()?,
    }
    transport::header_map(&config.transport.headers)?;

    let logger = config.logger.clone();
    let resource = build_resource(&config);
    let block = transport == Transport::Grpc && config.transport.grpc_block;
    let timeout = config.transport.effective_timeout();

    if !config.retry.is_default() {
        debug!(parent: &logger, retry = ?config.retry, "retry policy configured");
    }

    let trace = if config.trace_enabled() {
        if block {
            transport::dial(&config.trace_endpoint, timeout).await?;
        }
        let telemetry = trace::build(transport, &config, resource.clone())?;
        info!(
            parent: &logger,
            %transport,
            endpoint = %config.trace_endpoint,
            "trace provider started"
        );
        Some(telemetry)
    } else {
        None
    };

    let metric_options = std::mem::take(&mut config.metric);
    let metric = match transport.metric_wire() {
        Some(wire) if config.metric_enabled() => {
            if block && !metric_options.has_custom_reader() {
                transport::dial(&config.metric_endpoint, timeout).await?;
            }
            let meter = metric::build(wire, &config, metric_options, resource)?;
            info!(
                parent: &logger,
                %transport,
                endpoint = %config.metric_endpoint,
                "metric provider started"
            );
            Some(meter)
        }
        None if config.metric_enabled() => {
            warn!(
                parent: &logger,
                %transport,
                "transport exports traces only, ignoring metric endpoint"
            );
            None
        }
        _ => None,
    };

    Ok(Providers { trace, metric })
}

pub async fn new_grpc_provider(config: TelemetryConfig) -> Result<Providers> {
    new_provider(Transport::Grpc, config).await
}

pub async fn new_http_provider(config: TelemetryConfig) -> Result<Providers> {
    new_provider(Transport::Http, config).await
}

/// Builds a trace-only provider exporting to a Jaeger collector.
pub async fn new_jaeger_provider(config: TelemetryConfig) -> Result<Telemetry> {
    let providers = new_provider(Transport::Jaeger, config).await?;
    providers.trace.ok_or(Error::MissingConfig {
        fields: vec!["trace_endpoint"],
    })
}

/// Shuts down whichever pipelines are present.
///
/// Both are always attempted. When both fail the error carries both causes.
pub fn shutdown(trace: Option<&Telemetry>, metric: Option<&Meter>) -> Result<()> {
    combine(
        trace.map_or(Ok(()), Telemetry::shutdown),
        metric.map_or(Ok(()), Meter::shutdown),
    )
}

fn combine(trace: Result<()>, metric: Result<()>) -> Result<()> {
    match (trace, metric) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
        (Err(trace), Err(metric)) => Err(Error::Shutdown {
            trace: Box::new(trace),
            metric: Box::new(metric),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::EnvLevel;

    fn failed(message: &'static str) -> Error {
        Error::TraceShutdown(message.into())
    }

    #[test]
    fn test_combine_keeps_single_error() {
        assert!(combine(Ok(()), Ok(())).is_ok());
        let err = combine(Err(failed("boom")), Ok(())).unwrap_err();
        assert_eq!(err.to_string(), "boom");
        let err = combine(Ok(()), Err(Error::MetricShutdown("late".into()))).unwrap_err();
        assert_eq!(err.to_string(), "late");
    }

    #[test]
    fn test_combine_joins_both_errors() {
        let err = combine(
            Err(failed("trace down")),
            Err(Error::MetricShutdown("metric down".into())),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Shutdown { .. }));
        assert_eq!(err.to_string(), "trace: trace down, metric: metric down");
    }

    #[test]
    fn test_empty_shutdown_is_ok() {
        assert!(shutdown(None, None).is_ok());
        assert!(Providers::default().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_export() {
        let config = TelemetryConfig::new("", EnvLevel::Dev)
            .with_trace_endpoint("127.0.0.1:1")
            .with_grpc_connection_block(true);
        let err = new_provider(Transport::Grpc, config).await.unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_invalid_header_fails_before_export() {
        let config = TelemetryConfig::new("svc", EnvLevel::Dev)
            .with_trace_endpoint("127.0.0.1:1")
            .with_headers([("bad header".to_string(), "v".to_string())].into());
        let err = new_provider(Transport::Http, config).await.unwrap_err();
        assert!(matches!(err, Error::InvalidHeader { .. }));
    }
}
