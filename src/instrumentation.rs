//! Startup facade turning process configuration into a ready [`Instrument`].

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use opentelemetry::{global, Context};
use tracing::Span;

use crate::config::AppConfig;
use crate::telemetry::host::{start_host_metrics, start_runtime_metrics};
use crate::telemetry::{
    self, new_provider, ActiveSpan, EnvLevel, Meter, Providers, Registration, Telemetry,
    TelemetryConfig, Transport,
};

/// Deadline for building the providers at startup.
pub const START_TIMEOUT: Duration = Duration::from_secs(5);
/// Exporter timeout used by the facade.
pub const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Trace and metric handles used by the application.
///
/// Without a trace provider spans go to the global tracer; without a metric
/// provider instruments go to the global meter. Both are no-ops unless
/// something else installed a provider.
pub struct Instrument {
    service_name: String,
    trace: Option<Telemetry>,
    meter: Meter,
    registrations: Vec<Registration>,
}

impl Instrument {
    pub fn new(service_name: impl Into<String>, providers: Providers) -> Self {
        let service_name = service_name.into();
        let meter = providers
            .metric
            .unwrap_or_else(|| Meter::global(service_name.clone()));
        Self {
            service_name,
            trace: providers.trace,
            meter,
            registrations: Vec::new(),
        }
    }

    /// Instrument with no providers of its own.
    pub fn degraded(service_name: impl Into<String>) -> Self {
        Self::new(service_name, Providers::default())
    }

    pub fn is_degraded(&self) -> bool {
        self.trace.is_none() && self.meter.provider().is_none()
    }

    pub fn telemetry(&self) -> Option<&Telemetry> {
        self.trace.as_ref()
    }

    pub fn meter(&self) -> &Meter {
        &self.meter
    }

    /// Starts a span under `parent`.
    pub fn start_root_span(
        &self,
        parent: &Context,
        name: impl Into<Cow<'static, str>>,
    ) -> (Context, ActiveSpan) {
        match &self.trace {
            Some(trace) => trace.start(parent, name),
            None => {
                let tracer = global::tracer(self.service_name.clone());
                telemetry::trace_start(&tracer, parent, name)
            }
        }
    }

    /// Starts host and runtime gauges. Failures are logged, never returned.
    pub fn start_auto_metrics(&mut self, logger: &Span) {
        for (kind, started) in [
            ("host", start_host_metrics(&self.meter)),
            ("runtime", start_runtime_metrics(&self.meter)),
        ] {
            match started {
                Ok(registrations) => self.registrations.extend(registrations),
                Err(e) => {
                    tracing::warn!(parent: logger, kind, error = %e, "Failed to start metrics");
                }
            }
        }
    }

    /// Flushes and stops both pipelines. Blocks until exporters finish.
    pub fn shutdown(&self) -> telemetry::Result<()> {
        telemetry::shutdown(self.trace.as_ref(), Some(&self.meter))
    }
}

impl fmt::Debug for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrument")
            .field("service_name", &self.service_name)
            .field("trace", &self.trace.is_some())
            .field("meter", &self.meter)
            .field("registrations", &self.registrations.len())
            .finish()
    }
}

/// Options the facade derives from process configuration.
pub fn telemetry_config(logger: &Span, config: &AppConfig) -> telemetry::Result<TelemetryConfig> {
    let env: EnvLevel = config.app_stage.parse()?;
    Ok(TelemetryConfig::new(config.service_name.clone(), env)
        .with_trace_endpoint(config.trace_endpoint.clone())
        .with_metric_endpoint(config.metric_endpoint.clone())
        .with_logger(logger.clone())
        .with_insecure(true)
        .with_retry_default()
        .with_gzip_compression(true)
        .with_timeout(EXPORT_TIMEOUT))
}

/// Builds the application's [`Instrument`] over OTLP/gRPC.
///
/// Installs the providers and propagator globally. If construction does not
/// finish within [`START_TIMEOUT`] the instrument comes back degraded instead
/// of failing startup.
pub async fn init_telemetry(logger: &Span, config: &AppConfig) -> telemetry::Result<Instrument> {
    let options = telemetry_config(logger, config)?;

    let providers =
        match tokio::time::timeout(START_TIMEOUT, new_provider(Transport::Grpc, options)).await {
            Ok(built) => built?,
            Err(_) => {
                tracing::error!(
                    parent: logger,
                    timeout = ?START_TIMEOUT,
                    "timeout to start instrumentation"
                );
                Providers::default()
            }
        };

    if providers.trace.is_none() {
        tracing::warn!(parent: logger, "Trace provider not started");
    }
    if providers.metric.is_none() {
        tracing::warn!(parent: logger, "Metric provider not started");
    }
    providers.install_global();

    let mut instrument = Instrument::new(config.service_name.clone(), providers);
    instrument.start_auto_metrics(logger);
    Ok(instrument)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Error;

    #[test]
    fn test_facade_options() {
        let mut config = AppConfig::test_config("svc");
        config.app_stage = "QA".into();
        config.trace_endpoint = "collector:4317".into();

        let options = telemetry_config(&Span::none(), &config).unwrap();
        assert_eq!(options.env, EnvLevel::Qa);
        assert!(options.transport.insecure);
        assert!(options.transport.gzip);
        assert!(options.retry.enabled);
        assert_eq!(options.transport.effective_timeout(), EXPORT_TIMEOUT);
        assert!(options.validate().is_ok());
    }

    #[tokio::test]
    async fn test_bad_stage_is_rejected() {
        let mut config = AppConfig::test_config("svc");
        config.app_stage = "staging".into();
        let err = init_telemetry(&Span::none(), &config).await.unwrap_err();
        assert!(matches!(err, Error::InvalidEnvironment(_)));
    }

    #[test]
    fn test_degraded_instrument_still_starts_spans() {
        let instrument = Instrument::degraded("svc");
        assert!(instrument.is_degraded());
        let (_, span) = instrument.start_root_span(&Context::new(), "noop");
        span.end();
        assert!(instrument.shutdown().is_ok());
    }
}
