//! Telemetry provider configuration.
//!
//! A [`TelemetryConfig`] is assembled from infallible `with_*` setters (the
//! last call for a field wins) and checked once by [`TelemetryConfig::validate`]
//! right before any exporter or connection is created.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use opentelemetry_sdk::metrics::MeterProviderBuilder;
use tracing::Span;

use super::env::EnvLevel;
use super::error::{Error, Result};

/// Exporter timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Customization applied to the meter provider builder (custom reader or views).
pub type MeterProviderHook = Box<dyn FnOnce(MeterProviderBuilder) -> MeterProviderBuilder + Send>;

/// Retry policy handed to the exporter layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_elapsed_time: Duration,
}

impl RetryPolicy {
    /// Enabled, 5s initial backoff, 30s max backoff, 60s max elapsed.
    pub const RECOMMENDED: Self = Self {
        enabled: true,
        initial_interval: Duration::from_secs(5),
        max_interval: Duration::from_secs(30),
        max_elapsed_time: Duration::from_secs(60),
    };

    /// True when no field has been set.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Connection options shared by the trace and metric exporters.
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    pub headers: HashMap<String, String>,
    pub insecure: bool,
    pub grpc_block: bool,
    pub gzip: bool,
    pub timeout: Option<Duration>,
}

impl TransportOptions {
    /// Configured timeout, or [`DEFAULT_TIMEOUT`] when unset or zero.
    pub fn effective_timeout(&self) -> Duration {
        self.timeout
            .filter(|t| !t.is_zero())
            .unwrap_or(DEFAULT_TIMEOUT)
    }
}

/// Metric pipeline overrides.
#[derive(Default)]
pub struct MetricOptions {
    pub(crate) reader: Option<MeterProviderHook>,
    pub(crate) views: Option<MeterProviderHook>,
    pub send_interval: Option<Duration>,
}

impl MetricOptions {
    pub fn has_custom_reader(&self) -> bool {
        self.reader.is_some()
    }

    pub fn has_custom_views(&self) -> bool {
        self.views.is_some()
    }
}

impl fmt::Debug for MetricOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricOptions")
            .field("custom_reader", &self.has_custom_reader())
            .field("custom_views", &self.has_custom_views())
            .field("send_interval", &self.send_interval)
            .finish()
    }
}

/// Trace pipeline overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceOptions {
    pub send_interval: Option<Duration>,
}

/// Everything needed to build trace and metric providers.
///
/// # Example
///
/// ```
/// use otlp_stack::telemetry::{EnvLevel, TelemetryConfig};
///
/// let config = TelemetryConfig::new("checkout", EnvLevel::Dev)
///     .with_trace_endpoint("http://localhost:4317")
///     .with_insecure(true)
///     .with_retry_default();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug)]
pub struct TelemetryConfig {
    pub env: EnvLevel,
    pub trace_endpoint: String,
    pub metric_endpoint: String,
    pub service_name: String,
    /// Span under which construction diagnostics are logged.
    pub logger: Span,
    pub transport: TransportOptions,
    pub retry: RetryPolicy,
    pub metric: MetricOptions,
    pub trace: TraceOptions,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            env: EnvLevel::Invalid,
            trace_endpoint: String::new(),
            metric_endpoint: String::new(),
            service_name: String::new(),
            logger: Span::current(),
            transport: TransportOptions::default(),
            retry: RetryPolicy::default(),
            metric: MetricOptions::default(),
            trace: TraceOptions::default(),
        }
    }
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>, env: EnvLevel) -> Self {
        Self {
            service_name: service_name.into(),
            env,
            ..Self::default()
        }
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn with_app_env(mut self, env: EnvLevel) -> Self {
        self.env = env;
        self
    }

    pub fn with_trace_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.trace_endpoint = endpoint.into();
        self
    }

    pub fn with_metric_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.metric_endpoint = endpoint.into();
        self
    }

    pub fn with_logger(mut self, logger: Span) -> Self {
        self.logger = logger;
        self
    }

    /// Headers sent with every export request (gRPC metadata or HTTP headers).
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.transport.headers = headers;
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.transport.insecure = insecure;
        self
    }

    /// Dial the gRPC endpoint during construction and fail if it is unreachable.
    pub fn with_grpc_connection_block(mut self, block: bool) -> Self {
        self.transport.grpc_block = block;
        self
    }

    pub fn with_gzip_compression(mut self, gzip: bool) -> Self {
        self.transport.gzip = gzip;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transport.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_retry_default(self) -> Self {
        self.with_retry(RetryPolicy::RECOMMENDED)
    }

    /// Replaces the default periodic reader and its exporter.
    ///
    /// The hook registers its own reader on the meter provider builder:
    ///
    /// ```
    /// use opentelemetry_sdk::metrics::{InMemoryMetricExporter, PeriodicReader};
    /// use otlp_stack::telemetry::{EnvLevel, TelemetryConfig};
    ///
    /// let exporter = InMemoryMetricExporter::default();
    /// let config = TelemetryConfig::new("checkout", EnvLevel::Dev)
    ///     .with_metric_endpoint("localhost:4317")
    ///     .with_metric_reader(move |builder| {
    ///         builder.with_reader(PeriodicReader::builder(exporter).build())
    ///     });
    /// assert!(config.metric.has_custom_reader());
    /// ```
    pub fn with_metric_reader<F>(mut self, install: F) -> Self
    where
        F: FnOnce(MeterProviderBuilder) -> MeterProviderBuilder + Send + 'static,
    {
        self.metric.reader = Some(Box::new(install));
        self
    }

    /// Replaces the default histogram buckets with caller-registered views.
    ///
    /// The hook receives the meter provider builder and registers its views on it.
    pub fn with_metric_views<F>(mut self, views: F) -> Self
    where
        F: FnOnce(MeterProviderBuilder) -> MeterProviderBuilder + Send + 'static,
    {
        self.metric.views = Some(Box::new(views));
        self
    }

    pub fn with_send_interval_metric(mut self, interval: Duration) -> Self {
        self.metric.send_interval = Some(interval);
        self
    }

    pub fn with_send_interval_trace(mut self, interval: Duration) -> Self {
        self.trace.send_interval = Some(interval);
        self
    }

    pub fn trace_enabled(&self) -> bool {
        !self.trace_endpoint.trim().is_empty()
    }

    pub fn metric_enabled(&self) -> bool {
        !self.metric_endpoint.trim().is_empty()
    }

    /// Pre-construction gate for the OTLP transports.
    pub fn validate(&self) -> Result<()> {
        let mut fields = self.missing_identity();
        if !self.trace_enabled() && !self.metric_enabled() {
            fields.push("trace_endpoint or metric_endpoint");
        }
        Self::gate(fields)
    }

    /// Pre-construction gate for the Jaeger transport, which only exports traces.
    pub fn validate_jaeger(&self) -> Result<()> {
        let mut fields = self.missing_identity();
        if !self.trace_enabled() {
            fields.push("trace_endpoint");
        }
        Self::gate(fields)
    }

    fn missing_identity(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if !self.env.is_valid() {
            fields.push("app_env");
        }
        if self.service_name.trim().is_empty() {
            fields.push("service_name");
        }
        fields
    }

    fn gate(fields: Vec<&'static str>) -> Result<()> {
        if fields.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingConfig { fields })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> TelemetryConfig {
        TelemetryConfig::new("svc", EnvLevel::Dev).with_trace_endpoint("localhost:4317")
    }

    #[test]
    fn test_valid_config_passes_gate() {
        assert!(valid().validate().is_ok());
        assert!(TelemetryConfig::new("svc", EnvLevel::Qa)
            .with_metric_endpoint("localhost:4317")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_missing_endpoints_fail() {
        let err = TelemetryConfig::new("svc", EnvLevel::Prod)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::MissingConfig { ref fields } if fields.len() == 1));
    }

    #[test]
    fn test_gate_lists_every_missing_field() {
        let err = TelemetryConfig::default().validate().unwrap_err();
        let Error::MissingConfig { fields } = err else {
            panic!("expected MissingConfig");
        };
        assert_eq!(
            fields,
            vec!["app_env", "service_name", "trace_endpoint or metric_endpoint"]
        );
    }

    #[test]
    fn test_blank_service_name_fails() {
        let err = valid().with_service_name("   ").validate().unwrap_err();
        assert!(err.to_string().contains("service_name"));
    }

    #[test]
    fn test_jaeger_requires_trace_endpoint() {
        let config = TelemetryConfig::new("svc", EnvLevel::Dev).with_metric_endpoint("m:4317");
        assert!(config.validate().is_ok());
        let err = config.validate_jaeger().unwrap_err();
        assert!(err.to_string().contains("trace_endpoint"));
    }

    #[test]
    fn test_last_setter_wins() {
        let config = valid()
            .with_trace_endpoint("first:4317")
            .with_trace_endpoint("second:4317")
            .with_insecure(true)
            .with_insecure(false);
        assert_eq!(config.trace_endpoint, "second:4317");
        assert!(!config.transport.insecure);
    }

    #[test]
    fn test_retry_default_values() {
        let config = valid().with_retry_default();
        assert!(config.retry.enabled);
        assert_eq!(config.retry.initial_interval, Duration::from_secs(5));
        assert_eq!(config.retry.max_interval, Duration::from_secs(30));
        assert_eq!(config.retry.max_elapsed_time, Duration::from_secs(60));
        assert!(!config.retry.is_default());
        assert!(RetryPolicy::default().is_default());
    }

    #[test]
    fn test_zero_timeout_falls_back_to_default() {
        assert_eq!(valid().transport.effective_timeout(), DEFAULT_TIMEOUT);
        let config = valid().with_timeout(Duration::ZERO);
        assert_eq!(config.transport.effective_timeout(), DEFAULT_TIMEOUT);
        let config = valid().with_timeout(Duration::from_secs(3));
        assert_eq!(config.transport.effective_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_metric_overrides_are_recorded() {
        let config = valid()
            .with_metric_views(|builder| builder)
            .with_send_interval_metric(Duration::from_secs(15));
        assert!(config.metric.has_custom_views());
        assert!(!config.metric.has_custom_reader());
        assert_eq!(config.metric.send_interval, Some(Duration::from_secs(15)));
    }
}
