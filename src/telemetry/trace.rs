//! Trace provider construction and the span handle returned to callers.

use std::borrow::Cow;
use std::fmt;

use opentelemetry::trace::{SpanContext, Status, TraceContextExt, Tracer, TracerProvider};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, Sampler, SdkTracer, SdkTracerProvider,
};
use opentelemetry_sdk::Resource;

use super::error::{Error, Result};
use super::options::TelemetryConfig;
use super::transport::{self, Transport};

/// Handle over a running trace pipeline.
///
/// Every span is sampled and exported in batches. Dropping the last clone of
/// the underlying provider shuts it down; call [`Telemetry::shutdown`] to
/// flush explicitly and observe errors.
#[derive(Clone)]
pub struct Telemetry {
    provider: SdkTracerProvider,
    tracer: SdkTracer,
}

impl Telemetry {
    /// Wraps an already built provider, naming the tracer after the service.
    pub fn from_provider(provider: SdkTracerProvider, service_name: impl Into<String>) -> Self {
        let tracer = provider.tracer(service_name.into());
        Self { provider, tracer }
    }

    /// Starts a span as a child of `parent`.
    ///
    /// Returns the derived context carrying the new span, and a handle to it.
    /// The span stays open until [`ActiveSpan::end`] is called.
    pub fn start(
        &self,
        parent: &Context,
        name: impl Into<Cow<'static, str>>,
    ) -> (Context, ActiveSpan) {
        start_span(&self.tracer, parent, name)
    }

    pub fn provider(&self) -> &SdkTracerProvider {
        &self.provider
    }

    /// Flushes pending spans and stops the pipeline.
    ///
    /// A second call reports an error.
    pub fn shutdown(&self) -> Result<()> {
        self.provider
            .shutdown()
            .map_err(|e| Error::TraceShutdown(e.into()))
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry").finish_non_exhaustive()
    }
}

pub(crate) fn start_span<T>(
    tracer: &T,
    parent: &Context,
    name: impl Into<Cow<'static, str>>,
) -> (Context, ActiveSpan)
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    let span = tracer.start_with_context(name, parent);
    let cx = parent.with_span(span);
    (cx.clone(), ActiveSpan { cx })
}

/// An open span.
#[derive(Debug, Clone)]
pub struct ActiveSpan {
    cx: Context,
}

impl ActiveSpan {
    /// Context carrying this span, for starting children.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn span_context(&self) -> SpanContext {
        self.cx.span().span_context().clone()
    }

    pub fn is_recording(&self) -> bool {
        self.cx.span().is_recording()
    }

    pub fn set_attribute(&self, attribute: KeyValue) {
        self.cx.span().set_attribute(attribute);
    }

    pub fn set_attributes(&self, attributes: impl IntoIterator<Item = KeyValue>) {
        self.cx.span().set_attributes(attributes);
    }

    pub fn add_event(&self, name: impl Into<Cow<'static, str>>, attributes: Vec<KeyValue>) {
        self.cx.span().add_event(name, attributes);
    }

    pub fn set_status(&self, status: Status) {
        self.cx.span().set_status(status);
    }

    pub fn record_error(&self, err: &dyn std::error::Error) {
        self.cx.span().record_error(err);
    }

    pub fn end(self) {
        self.cx.span().end();
    }
}

pub(crate) fn build(
    transport: Transport,
    config: &TelemetryConfig,
    resource: Resource,
) -> Result<Telemetry> {
    let exporter = transport::span_exporter(transport, config)?;

    let mut batch = BatchConfigBuilder::default();
    if let Some(delay) = config.trace.send_interval {
        batch = batch.with_scheduled_delay(delay);
    }
    let processor = BatchSpanProcessor::builder(exporter)
        .with_batch_config(batch.build())
        .build();

    let provider = SdkTracerProvider::builder()
        .with_sampler(Sampler::AlwaysOn)
        .with_span_processor(processor)
        .with_resource(resource)
        .build();

    Ok(Telemetry::from_provider(provider, config.service_name.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_sdk::trace::InMemorySpanExporter;

    fn local() -> (Telemetry, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        (Telemetry::from_provider(provider, "svc"), exporter)
    }

    #[test]
    fn test_child_span_shares_trace_id() {
        let (telemetry, exporter) = local();
        let (root_cx, root) = telemetry.start(&Context::new(), "root");
        let (_, child) = telemetry.start(&root_cx, "child");

        assert!(root.span_context().is_valid());
        assert_eq!(
            child.span_context().trace_id(),
            root.span_context().trace_id()
        );
        assert_ne!(
            child.span_context().span_id(),
            root.span_context().span_id()
        );
        child.end();
        root.end();

        let spans = exporter.get_finished_spans().unwrap();
        let names: Vec<_> = spans.iter().map(|s| s.name.as_ref()).collect();
        assert_eq!(names, vec!["child", "root"]);
    }

    #[test]
    fn test_span_records_attributes_and_events() {
        let (telemetry, exporter) = local();
        let (_, span) = telemetry.start(&Context::new(), "op");
        span.set_attribute(KeyValue::new("k", "v"));
        span.add_event("tick", vec![KeyValue::new("n", 1)]);
        span.set_status(Status::error("boom"));
        span.end();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert!(spans[0].attributes.contains(&KeyValue::new("k", "v")));
        assert_eq!(spans[0].events.events.len(), 1);
        assert_eq!(spans[0].status, Status::error("boom"));
    }

    #[test]
    fn test_open_span_is_not_exported() {
        let (telemetry, exporter) = local();
        let (_, span) = telemetry.start(&Context::new(), "pending");
        assert!(span.is_recording());
        assert!(exporter.get_finished_spans().unwrap().is_empty());
        span.end();
    }

    #[test]
    fn test_second_shutdown_reports_error() {
        let (telemetry, _exporter) = local();
        telemetry.shutdown().unwrap();
        let err = telemetry.shutdown().unwrap_err();
        assert!(matches!(err, Error::TraceShutdown(_)));
    }
}
