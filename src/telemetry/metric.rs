//! Meter provider construction and the meter handle returned to callers.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use opentelemetry::metrics::{Meter as OtelMeter, MeterProvider};
use opentelemetry::{global, InstrumentationScope};
use opentelemetry_sdk::metrics::{
    Aggregation, Instrument, InstrumentKind, PeriodicReader, SdkMeterProvider, Stream,
};
use opentelemetry_sdk::Resource;

use super::error::{Error, Result};
use super::instrument::{
    validate_name, AsyncKind, InstrumentOptions, Number, ObservableInstrument, Observer,
    Registration, SyncInstrument, SyncKind,
};
use super::options::{MetricOptions, TelemetryConfig};
use super::transport::{self, Wire};

/// Histogram buckets applied when no custom views are configured.
pub const DEFAULT_HISTOGRAM_BOUNDARIES: [f64; 5] = [500.0, 1000.0, 10000.0, 30000.0, 60000.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CachedKind {
    Sync(SyncKind),
    Async(AsyncKind),
}

type CacheKey = (Cow<'static, str>, CachedKind, TypeId);

/// Handle over a metric pipeline, and the factory for its instruments.
///
/// Instruments are cached by name, kind and number type: asking twice for
/// the same instrument returns the first one, including its description and
/// unit.
pub struct Meter {
    name: String,
    meter: OtelMeter,
    /// `None` when the meter delegates to the global provider.
    provider: Option<SdkMeterProvider>,
    boundaries: Option<Vec<f64>>,
    instruments: Mutex<HashMap<CacheKey, Arc<dyn Any + Send + Sync>>>,
}

fn scope(name: &str) -> InstrumentationScope {
    InstrumentationScope::builder(name.to_string()).build()
}

impl Meter {
    pub(crate) fn new(
        provider: SdkMeterProvider,
        name: impl Into<String>,
        boundaries: Option<Vec<f64>>,
    ) -> Self {
        let name = name.into();
        Self {
            meter: provider.meter_with_scope(scope(&name)),
            provider: Some(provider),
            name,
            boundaries,
            instruments: Mutex::new(HashMap::new()),
        }
    }

    /// Wraps an already built provider, applying the default histogram buckets.
    pub fn from_provider(provider: SdkMeterProvider, name: impl Into<String>) -> Self {
        Self::new(provider, name, Some(DEFAULT_HISTOGRAM_BOUNDARIES.to_vec()))
    }

    /// Meter backed by whatever provider is installed globally.
    ///
    /// With no provider installed every instrument is a no-op.
    pub fn global(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            meter: global::meter_with_scope(scope(&name)),
            provider: None,
            name,
            boundaries: Some(DEFAULT_HISTOGRAM_BOUNDARIES.to_vec()),
            instruments: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> Option<&SdkMeterProvider> {
        self.provider.as_ref()
    }

    /// Buckets hinted on new histograms, `None` when custom views decide them.
    ///
    /// Providers built by this crate also carry a view with these buckets, so
    /// histograms created straight on the provider match.
    pub fn histogram_boundaries(&self) -> Option<&[f64]> {
        self.boundaries.as_deref()
    }

    /// Returns the synchronous instrument of `kind` named by `options`,
    /// creating it on first use.
    pub fn instrument<T: Number>(
        &self,
        kind: SyncKind,
        options: impl Into<InstrumentOptions>,
    ) -> Result<SyncInstrument<T>> {
        let options = options.into();
        validate_name(&options.name)?;
        let key = (options.name.clone(), CachedKind::Sync(kind), TypeId::of::<T>());
        Ok(self.lookup_or_insert(key, || {
            let recorder =
                T::sync_recorder(&self.meter, kind, &options, self.histogram_boundaries());
            SyncInstrument::new(options.clone(), kind, recorder)
        }))
    }

    /// Returns the observable instrument of `kind` named by `options`,
    /// creating it on first use.
    pub fn observable<T: Number>(
        &self,
        kind: AsyncKind,
        options: impl Into<InstrumentOptions>,
    ) -> Result<ObservableInstrument<T>> {
        let options = options.into();
        validate_name(&options.name)?;
        let key = (options.name.clone(), CachedKind::Async(kind), TypeId::of::<T>());
        Ok(self.lookup_or_insert(key, || {
            ObservableInstrument::new(&self.meter, kind, options.clone())
        }))
    }

    pub fn counter<T: Number>(
        &self,
        options: impl Into<InstrumentOptions>,
    ) -> Result<SyncInstrument<T>> {
        self.instrument(SyncKind::Counter, options)
    }

    pub fn up_down_counter<T: Number>(
        &self,
        options: impl Into<InstrumentOptions>,
    ) -> Result<SyncInstrument<T>> {
        self.instrument(SyncKind::UpDownCounter, options)
    }

    pub fn histogram<T: Number>(
        &self,
        options: impl Into<InstrumentOptions>,
    ) -> Result<SyncInstrument<T>> {
        self.instrument(SyncKind::Histogram, options)
    }

    pub fn gauge<T: Number>(
        &self,
        options: impl Into<InstrumentOptions>,
    ) -> Result<SyncInstrument<T>> {
        self.instrument(SyncKind::Gauge, options)
    }

    pub fn observable_counter<T: Number>(
        &self,
        options: impl Into<InstrumentOptions>,
    ) -> Result<ObservableInstrument<T>> {
        self.observable(AsyncKind::Counter, options)
    }

    pub fn observable_up_down_counter<T: Number>(
        &self,
        options: impl Into<InstrumentOptions>,
    ) -> Result<ObservableInstrument<T>> {
        self.observable(AsyncKind::UpDownCounter, options)
    }

    pub fn observable_gauge<T: Number>(
        &self,
        options: impl Into<InstrumentOptions>,
    ) -> Result<ObservableInstrument<T>> {
        self.observable(AsyncKind::Gauge, options)
    }

    /// Registers `callback` to report values for `instrument` on every collection.
    pub fn register_callback<T, F>(
        &self,
        instrument: &ObservableInstrument<T>,
        callback: F,
    ) -> Registration
    where
        T: Number,
        F: Fn(&Observer<'_, T>) + Send + Sync + 'static,
    {
        instrument.register_callback(callback)
    }

    /// Flushes and stops the metric pipeline.
    ///
    /// A meter without its own provider has nothing to stop.
    pub fn shutdown(&self) -> Result<()> {
        match &self.provider {
            Some(provider) => provider
                .shutdown()
                .map_err(|e| Error::MetricShutdown(e.into())),
            None => Ok(()),
        }
    }

    fn lookup_or_insert<V>(&self, key: CacheKey, create: impl FnOnce() -> V) -> V
    where
        V: Clone + Send + Sync + 'static,
    {
        let mut instruments = self
            .instruments
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = instruments.get(&key).and_then(|entry| entry.downcast_ref::<V>()) {
            return existing.clone();
        }
        let created = create();
        instruments.insert(key, Arc::new(created.clone()));
        created
    }
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meter")
            .field("name", &self.name)
            .field("global", &self.provider.is_none())
            .field("boundaries", &self.boundaries)
            .finish_non_exhaustive()
    }
}

/// Buckets every histogram on the provider, whoever created it.
fn default_histogram_view(instrument: &Instrument) -> Option<Stream> {
    if instrument.kind() != InstrumentKind::Histogram {
        return None;
    }
    Stream::builder()
        .with_aggregation(Aggregation::ExplicitBucketHistogram {
            boundaries: DEFAULT_HISTOGRAM_BOUNDARIES.to_vec(),
            record_min_max: true,
        })
        .build()
        .ok()
}

pub(crate) fn build(
    wire: Wire,
    config: &TelemetryConfig,
    metric: MetricOptions,
    resource: Resource,
) -> Result<Meter> {
    let mut builder = SdkMeterProvider::builder().with_resource(resource);

    builder = match metric.reader {
        Some(install) => install(builder),
        None => {
            let exporter = transport::metric_exporter(wire, config)?;
            let mut reader = PeriodicReader::builder(exporter);
            if let Some(interval) = metric.send_interval {
                reader = reader.with_interval(interval);
            }
            builder.with_reader(reader.build())
        }
    };

    let boundaries = match metric.views {
        Some(install) => {
            builder = install(builder);
            None
        }
        None => {
            builder = builder.with_view(default_histogram_view);
            Some(DEFAULT_HISTOGRAM_BOUNDARIES.to_vec())
        }
    };

    Ok(Meter::new(builder.build(), config.service_name.clone(), boundaries))
}
