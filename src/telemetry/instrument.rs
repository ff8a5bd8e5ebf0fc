//! Typed instruments created through [`Meter`](super::Meter).
//!
//! Instruments are generic over the measured [`Number`] (`f64` or `i64`) and
//! selected by kind instead of one factory per type/kind pair. Synchronous
//! instruments record values directly; observable instruments report values
//! from callbacks run on every collection.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use opentelemetry::metrics::{AsyncInstrument, Meter as OtelMeter};
use opentelemetry::KeyValue;

use super::error::{Error, Result};

/// Longest instrument name accepted.
pub const MAX_NAME_LEN: usize = 255;

/// Synchronous instrument kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncKind {
    Counter,
    UpDownCounter,
    Histogram,
    Gauge,
}

/// Observable (callback driven) instrument kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncKind {
    Counter,
    UpDownCounter,
    Gauge,
}

/// Name, description and unit of an instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentOptions {
    pub name: Cow<'static, str>,
    pub description: Option<Cow<'static, str>>,
    pub unit: Option<Cow<'static, str>>,
}

impl InstrumentOptions {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            description: None,
            unit: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

impl From<&'static str> for InstrumentOptions {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

impl From<String> for InstrumentOptions {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Checks an instrument name: a leading ASCII letter followed by letters,
/// digits, `_`, `.`, `-` or `/`, at most [`MAX_NAME_LEN`] characters.
pub fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = name.len() <= MAX_NAME_LEN
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInstrumentName(name.to_string()))
    }
}

/// Records a measurement with its attributes.
pub type Recorder<T> = Arc<dyn Fn(T, &[KeyValue]) + Send + Sync>;

/// Runs every callback of an observable instrument against an observer.
pub type Collect<T> = Arc<dyn Fn(&Observer<'_, T>) + Send + Sync>;

mod sealed {
    pub trait Sealed {}

    impl Sealed for f64 {}
    impl Sealed for i64 {}
}

/// Numeric type an instrument measures.
///
/// Implemented for `f64` and `i64`. Monotonic `i64` instruments (counters and
/// histograms) discard negative values.
pub trait Number: sealed::Sealed + Copy + Send + Sync + fmt::Debug + 'static {
    #[doc(hidden)]
    fn sync_recorder(
        meter: &OtelMeter,
        kind: SyncKind,
        options: &InstrumentOptions,
        boundaries: Option<&[f64]>,
    ) -> Recorder<Self>;

    #[doc(hidden)]
    fn observable(
        meter: &OtelMeter,
        kind: AsyncKind,
        options: &InstrumentOptions,
        collect: Collect<Self>,
    ) -> Box<dyn Any + Send + Sync>;
}

macro_rules! describe {
    ($builder:expr, $options:expr) => {{
        let mut builder = $builder;
        if let Some(description) = &$options.description {
            builder = builder.with_description(description.clone());
        }
        if let Some(unit) = &$options.unit {
            builder = builder.with_unit(unit.clone());
        }
        builder
    }};
}

macro_rules! histogram {
    ($builder:expr, $options:expr, $boundaries:expr) => {{
        let mut builder = describe!($builder, $options);
        if let Some(boundaries) = $boundaries {
            builder = builder.with_boundaries(boundaries.to_vec());
        }
        builder.build()
    }};
}

macro_rules! observe_with {
    ($builder:expr, $options:expr, $collect:expr, $ty:ty) => {{
        let collect = $collect;
        Box::new(
            describe!($builder, $options)
                .with_callback(move |instrument: &dyn AsyncInstrument<$ty>| {
                    let sink = |value: $ty, attributes: &[KeyValue]| {
                        instrument.observe(value, attributes)
                    };
                    collect(&Observer::new(&sink));
                })
                .build(),
        )
    }};
}

impl Number for f64 {
    fn sync_recorder(
        meter: &OtelMeter,
        kind: SyncKind,
        options: &InstrumentOptions,
        boundaries: Option<&[f64]>,
    ) -> Recorder<Self> {
        let name = options.name.clone();
        match kind {
            SyncKind::Counter => {
                let counter = describe!(meter.f64_counter(name), options).build();
                Arc::new(move |value: Self, attributes: &[KeyValue]| {
                    counter.add(value, attributes)
                })
            }
            SyncKind::UpDownCounter => {
                let counter = describe!(meter.f64_up_down_counter(name), options).build();
                Arc::new(move |value: Self, attributes: &[KeyValue]| {
                    counter.add(value, attributes)
                })
            }
            SyncKind::Histogram => {
                let histogram = histogram!(meter.f64_histogram(name), options, boundaries);
                Arc::new(move |value: Self, attributes: &[KeyValue]| {
                    histogram.record(value, attributes)
                })
            }
            SyncKind::Gauge => {
                let gauge = describe!(meter.f64_gauge(name), options).build();
                Arc::new(move |value: Self, attributes: &[KeyValue]| {
                    gauge.record(value, attributes)
                })
            }
        }
    }

    fn observable(
        meter: &OtelMeter,
        kind: AsyncKind,
        options: &InstrumentOptions,
        collect: Collect<Self>,
    ) -> Box<dyn Any + Send + Sync> {
        let name = options.name.clone();
        match kind {
            AsyncKind::Counter => {
                observe_with!(meter.f64_observable_counter(name), options, collect, f64)
            }
            AsyncKind::UpDownCounter => observe_with!(
                meter.f64_observable_up_down_counter(name),
                options,
                collect,
                f64
            ),
            AsyncKind::Gauge => {
                observe_with!(meter.f64_observable_gauge(name), options, collect, f64)
            }
        }
    }
}

impl Number for i64 {
    fn sync_recorder(
        meter: &OtelMeter,
        kind: SyncKind,
        options: &InstrumentOptions,
        boundaries: Option<&[f64]>,
    ) -> Recorder<Self> {
        let name = options.name.clone();
        match kind {
            SyncKind::Counter => {
                let counter = describe!(meter.u64_counter(name), options).build();
                Arc::new(move |value: i64, attributes: &[KeyValue]| {
                    if let Ok(value) = u64::try_from(value) {
                        counter.add(value, attributes);
                    }
                })
            }
            SyncKind::UpDownCounter => {
                let counter = describe!(meter.i64_up_down_counter(name), options).build();
                Arc::new(move |value: Self, attributes: &[KeyValue]| {
                    counter.add(value, attributes)
                })
            }
            SyncKind::Histogram => {
                let histogram = histogram!(meter.u64_histogram(name), options, boundaries);
                Arc::new(move |value: i64, attributes: &[KeyValue]| {
                    if let Ok(value) = u64::try_from(value) {
                        histogram.record(value, attributes);
                    }
                })
            }
            SyncKind::Gauge => {
                let gauge = describe!(meter.i64_gauge(name), options).build();
                Arc::new(move |value: Self, attributes: &[KeyValue]| {
                    gauge.record(value, attributes)
                })
            }
        }
    }

    fn observable(
        meter: &OtelMeter,
        kind: AsyncKind,
        options: &InstrumentOptions,
        collect: Collect<Self>,
    ) -> Box<dyn Any + Send + Sync> {
        let name = options.name.clone();
        match kind {
            AsyncKind::Counter => {
                Box::new(
                    describe!(meter.u64_observable_counter(name), options)
                        .with_callback(move |instrument: &dyn AsyncInstrument<u64>| {
                            let sink = |value: i64, attributes: &[KeyValue]| {
                                if let Ok(value) = u64::try_from(value) {
                                    instrument.observe(value, attributes);
                                }
                            };
                            collect(&Observer::new(&sink));
                        })
                        .build(),
                )
            }
            AsyncKind::UpDownCounter => observe_with!(
                meter.i64_observable_up_down_counter(name),
                options,
                collect,
                i64
            ),
            AsyncKind::Gauge => {
                observe_with!(meter.i64_observable_gauge(name), options, collect, i64)
            }
        }
    }
}

/// A synchronous instrument.
///
/// Cheap to clone; every clone records into the same SDK instrument.
pub struct SyncInstrument<T> {
    options: InstrumentOptions,
    kind: SyncKind,
    recorder: Recorder<T>,
}

impl<T: Number> SyncInstrument<T> {
    pub(crate) fn new(options: InstrumentOptions, kind: SyncKind, recorder: Recorder<T>) -> Self {
        Self {
            options,
            kind,
            recorder,
        }
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn kind(&self) -> SyncKind {
        self.kind
    }

    pub fn options(&self) -> &InstrumentOptions {
        &self.options
    }

    /// Adds to a counter, records into a histogram or sets a gauge,
    /// depending on the kind.
    pub fn record(&self, value: T, attributes: &[KeyValue]) {
        (self.recorder)(value, attributes);
    }

    pub fn add(&self, value: T, attributes: &[KeyValue]) {
        self.record(value, attributes);
    }
}

impl<T> Clone for SyncInstrument<T> {
    fn clone(&self) -> Self {
        Self {
            options: self.options.clone(),
            kind: self.kind,
            recorder: Arc::clone(&self.recorder),
        }
    }
}

impl<T> fmt::Debug for SyncInstrument<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncInstrument")
            .field("name", &self.options.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Receives values reported by an observable instrument's callbacks.
pub struct Observer<'a, T> {
    sink: &'a (dyn Fn(T, &[KeyValue]) + 'a),
}

impl<'a, T> Observer<'a, T> {
    pub fn new(sink: &'a (dyn Fn(T, &[KeyValue]) + 'a)) -> Self {
        Self { sink }
    }

    pub fn observe(&self, value: T, attributes: &[KeyValue]) {
        (self.sink)(value, attributes);
    }
}

type Callback<T> = Arc<dyn Fn(&Observer<'_, T>) + Send + Sync>;

pub(crate) struct CallbackSet<T> {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(u64, Callback<T>)>>,
}

impl<T: 'static> CallbackSet<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(0),
            callbacks: RwLock::new(Vec::new()),
        })
    }

    fn add(self: &Arc<Self>, callback: Callback<T>) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, callback));
        let set: Weak<dyn Unregister> = Arc::downgrade(self) as Weak<dyn Unregister>;
        Registration { id, set }
    }

    fn snapshot(&self) -> Vec<Callback<T>> {
        self.callbacks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }

    /// Runs every registered callback. Callbacks may register or unregister
    /// others; changes apply from the next collection.
    pub(crate) fn run(&self, observer: &Observer<'_, T>) {
        for callback in self.snapshot() {
            callback(observer);
        }
    }

    fn len(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

trait Unregister: Send + Sync {
    fn unregister(&self, id: u64) -> bool;
}

impl<T: 'static> Unregister for CallbackSet<T> {
    fn unregister(&self, id: u64) -> bool {
        let mut callbacks = self
            .callbacks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = callbacks.len();
        callbacks.retain(|(entry, _)| *entry != id);
        callbacks.len() != before
    }
}

/// Handle to a registered callback.
///
/// Dropping it leaves the callback registered; call
/// [`Registration::unregister`] to remove it.
pub struct Registration {
    id: u64,
    set: Weak<dyn Unregister>,
}

impl Registration {
    /// Removes the callback. Returns `false` if it was already gone.
    pub fn unregister(self) -> bool {
        self.set
            .upgrade()
            .is_some_and(|set| set.unregister(self.id))
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration").field("id", &self.id).finish()
    }
}

/// An observable instrument whose values come from registered callbacks.
pub struct ObservableInstrument<T> {
    options: InstrumentOptions,
    kind: AsyncKind,
    callbacks: Arc<CallbackSet<T>>,
    _handle: Arc<dyn Any + Send + Sync>,
}

impl<T: Number> ObservableInstrument<T> {
    pub(crate) fn new(
        meter: &OtelMeter,
        kind: AsyncKind,
        options: InstrumentOptions,
    ) -> Self {
        let callbacks = CallbackSet::<T>::new();
        let set = Arc::clone(&callbacks);
        let collect: Collect<T> = Arc::new(move |observer: &Observer<'_, T>| set.run(observer));
        let handle = T::observable(meter, kind, &options, collect);
        Self {
            options,
            kind,
            callbacks,
            _handle: Arc::from(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn kind(&self) -> AsyncKind {
        self.kind
    }

    /// Registers a callback run on every collection.
    pub fn register_callback<F>(&self, callback: F) -> Registration
    where
        F: Fn(&Observer<'_, T>) + Send + Sync + 'static,
    {
        self.callbacks.add(Arc::new(callback))
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }
}

impl<T> Clone for ObservableInstrument<T> {
    fn clone(&self) -> Self {
        Self {
            options: self.options.clone(),
            kind: self.kind,
            callbacks: Arc::clone(&self.callbacks),
            _handle: Arc::clone(&self._handle),
        }
    }
}

impl<T> fmt::Debug for ObservableInstrument<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableInstrument")
            .field("name", &self.options.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_validate_name_accepts_otel_names() {
        for name in ["request.count", "http.server/duration", "a", "queue_depth-1"] {
            assert!(validate_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_validate_name_rejects_bad_names() {
        let too_long = "a".repeat(MAX_NAME_LEN + 1);
        for name in ["", "1count", "_x", "has space", "bad*char", too_long.as_str()] {
            assert!(
                matches!(validate_name(name), Err(Error::InvalidInstrumentName(_))),
                "{name}"
            );
        }
        assert!(validate_name(&"a".repeat(MAX_NAME_LEN)).is_ok());
    }

    #[test]
    fn test_options_builder() {
        let options = InstrumentOptions::new("request.count")
            .with_description("counting requests")
            .with_unit("1");
        assert_eq!(options.name, "request.count");
        assert_eq!(options.description.as_deref(), Some("counting requests"));
        assert_eq!(options.unit.as_deref(), Some("1"));
        assert_eq!(InstrumentOptions::from("x"), InstrumentOptions::new("x"));
    }

    #[test]
    fn test_callback_set_runs_and_unregisters() {
        let set = CallbackSet::<i64>::new();
        let first = set.add(Arc::new(|observer: &Observer<'_, i64>| observer.observe(1, &[])));
        let _second = set.add(Arc::new(|observer: &Observer<'_, i64>| observer.observe(2, &[])));

        let seen = Mutex::new(Vec::new());
        let sink = |value: i64, _: &[KeyValue]| seen.lock().unwrap().push(value);
        set.run(&Observer::new(&sink));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);

        assert!(first.unregister());
        seen.lock().unwrap().clear();
        set.run(&Observer::new(&sink));
        assert_eq!(*seen.lock().unwrap(), vec![2]);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_unregister_after_set_dropped() {
        let set = CallbackSet::<f64>::new();
        let registration = set.add(Arc::new(|_: &Observer<'_, f64>| {}));
        drop(set);
        assert!(!registration.unregister());
    }
}
