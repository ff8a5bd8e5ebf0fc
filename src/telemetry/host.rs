//! Host and runtime gauges reported alongside application metrics.

use std::thread;
use std::time::Instant;

use opentelemetry::KeyValue;
use tokio::runtime::Handle;

use super::error::Result;
use super::instrument::{InstrumentOptions, Registration};
use super::metric::Meter;

fn host_name() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Reports the logical CPU count of the host, tagged with its host name.
pub fn start_host_metrics(meter: &Meter) -> Result<Vec<Registration>> {
    let cpus = meter.observable_gauge::<i64>(
        InstrumentOptions::new("system.cpu.logical.count")
            .with_description("Number of logical CPUs available to the process")
            .with_unit("{cpu}"),
    )?;
    let attributes = vec![KeyValue::new("host.name", host_name())];

    let registration = meter.register_callback(&cpus, move |observer| {
        let count = thread::available_parallelism().map_or(0, |n| n.get());
        observer.observe(i64::try_from(count).unwrap_or(i64::MAX), &attributes);
    });
    Ok(vec![registration])
}

/// Reports process uptime and, inside a tokio runtime, worker and task counts.
pub fn start_runtime_metrics(meter: &Meter) -> Result<Vec<Registration>> {
    let started = Instant::now();
    let uptime = meter.observable_gauge::<f64>(
        InstrumentOptions::new("process.uptime")
            .with_description("Seconds since telemetry started")
            .with_unit("s"),
    )?;
    let mut registrations = vec![meter.register_callback(&uptime, move |observer| {
        observer.observe(started.elapsed().as_secs_f64(), &[]);
    })];

    let Ok(handle) = Handle::try_current() else {
        return Ok(registrations);
    };

    let workers = meter.observable_gauge::<i64>(
        InstrumentOptions::new("runtime.tokio.workers")
            .with_description("Worker threads in the tokio runtime")
            .with_unit("{thread}"),
    )?;
    let tasks = meter.observable_gauge::<i64>(
        InstrumentOptions::new("runtime.tokio.alive_tasks")
            .with_description("Tasks currently alive in the tokio runtime")
            .with_unit("{task}"),
    )?;

    let runtime = handle.clone();
    registrations.push(meter.register_callback(&workers, move |observer| {
        let count = runtime.metrics().num_workers();
        observer.observe(i64::try_from(count).unwrap_or(i64::MAX), &[]);
    }));
    registrations.push(meter.register_callback(&tasks, move |observer| {
        let count = handle.metrics().num_alive_tasks();
        observer.observe(i64::try_from(count).unwrap_or(i64::MAX), &[]);
    }));
    Ok(registrations)
}
