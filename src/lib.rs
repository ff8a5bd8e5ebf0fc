//! otlp-stack: an HTTP service bootstrap wired to OpenTelemetry export.
//!
//! The interesting part lives in [`telemetry`]: an options-driven builder that
//! validates configuration, creates OTLP exporters (gRPC, HTTP or Jaeger),
//! wraps the SDK providers behind narrow handles and manages their shutdown.
//!
//! # Modules
//!
//! - [`config`]: process configuration from `.env`, environment and CLI
//! - [`instrumentation`]: the facade that builds an [`Instrument`] at startup
//! - [`observability`]: logging setup
//! - [`server`]: the HTTP surface
//! - [`telemetry`]: trace and metric provider construction

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // telemetry::TelemetryConfig is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::missing_panics_doc,      // Panic docs can be verbose
    clippy::struct_excessive_bools   // Transport options are flags
)]

pub mod config;
pub mod instrumentation;
pub mod observability;
pub mod server;
pub mod telemetry;

pub use instrumentation::{init_telemetry, Instrument};
