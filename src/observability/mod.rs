//! Process logging. Telemetry export lives in [`crate::telemetry`].

pub mod logging;

pub use logging::{init_logging, init_test_logging};
