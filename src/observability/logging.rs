//! Structured logging setup.
//!
//! Development mode writes human readable lines with source locations;
//! otherwise every event is a JSON object. The filter comes from the
//! configured level (`RUST_LOG` syntax), with noisy transport crates capped.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const QUIET_DEPENDENCIES: &str =
    "h2=warn,hyper=warn,hyper_util=warn,tonic=warn,tower=warn,reqwest=warn";

/// Builds the filter for `level`, falling back to `info` if it does not parse.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(format!("{level},{QUIET_DEPENDENCIES}"))
        .unwrap_or_else(|_| EnvFilter::new(format!("info,{QUIET_DEPENDENCIES}")))
}

/// Initialize logging.
///
/// Fails if a global subscriber has already been installed.
pub fn init_logging(
    service_name: &str,
    level: &str,
    development: bool,
) -> Result<(), TryInitError> {
    let pretty = development.then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });
    let json = (!development).then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
    });

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(pretty)
        .with(json)
        .try_init()?;

    tracing::info!(service = service_name, development, "Logging initialized");
    Ok(())
}

/// Initialize logging for tests (only logs errors).
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("error")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_filter_uses_requested_level() {
        assert_eq!(env_filter("debug").max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn test_dependencies_stay_quiet() {
        assert_eq!(env_filter("warn").max_level_hint(), Some(LevelFilter::WARN));
    }
}
