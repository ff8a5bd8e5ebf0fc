//! otlp-stack: an HTTP service exporting traces and metrics over OTLP.
//!
//! # Usage
//!
//! ```bash
//! otlp-stack --service-name checkout --trace-endpoint localhost:4317
//! ```
//!
//! Environment variables (or a `.env` file) can also be used:
//! - `SERVICE_NAME`: Service name reported to the collector
//! - `APP_STAGE`: Deployment stage (dev, qa, prod)
//! - `APP_DEV`: Human readable logs instead of JSON
//! - `HTTP_HOST` / `HTTP_PORT`: Listen address
//! - `OTEL_EXPORTER_TRACE_ENDPOINT` / `OTEL_EXPORTER_METRIC_ENDPOINT`: Collector endpoints
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use anyhow::Context as _;
use otlp_stack::config::AppConfig;
use otlp_stack::observability::init_logging;
use otlp_stack::server::run_server;
use otlp_stack::{init_telemetry, Instrument};
use std::sync::Arc;
use tokio::sync::watch;

/// Print startup banner with version and configuration.
fn print_banner(config: &AppConfig) {
    let version = env!("CARGO_PKG_VERSION");
    let endpoint = |value: &str| {
        if value.is_empty() {
            "disabled".to_string()
        } else {
            value.to_string()
        }
    };
    eprintln!(
        r#"
  otlp-stack v{}

  Configuration:
    Service:    {}
    Stage:      {}
    Address:    {}:{}
    Traces:     {}
    Metrics:    {}
    Log Level:  {}

  Press Ctrl+C to shutdown gracefully.
"#,
        version,
        config.service_name,
        config.app_stage,
        config.http_host,
        config.http_port,
        endpoint(&config.trace_endpoint),
        endpoint(&config.metric_endpoint),
        config.log_level
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration from the env file, environment and CLI arguments
    let (config, env_file) = AppConfig::load()?;

    init_logging(&config.service_name, &config.log_level, config.app_dev)
        .context("failed to initialize logging")?;
    env_file.log();

    print_banner(&config);

    let logger = tracing::info_span!("telemetry", service = %config.service_name);
    let instrument = match init_telemetry(&logger, &config).await {
        Ok(instrument) => instrument,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize opentelemetry provider");
            Instrument::degraded(config.service_name.clone())
        }
    };
    let instrument = Arc::new(instrument);

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn signal handler task
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                        }
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating shutdown...");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }

        let _ = shutdown_tx.send(true);
    });

    let addr = config.http_addr().context("invalid HTTP listen address")?;
    run_server(addr, Arc::clone(&instrument), shutdown_rx)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    // Exporter shutdown blocks until pending batches are flushed
    let flushed = tokio::task::spawn_blocking(move || instrument.shutdown()).await?;
    if let Err(e) = flushed {
        tracing::error!(error = %e, "Failed to shutdown telemetry");
    }

    tracing::info!("otlp-stack shutdown complete");
    Ok(())
}
