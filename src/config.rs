//! Configuration parsing for the otlp-stack service.
//!
//! Values are resolved in this order, first match wins:
//! - CLI arguments
//! - Process environment
//! - The `.env` file (or the one named by `--env-file`)
//! - Built-in defaults

use clap::Parser;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

/// otlp-stack: an HTTP service exporting traces and metrics over OTLP.
#[derive(Parser, Debug, Clone)]
#[command(name = "otlp-stack")]
#[command(author, version, about, long_about = None)]
pub struct AppConfig {
    /// Service name reported in every trace and metric
    #[arg(long, env = "SERVICE_NAME", default_value = "")]
    pub service_name: String,

    /// Deployment stage (dev, qa, prod)
    #[arg(long, env = "APP_STAGE", default_value = "DEV")]
    pub app_stage: String,

    /// Development mode: human readable logs instead of JSON
    #[arg(long, env = "APP_DEV")]
    pub app_dev: bool,

    /// Host address to bind to
    #[arg(long, env = "HTTP_HOST", default_value = "0.0.0.0")]
    pub http_host: String,

    /// Port to listen on
    #[arg(short, long, env = "HTTP_PORT", default_value_t = 8080)]
    pub http_port: u16,

    /// OTLP collector endpoint for metrics (empty disables metric export)
    #[arg(long, env = "OTEL_EXPORTER_METRIC_ENDPOINT", default_value = "")]
    pub metric_endpoint: String,

    /// OTLP collector endpoint for traces (empty disables trace export)
    #[arg(long, env = "OTEL_EXPORTER_TRACE_ENDPOINT", default_value = "")]
    pub trace_endpoint: String,

    /// Log level or filter directives (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Dotenv file loaded before the environment is read
    #[arg(long, env = "ENV_FILE", default_value = ".env")]
    pub env_file: PathBuf,
}

/// What happened to the dotenv file during [`AppConfig::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvFile {
    Loaded(PathBuf),
    Missing(PathBuf),
    Invalid { path: PathBuf, reason: String },
}

impl EnvFile {
    /// Reports the outcome once logging is up.
    pub fn log(&self) {
        match self {
            Self::Loaded(path) => tracing::info!(path = %path.display(), "Loaded env file"),
            Self::Missing(path) => {
                tracing::warn!(path = %path.display(), "Unable to find env file, using environment")
            }
            Self::Invalid { path, reason } => {
                tracing::warn!(path = %path.display(), %reason, "Unable to read env file")
            }
        }
    }
}

/// Loads `path` into the process environment without overriding variables
/// that are already set.
pub fn load_env_file(path: &Path) -> EnvFile {
    match dotenv::from_path(path) {
        Ok(()) => EnvFile::Loaded(path.to_path_buf()),
        Err(dotenv::Error::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
            EnvFile::Missing(path.to_path_buf())
        }
        Err(err) => EnvFile::Invalid {
            path: path.to_path_buf(),
            reason: err.to_string(),
        },
    }
}

impl AppConfig {
    /// Parse the command line, load the env file it names, then parse again
    /// so values from the file are visible.
    pub fn load() -> Result<(Self, EnvFile), clap::Error> {
        Self::load_from(std::env::args_os().collect::<Vec<_>>())
    }

    pub fn load_from<I, T>(args: I) -> Result<(Self, EnvFile), clap::Error>
    where
        I: IntoIterator<Item = T> + Clone,
        T: Into<std::ffi::OsString> + Clone,
    {
        let first = Self::try_parse_from(args.clone())?;
        let env_file = load_env_file(&first.env_file);
        Ok((Self::try_parse_from(args)?, env_file))
    }

    /// Socket address the HTTP server binds to.
    pub fn http_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        let ip: IpAddr = self.http_host.parse()?;
        Ok(SocketAddr::new(ip, self.http_port))
    }

    /// Create a configuration for testing.
    pub fn test_config(service_name: &str) -> Self {
        Self {
            service_name: service_name.into(),
            http_host: "127.0.0.1".into(),
            http_port: 0, // Random port
            log_level: "debug".into(),
            app_dev: true,
            ..Self::default()
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            app_stage: "DEV".into(),
            app_dev: false,
            http_host: "0.0.0.0".into(),
            http_port: 8080,
            metric_endpoint: String::new(),
            trace_endpoint: String::new(),
            log_level: "info".into(),
            env_file: PathBuf::from(".env"),
        }
    }
}
