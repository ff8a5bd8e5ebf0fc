//! Collector endpoint normalization.
//!
//! Endpoints arrive either bare (`collector:4317`) or scheme-prefixed
//! (`http://collector:4317`). Exporters are always handed a URL rebuilt from
//! the bare `host:port`, with the scheme chosen by the insecure flag.

const SCHEMES: [&str; 2] = ["http://", "https://"];

/// OTLP/HTTP path for spans.
pub const TRACES_PATH: &str = "/v1/traces";
/// OTLP/HTTP path for metrics.
pub const METRICS_PATH: &str = "/v1/metrics";

/// Strips every leading `http://` or `https://` prefix and surrounding
/// whitespace, leaving the bare `host:port[/path]`.
pub fn normalize(endpoint: &str) -> &str {
    let mut rest = endpoint.trim();
    while let Some(stripped) = SCHEMES.iter().find_map(|scheme| rest.strip_prefix(scheme)) {
        rest = stripped.trim_start();
    }
    rest
}

/// Builds the URL an exporter should connect to.
///
/// `path` is appended for HTTP transports unless the endpoint already names
/// a path of its own.
pub fn transport_url(endpoint: &str, insecure: bool, path: Option<&str>) -> String {
    let bare = normalize(endpoint).trim_end_matches('/');
    let scheme = if insecure { "http" } else { "https" };
    match path {
        Some(path) if !bare.contains('/') => format!("{scheme}://{bare}{path}"),
        _ => format!("{scheme}://{bare}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_scheme() {
        assert_eq!(normalize("http://localhost:4317"), "localhost:4317");
        assert_eq!(normalize("https://collector:4318"), "collector:4318");
        assert_eq!(normalize("localhost:4317"), "localhost:4317");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for input in ["http://a:1", "http://http://a:1", " https://a:1 ", "a:1", ""] {
            let once = normalize(input);
            assert_eq!(normalize(once), once);
        }
    }

    #[test]
    fn test_transport_url_uses_insecure_flag() {
        assert_eq!(
            transport_url("http://localhost:4317", true, None),
            "http://localhost:4317"
        );
        assert_eq!(
            transport_url("localhost:4317", false, None),
            "https://localhost:4317"
        );
    }

    #[test]
    fn test_transport_url_appends_signal_path() {
        assert_eq!(
            transport_url("localhost:4318/", true, Some(TRACES_PATH)),
            "http://localhost:4318/v1/traces"
        );
        assert_eq!(
            transport_url("localhost:4318/custom/traces", true, Some(TRACES_PATH)),
            "http://localhost:4318/custom/traces"
        );
    }
}
