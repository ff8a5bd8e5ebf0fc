//! HTTP server setup and lifecycle.
//!
//! Provides:
//! - `/` - greeting endpoint, traced and counted
//! - Request logging through tower-http
//! - Graceful shutdown support

use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use opentelemetry::{Context, KeyValue};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::instrumentation::Instrument;
use crate::telemetry::InstrumentOptions;

/// Name of the span started for every request to `/`.
pub const HANDLER_SPAN: &str = "otlp-stack.handler";

/// Server state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    instrument: Arc<Instrument>,
}

impl AppState {
    pub fn new(instrument: Arc<Instrument>) -> Self {
        Self { instrument }
    }
}

#[derive(Debug, Serialize)]
struct Greeting {
    message: &'static str,
}

fn request_counter() -> InstrumentOptions {
    InstrumentOptions::new("request.count")
        .with_description("counting requests")
        .with_unit("1")
}

/// Create the HTTP router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handle GET / - counts the request and records one span.
async fn root_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
) -> impl IntoResponse {
    let path = uri.path().to_string();
    let method = method.as_str().to_string();

    match state.instrument.meter().counter::<i64>(request_counter()) {
        Ok(counter) => counter.add(
            1,
            &[
                KeyValue::new("path", path.clone()),
                KeyValue::new("method", method.clone()),
            ],
        ),
        Err(e) => tracing::error!(error = %e, "Failed to create request counter"),
    }

    let (_cx, span) = state
        .instrument
        .start_root_span(&Context::current(), HANDLER_SPAN);
    span.set_attributes([
        KeyValue::new("http.method", method),
        KeyValue::new("http.path", path),
    ]);
    span.end();

    (
        StatusCode::OK,
        Json(Greeting {
            message: "Hello, world!",
        }),
    )
}

/// Run the HTTP server until `shutdown_rx` changes.
pub async fn run_server(
    addr: SocketAddr,
    instrument: Arc<Instrument>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(AppState::new(instrument));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Starting HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
            tracing::info!("Shutdown signal received, stopping server");
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        create_router(AppState::new(Arc::new(Instrument::degraded("server-test"))))
    }

    #[tokio::test]
    async fn test_root_endpoint() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let response = app()
            .oneshot(Request::builder().uri("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_is_not_allowed() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
