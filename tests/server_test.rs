//! HTTP surface tests.
//!
//! Tests:
//! - GET / returns the greeting as JSON
//! - Each request records one span and one counter increment

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use opentelemetry::KeyValue;
use otlp_stack::server::{create_router, AppState, HANDLER_SPAN};
use otlp_stack::Instrument;
use tower::ServiceExt;

#[tokio::test]
async fn test_root_returns_greeting() {
    let app = create_router(AppState::new(Arc::new(Instrument::degraded("svc"))));

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, serde_json::json!({ "message": "Hello, world!" }));
}

#[tokio::test]
async fn test_root_records_span_and_counter() {
    let pipelines = common::InMemoryPipelines::new("svc");
    let instrument = Arc::new(Instrument::new("svc", pipelines.providers));
    let app = create_router(AppState::new(Arc::clone(&instrument)));

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let spans = pipelines.spans.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, HANDLER_SPAN);
    assert!(spans[0].attributes.contains(&KeyValue::new("http.method", "GET")));
    assert!(spans[0].attributes.contains(&KeyValue::new("http.path", "/")));

    let provider = instrument.meter().provider().expect("metric provider");
    provider.force_flush().unwrap();
    assert!(!pipelines.metrics.get_finished_metrics().unwrap().is_empty());
}
