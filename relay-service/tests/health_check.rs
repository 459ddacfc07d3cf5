//! Liveness, readiness, metrics and server wiring tests.

mod common;

use axum::http::StatusCode;
use common::{body_json, body_text, silent_speech, TestApp};
use relay_service::config::RelayConfig;
use relay_service::services::metrics::init_metrics;
use relay_service::services::providers::mock::{MockSpeechProvider, MockTextProvider};
use relay_service::startup::{AppState, Application};
use service_core::middleware::REQUEST_ID_HEADER;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn root_reports_backend_running() {
    let app = TestApp::new(MockTextProvider::new(["unused"]), silent_speech());

    let response = app.get("/").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Backend is running!");
}

#[tokio::test]
async fn health_reports_service_name() {
    let app = TestApp::new(MockTextProvider::new(["unused"]), silent_speech());

    let response = app.get("/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "relay-service");
}

#[tokio::test]
async fn readiness_follows_text_provider() {
    let ready = TestApp::new(MockTextProvider::new(["unused"]), silent_speech());
    let not_ready = TestApp::new(MockTextProvider::failing(), silent_speech());

    assert_eq!(ready.get("/ready").await.status(), StatusCode::OK);
    assert_eq!(
        not_ready.get("/ready").await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn metrics_expose_request_counts() {
    init_metrics().unwrap();
    let app = TestApp::new(MockTextProvider::new(["Hi"]), silent_speech());

    app.post_json("/api/chat", r#"{"prompt": "Hello"}"#).await;
    let response = app.get("/metrics").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("http_requests_total"));
    assert!(body.contains("path=\"/api/chat\""));
    assert!(body.contains("relay_upstream_requests_total"));
}

#[tokio::test]
async fn request_id_is_echoed() {
    let app = TestApp::new(MockTextProvider::new(["unused"]), silent_speech());

    let response = app.get("/").await;

    let request_id = response.headers().get(REQUEST_ID_HEADER).unwrap();
    assert!(!request_id.is_empty());
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = TestApp::new(MockTextProvider::new(["unused"]), silent_speech());

    assert_eq!(app.get("/api/unknown").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn serves_over_tcp() {
    let mut config = RelayConfig::default();
    config.common.port = 0;
    let state = AppState::new(
        config,
        Arc::new(MockTextProvider::new(["unused"])),
        Arc::new(MockSpeechProvider::new(Vec::new())),
    );

    let app = Application::with_state(state)
        .await
        .expect("Failed to build application");
    let port = app.port();

    tokio::spawn(async move {
        let _ = app.run_until_stopped().await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{}/", port))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "Backend is running!");
}
