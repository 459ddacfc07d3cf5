mod common;

use axum::http::StatusCode;
use common::{body_json, silent_speech, TestApp};
use relay_service::config::RelayConfig;
use relay_service::models::Role;
use relay_service::services::providers::mock::{MockSpeechProvider, MockTextProvider};
use serde_json::json;
use std::time::Duration;

const INTERNAL_DETAIL: &str = "secret internal detail";

fn audio_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.chat.audio_enabled = true;
    config
}

#[tokio::test]
async fn missing_prompt_is_rejected() {
    let app = TestApp::new(MockTextProvider::new(["unused"]), silent_speech());

    let response = app.post_json("/api/chat", r#"{"history": []}"#).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({"error": "Prompt is missing"}));
    assert!(app.text.requests().is_empty());
}

#[tokio::test]
async fn blank_prompt_is_rejected() {
    let app = TestApp::new(MockTextProvider::new(["unused"]), silent_speech());

    let response = app.post_json("/api/chat", r#"{"prompt": "   "}"#).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Prompt is missing");
}

#[tokio::test]
async fn malformed_body_is_invalid_json() {
    let app = TestApp::new(MockTextProvider::new(["unused"]), silent_speech());

    let response = app.post_json("/api/chat", "{prompt: nope").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({"error": "Invalid JSON"}));
}

#[tokio::test]
async fn history_turn_without_parts_is_rejected() {
    let app = TestApp::new(MockTextProvider::new(["unused"]), silent_speech());

    let response = app
        .post_json(
            "/api/chat",
            r#"{"prompt": "Hi", "history": [{"role": "user", "parts": []}]}"#,
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.text.requests().is_empty());
}

#[tokio::test]
async fn buffered_reply_returns_text_and_history() {
    let app = TestApp::new(MockTextProvider::new(["Doing ", "great!"]), silent_speech());

    let response = app
        .post_json(
            "/api/chat",
            r#"{
                "prompt": "How are you?",
                "history": [
                    {"role": "user", "parts": ["Hi"]},
                    {"role": "model", "parts": ["Hello!"]}
                ]
            }"#,
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["text_response"], "Doing great!");
    assert_eq!(
        body["updated_history"],
        json!([
            {"role": "user", "parts": ["Hi"]},
            {"role": "model", "parts": ["Hello!"]},
            {"role": "user", "parts": ["How are you?"]},
            {"role": "model", "parts": ["Doing great!"]}
        ])
    );
    assert!(body.get("audio_content").is_none());
}

#[tokio::test]
async fn request_carries_instruction_history_and_prompt() {
    let mut config = RelayConfig::default();
    config.models.system_instruction = "Be brief.".to_string();
    let app = TestApp::with_config(config, MockTextProvider::new(["Ok"]), silent_speech());

    app.post_json(
        "/api/chat",
        r#"{"prompt": "Second", "history": [{"role": "user", "parts": ["First"]}]}"#,
    )
    .await;

    let requests = app.text.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.system_instruction.as_deref(), Some("Be brief."));
    assert_eq!(request.contents.len(), 2);
    assert_eq!(request.contents[1].role, Role::User);
    assert_eq!(request.contents[1].text(), "Second");
    assert!(!request.params.search_grounding);
}

#[tokio::test]
async fn search_grounding_follows_configuration() {
    let mut config = RelayConfig::default();
    config.models.search_grounding = true;
    let app = TestApp::with_config(config, MockTextProvider::new(["Sunny"]), silent_speech());

    let response = app
        .post_json("/api/chat", r#"{"prompt": "Weather in Paris?"}"#)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.text.requests()[0].params.search_grounding);
}

#[tokio::test]
async fn upstream_failure_is_sanitized() {
    let app = TestApp::new(MockTextProvider::failing(), silent_speech());

    let response = app.post_json("/api/chat", r#"{"prompt": "Hi"}"#).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body, json!({"error": "An internal error occurred"}));
    assert!(!body.to_string().contains(INTERNAL_DETAIL));
}

#[tokio::test]
async fn audio_is_attached_as_base64() {
    let app = TestApp::with_config(
        audio_config(),
        MockTextProvider::new(["Hello there"]),
        MockSpeechProvider::new(b"ID3audio".to_vec()),
    );

    let response = app.post_json("/api/chat", r#"{"prompt": "Hi"}"#).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["text_response"], "Hello there");
    assert_eq!(body["audio_content"], "SUQzYXVkaW8=");
    assert_eq!(app.speech.texts(), vec!["Hello there"]);
}

#[tokio::test]
async fn speech_failure_is_sanitized() {
    let app = TestApp::with_config(
        audio_config(),
        MockTextProvider::new(["Hello"]),
        MockSpeechProvider::failing(),
    );

    let response = app.post_json("/api/chat", r#"{"prompt": "Hi"}"#).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({"error": "An internal error occurred"})
    );
}

#[tokio::test]
async fn overdue_reply_is_a_sanitized_upstream_error() {
    let mut config = RelayConfig::default();
    config.common.request_timeout_secs = 1;
    let app = TestApp::with_config(
        config,
        MockTextProvider::new(["too late"]).with_delay(Duration::from_secs(3)),
        silent_speech(),
    );

    let response = app.post_json("/api/chat", r#"{"prompt": "Hi"}"#).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({"error": "An internal error occurred"})
    );
}
