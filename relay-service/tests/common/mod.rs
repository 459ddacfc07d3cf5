#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response},
    Router,
};
use relay_service::config::RelayConfig;
use relay_service::services::providers::mock::{MockSpeechProvider, MockTextProvider};
use relay_service::startup::{build_router, AppState};
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;

/// Router wired to mock providers, with handles kept for inspection.
pub struct TestApp {
    pub router: Router,
    pub text: Arc<MockTextProvider>,
    pub speech: Arc<MockSpeechProvider>,
}

impl TestApp {
    pub fn new(text: MockTextProvider, speech: MockSpeechProvider) -> Self {
        Self::with_config(RelayConfig::default(), text, speech)
    }

    pub fn with_config(
        config: RelayConfig,
        text: MockTextProvider,
        speech: MockSpeechProvider,
    ) -> Self {
        let text = Arc::new(text);
        let speech = Arc::new(speech);
        let state = AppState::new(config, text.clone(), speech.clone());

        Self {
            router: build_router(state),
            text,
            speech,
        }
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    pub async fn post_json(&self, uri: &str, body: &str) -> Response<Body> {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }
}

pub fn silent_speech() -> MockSpeechProvider {
    MockSpeechProvider::new(Vec::new())
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
