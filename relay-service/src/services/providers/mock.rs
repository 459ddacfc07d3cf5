//! Mock provider implementations for testing.

use super::{
    FinishReason, GenerationRequest, ProviderError, ProviderResponse, ProviderStream,
    SpeechProvider, StreamChunk, TextProvider, VoiceSettings,
};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Scripted text provider.
///
/// Replies with a fixed list of fragments: `generate` returns them joined,
/// `generate_stream` yields them one by one. Every request is recorded.
pub struct MockTextProvider {
    fragments: Vec<String>,
    behavior: MockBehavior,
    delay: Option<Duration>,
    requests: Mutex<Vec<GenerationRequest>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockBehavior {
    Succeed,
    /// Fail before producing anything.
    Fail,
    /// Stream every fragment, then fail.
    FailMidStream,
}

impl MockTextProvider {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_behavior(fragments, MockBehavior::Succeed)
    }

    /// Provider whose every call fails.
    pub fn failing() -> Self {
        Self::with_behavior(Vec::<String>::new(), MockBehavior::Fail)
    }

    /// Provider whose stream emits `fragments` and then errors.
    pub fn failing_mid_stream<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_behavior(fragments, MockBehavior::FailMidStream)
    }

    fn with_behavior<I, S>(fragments: I, behavior: MockBehavior) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            behavior,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Wait `delay` before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn wait(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn record(&self, request: &GenerationRequest) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
    }

    fn upstream_error() -> ProviderError {
        ProviderError::ApiError("mock upstream exploded: secret internal detail".to_string())
    }
}

#[async_trait]
impl TextProvider for MockTextProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        self.record(request);
        self.wait().await;

        if self.behavior != MockBehavior::Succeed {
            return Err(Self::upstream_error());
        }

        Ok(ProviderResponse {
            text: self.fragments.concat(),
            input_tokens: request.contents.len() as i32,
            output_tokens: self.fragments.len() as i32,
            finish_reason: FinishReason::Complete,
        })
    }

    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<ProviderStream, ProviderError> {
        self.record(request);
        self.wait().await;

        if self.behavior == MockBehavior::Fail {
            return Err(Self::upstream_error());
        }

        let mut chunks: Vec<Result<StreamChunk, ProviderError>> = self
            .fragments
            .iter()
            .map(|fragment| Ok(StreamChunk::Text(fragment.clone())))
            .collect();

        chunks.push(match self.behavior {
            MockBehavior::FailMidStream => Err(Self::upstream_error()),
            _ => Ok(StreamChunk::Complete {
                input_tokens: request.contents.len() as i32,
                output_tokens: self.fragments.len() as i32,
                finish_reason: FinishReason::Complete,
            }),
        });

        Ok(Box::pin(tokio_stream::iter(chunks)))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        match self.behavior {
            MockBehavior::Fail => Err(ProviderError::NotConfigured(
                "Mock text provider failing".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Speech provider returning fixed audio bytes, or failing when built
/// with [`MockSpeechProvider::failing`].
pub struct MockSpeechProvider {
    audio: Option<Vec<u8>>,
    texts: Mutex<Vec<String>>,
}

impl MockSpeechProvider {
    pub fn new(audio: Vec<u8>) -> Self {
        Self {
            audio: Some(audio),
            texts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            audio: None,
            texts: Mutex::new(Vec::new()),
        }
    }

    /// Texts submitted for synthesis so far.
    pub fn texts(&self) -> Vec<String> {
        self.texts
            .lock()
            .map(|texts| texts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SpeechProvider for MockSpeechProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceSettings,
    ) -> Result<Vec<u8>, ProviderError> {
        if let Ok(mut texts) = self.texts.lock() {
            texts.push(text.to_string());
        }

        self.audio
            .clone()
            .ok_or_else(|| ProviderError::ApiError("mock speech synthesis failed".to_string()))
    }
}
