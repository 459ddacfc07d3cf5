//! Gemini AI provider implementation.
//!
//! Implements chat-style text generation using Google's Gemini REST API.
//! Supports both buffered and SSE streaming responses, and the Google Search
//! grounding tool.

use super::{
    FinishReason, GenerationParams, GenerationRequest, ProviderError, ProviderResponse,
    ProviderStream, StreamChunk, TextProvider,
};
use crate::models::ConversationTurn;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Gemini API base URL.
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<Secret<String>>,
    pub model: String,
    pub timeout: Duration,
    /// Override for tests and proxies.
    pub base_url: String,
}

impl GeminiConfig {
    pub fn new(api_key: Option<Secret<String>>, model: String, timeout: Duration) -> Self {
        Self {
            api_key,
            model,
            timeout,
            base_url: GEMINI_API_BASE.to_string(),
        }
    }
}

/// Gemini text provider.
pub struct GeminiTextProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiTextProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.config
            .api_key
            .as_ref()
            .map(|key| key.expose_secret().as_str())
            .ok_or_else(|| ProviderError::NotConfigured("Gemini API key not configured".into()))
    }

    /// Build the API URL for the given model and method.
    fn api_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.config.base_url, model, method)
    }

    fn model<'a>(&'a self, params: &'a GenerationParams) -> &'a str {
        params.model.as_deref().unwrap_or(&self.config.model)
    }

    async fn post(
        &self,
        url: &str,
        body: &GenerateContentRequest,
    ) -> Result<Response, ProviderError> {
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, self.api_key()?)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }

            return Err(ProviderError::ApiError(format!(
                "Gemini API error {}: {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl TextProvider for GeminiTextProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let model = self.model(&request.params);
        let url = self.api_url(model, "generateContent");
        let body = build_request(request);

        tracing::debug!(
            model = %model,
            turns = request.contents.len(),
            grounding = request.params.search_grounding,
            "Sending request to Gemini API"
        );

        let api_response: GenerateContentResponse = self
            .post(&url, &body)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        api_response.check_blocked()?;

        let candidate = api_response
            .candidates
            .first()
            .ok_or_else(|| ProviderError::InvalidResponse("No candidates returned".into()))?;

        let finish_reason = FinishReason::from_api(candidate.finish_reason.as_deref());
        if finish_reason == FinishReason::ContentFilter {
            return Err(ProviderError::ContentFiltered);
        }

        let usage = api_response.usage_metadata.unwrap_or_default();

        Ok(ProviderResponse {
            text: candidate.text(),
            input_tokens: usage.prompt_token_count.unwrap_or(0),
            output_tokens: usage.candidates_token_count.unwrap_or(0),
            finish_reason,
        })
    }

    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<ProviderStream, ProviderError> {
        let model = self.model(&request.params);
        let url = format!("{}?alt=sse", self.api_url(model, "streamGenerateContent"));
        let body = build_request(request);

        tracing::debug!(
            model = %model,
            turns = request.contents.len(),
            grounding = request.params.search_grounding,
            "Starting streaming request to Gemini API"
        );

        let response = self.post(&url, &body).await?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(relay_events(response.bytes_stream(), tx));

        let stream = ReceiverStream::new(rx);
        Ok(Box::pin(stream) as ProviderStream)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let api_key = self.api_key()?;

        // Try to list models to verify API key works
        let url = format!("{}/models", self.config.base_url);

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, api_key)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProviderError::ApiError(format!(
                "Health check failed: {}",
                response.status()
            )))
        }
    }
}

/// Decode an SSE body into stream chunks, forwarding them on `tx`.
///
/// Ends with `Complete` unless an error or a closed receiver stops it first.
async fn relay_events<S, B, E>(
    body: S,
    tx: mpsc::Sender<Result<StreamChunk, ProviderError>>,
) where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = SseDecoder::default();
    let mut total_input_tokens = 0i32;
    let mut total_output_tokens = 0i32;
    let mut last_finish_reason = FinishReason::Complete;

    loop {
        let (events, done) = match body.next().await {
            Some(Ok(chunk)) => (decoder.push(chunk.as_ref()), false),
            Some(Err(e)) => {
                let _ = tx
                    .send(Err(ProviderError::NetworkError(e.to_string())))
                    .await;
                return;
            }
            None => (decoder.finish().into_iter().collect(), true),
        };

        for data in events {
            let response = match serde_json::from_str::<GenerateContentResponse>(&data) {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unparseable Gemini stream event");
                    continue;
                }
            };

            if let Err(e) = response.check_blocked() {
                let _ = tx.send(Err(e)).await;
                return;
            }

            if let Some(usage) = &response.usage_metadata {
                total_input_tokens = usage.prompt_token_count.unwrap_or(0);
                total_output_tokens = usage.candidates_token_count.unwrap_or(0);
            }

            if let Some(candidate) = response.candidates.first() {
                let text = candidate.text();
                // A closed receiver means the client went away.
                if !text.is_empty() && tx.send(Ok(StreamChunk::Text(text))).await.is_err() {
                    return;
                }

                if candidate.finish_reason.is_some() {
                    last_finish_reason = FinishReason::from_api(candidate.finish_reason.as_deref());
                }
            }
        }

        if last_finish_reason == FinishReason::ContentFilter {
            let _ = tx.send(Err(ProviderError::ContentFiltered)).await;
            return;
        }

        if done {
            break;
        }
    }

    let _ = tx
        .send(Ok(StreamChunk::Complete {
            input_tokens: total_input_tokens,
            output_tokens: total_output_tokens,
            finish_reason: last_finish_reason,
        }))
        .await;
}

/// Translate a provider-neutral request into the Gemini wire format.
fn build_request(request: &GenerationRequest) -> GenerateContentRequest {
    let params = &request.params;

    GenerateContentRequest {
        system_instruction: request.system_instruction.as_ref().map(|text| Content {
            role: None,
            parts: vec![ContentPart::Text { text: text.clone() }],
        }),
        contents: request.contents.iter().map(Content::from).collect(),
        tools: params.search_grounding.then(|| {
            vec![Tool {
                google_search: Some(GoogleSearch {}),
            }]
        }),
        generation_config: params
            .response_mime_type
            .clone()
            .map(|response_mime_type| GenerationConfig { response_mime_type }),
    }
}

/// Incremental decoder for `text/event-stream` bodies.
///
/// Network chunks may split events (and UTF-8 sequences) anywhere, so bytes
/// are buffered until a blank line terminates an event.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed a chunk and return the `data` payload of every completed event.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer
            .extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let event: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(data) = event_data(&event[..end]) {
                events.push(data);
            }
        }
        events
    }

    /// Flush a trailing event that was not followed by a blank line.
    fn finish(&mut self) -> Option<String> {
        let event = std::mem::take(&mut self.buffer);
        event_data(&event)
    }
}

fn event_data(event: &[u8]) -> Option<String> {
    let event = String::from_utf8_lossy(event);
    let data: Vec<&str> = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    if data.is_empty() {
        None
    } else {
        Some(data.join("\n"))
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ContentPart>,
}

impl From<&ConversationTurn> for Content {
    fn from(turn: &ConversationTurn) -> Self {
        Content {
            role: Some(turn.role.as_str().to_string()),
            parts: turn
                .parts
                .iter()
                .map(|text| ContentPart::Text { text: text.clone() })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ContentPart {
    Text { text: String },
    // Function calls, grounding payloads and anything else we only pass over.
    Other(serde_json::Value),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    #[serde(skip_serializing_if = "Option::is_none")]
    google_search: Option<GoogleSearch>,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentResponse {
    fn check_blocked(&self) -> Result<(), ProviderError> {
        match self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_ref())
        {
            Some(reason) => {
                tracing::warn!(block_reason = %reason, "Gemini blocked the prompt");
                Err(ProviderError::ContentFiltered)
            }
            None => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

impl Candidate {
    fn text(&self) -> String {
        self.content
            .iter()
            .flat_map(|content| content.parts.iter())
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Other(_) => None,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i32>,
    candidates_token_count: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}
