//! Chat generation: buffered replies, streamed replies and speech synthesis.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::config::{ModelConfig, SpeechConfig};
use crate::models::ConversationTurn;
use crate::services::metrics;
use crate::services::providers::{
    GenerationParams, GenerationRequest, ProviderError, SpeechProvider, StreamChunk, TextProvider,
    VoiceSettings,
};

/// Fragment sent in place of the remaining reply when a stream fails.
pub const STREAM_APOLOGY: &str =
    "Sorry, I ran into a problem while answering. Please try again in a moment.";

const STREAM_BUFFER: usize = 32;

/// Completed buffered reply.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub text: String,
    /// Prior history followed by the user turn and the model turn.
    pub updated_history: Vec<ConversationTurn>,
}

/// Build the generation request for one chat exchange.
pub fn build_chat_request(
    models: &ModelConfig,
    history: &[ConversationTurn],
    prompt: &str,
) -> GenerationRequest {
    let mut contents = Vec::with_capacity(history.len() + 1);
    contents.extend_from_slice(history);
    contents.push(ConversationTurn::user(prompt));

    GenerationRequest {
        system_instruction: Some(models.system_instruction.clone()),
        contents,
        params: GenerationParams {
            model: Some(models.text_model.clone()),
            search_grounding: models.search_grounding,
            ..Default::default()
        },
    }
}

/// Run a chat exchange to completion.
pub async fn complete_chat(
    provider: &dyn TextProvider,
    models: &ModelConfig,
    history: Vec<ConversationTurn>,
    prompt: &str,
) -> Result<ChatReply, ProviderError> {
    let request = build_chat_request(models, &history, prompt);

    let started = Instant::now();
    let result = provider.generate(&request).await;
    record(provider.name(), "chat", &result, started);
    let response = result?;

    tracing::info!(
        provider = provider.name(),
        input_tokens = response.input_tokens,
        output_tokens = response.output_tokens,
        finish_reason = ?response.finish_reason,
        "Chat reply generated"
    );

    let mut updated_history = history;
    updated_history.push(ConversationTurn::user(prompt));
    updated_history.push(ConversationTurn::model(response.text.clone()));

    Ok(ChatReply {
        text: response.text,
        updated_history,
    })
}

/// Start a streamed chat exchange.
///
/// Fragments are produced by a background task and delivered through the
/// returned stream, which ends when generation finishes. Any upstream failure
/// is logged and replaced by [`STREAM_APOLOGY`]. Dropping the returned stream
/// stops the task and the upstream request with it.
pub fn stream_chat(
    provider: Arc<dyn TextProvider>,
    request: GenerationRequest,
) -> ReceiverStream<String> {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);

    tokio::spawn(async move {
        let started = Instant::now();
        let result = relay_fragments(provider.as_ref(), &request, &tx).await;
        record(provider.name(), "chat_stream", &result, started);

        if let Err(e) = result {
            tracing::error!(
                provider = provider.name(),
                error = %e,
                "Chat stream failed; sending apology"
            );
            let _ = tx.send(STREAM_APOLOGY.to_string()).await;
        }
    });

    ReceiverStream::new(rx)
}

async fn relay_fragments(
    provider: &dyn TextProvider,
    request: &GenerationRequest,
    tx: &mpsc::Sender<String>,
) -> Result<(), ProviderError> {
    let mut stream = provider.generate_stream(request).await?;

    while let Some(chunk) = stream.next().await {
        match chunk? {
            StreamChunk::Text(text) if text.is_empty() => {}
            StreamChunk::Text(text) => {
                if tx.send(text).await.is_err() {
                    tracing::debug!("Client disconnected; abandoning chat stream");
                    return Ok(());
                }
            }
            StreamChunk::Complete {
                input_tokens,
                output_tokens,
                finish_reason,
            } => {
                tracing::info!(
                    provider = provider.name(),
                    input_tokens,
                    output_tokens,
                    finish_reason = ?finish_reason,
                    "Chat stream completed"
                );
                break;
            }
        }
    }

    Ok(())
}

/// Synthesize `text` and return the audio as standard padded base64.
pub async fn synthesize_reply(
    provider: &dyn SpeechProvider,
    speech: &SpeechConfig,
    text: &str,
) -> Result<String, ProviderError> {
    let voice = VoiceSettings::from(speech);

    let started = Instant::now();
    let result = provider.synthesize(text, &voice).await;
    record(provider.name(), "speech", &result, started);
    let audio = result?;

    tracing::debug!(
        provider = provider.name(),
        bytes = audio.len(),
        "Speech synthesized"
    );

    Ok(STANDARD.encode(audio))
}

fn record<T>(provider: &str, operation: &str, result: &Result<T, ProviderError>, started: Instant) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::record_upstream_call(provider, operation, outcome, started.elapsed().as_secs_f64());
}
