use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use service_core::error::AppError;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::StreamExt;

use super::invalid_json;
use crate::config::ResponseMode;
use crate::models::{validate_history, ChatRequest, ChatResponse, ConversationTurn};
use crate::services::chat::{build_chat_request, complete_chat, stream_chat, synthesize_reply};
use crate::startup::AppState;

/// `POST /api/chat`
///
/// Buffered requests get a JSON [`ChatResponse`]; streamed requests get the
/// reply as a chunked `text/plain` body.
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(invalid_json)?;

    let prompt = request
        .prompt
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Prompt is missing")))?;
    validate_history(&request.history)?;

    let mode = match request.stream {
        Some(true) => ResponseMode::Streaming,
        Some(false) => ResponseMode::Buffered,
        None => state.config.chat.default_mode,
    };

    tracing::info!(
        mode = ?mode,
        history_turns = request.history.len(),
        prompt_len = prompt.len(),
        "Chat request received"
    );

    if mode == ResponseMode::Streaming {
        let generation = build_chat_request(&state.config.models, &request.history, &prompt);
        let fragments = stream_chat(state.text_provider.clone(), generation);
        let body = Body::from_stream(fragments.map(Ok::<_, Infallible>));

        return Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response());
    }

    // Headers wait for the whole reply, audio included.
    let deadline = Duration::from_secs(state.config.common.request_timeout_secs);
    let response = tokio::time::timeout(deadline, buffered_reply(&state, request.history, prompt))
        .await
        .map_err(|_| {
            AppError::Upstream(anyhow::anyhow!(
                "Chat reply not ready within {:?}",
                deadline
            ))
        })??;

    Ok(Json(response).into_response())
}

async fn buffered_reply(
    state: &AppState,
    history: Vec<ConversationTurn>,
    prompt: String,
) -> Result<ChatResponse, AppError> {
    let reply = complete_chat(
        state.text_provider.as_ref(),
        &state.config.models,
        history,
        &prompt,
    )
    .await?;

    let audio_content = if state.config.chat.audio_enabled {
        Some(
            synthesize_reply(
                state.speech_provider.as_ref(),
                &state.config.speech,
                &reply.text,
            )
            .await?,
        )
    } else {
        None
    };

    Ok(ChatResponse {
        text_response: reply.text,
        updated_history: reply.updated_history,
        audio_content,
    })
}
