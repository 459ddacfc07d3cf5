use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use service_core::error::AppError;
use std::time::Duration;

use super::invalid_json;
use crate::models::{validate_history, SummarizeRequest, SummarizeResponse};
use crate::services::summarizer::{self, SummarizeError};
use crate::startup::AppState;

/// Message placed in `error` when the original history is echoed back.
pub const SUMMARIZE_FAILURE_MESSAGE: &str = "Failed to summarize history; returning original";

/// `POST /api/summarize-history`
///
/// A failed or overdue summarization still answers with a usable body:
/// status 500 and the caller's history unchanged.
pub async fn summarize_history(
    State(state): State<AppState>,
    payload: Result<Json<SummarizeRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(invalid_json)?;

    let history = request
        .history
        .filter(|h| !h.is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("History is missing")))?;
    validate_history(&history)?;

    let deadline = Duration::from_secs(state.config.common.request_timeout_secs);
    let outcome = tokio::time::timeout(
        deadline,
        summarizer::summarize_history(state.text_provider.as_ref(), &state.config.models, &history),
    )
    .await
    .unwrap_or(Err(SummarizeError::TimedOut(deadline)));

    match outcome {
        Ok(summarized_history) => Ok(Json(SummarizeResponse {
            summarized_history,
            error: None,
        })
        .into_response()),
        Err(e) => {
            tracing::error!(
                error = %e,
                turns = history.len(),
                "History summarization failed; returning original"
            );
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SummarizeResponse {
                    summarized_history: history,
                    error: Some(SUMMARIZE_FAILURE_MESSAGE.to_string()),
                }),
            )
                .into_response())
        }
    }
}
