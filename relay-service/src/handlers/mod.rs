//! HTTP handlers for the relay service.

pub mod chat;
pub mod health;
pub mod metrics;
pub mod summarize;

pub use chat::chat;
pub use health::{health_check, readiness_check, root};
pub use metrics::metrics_handler;
pub use summarize::summarize_history;

use axum::extract::rejection::JsonRejection;
use service_core::error::AppError;

/// Every body that cannot be read as the expected JSON gets the same answer.
fn invalid_json(rejection: JsonRejection) -> AppError {
    tracing::debug!(reason = %rejection.body_text(), "Rejected request body");
    AppError::BadRequest(anyhow::anyhow!("Invalid JSON"))
}
