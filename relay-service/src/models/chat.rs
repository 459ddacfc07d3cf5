use serde::{Deserialize, Serialize};

use super::conversation::ConversationTurn;

/// Body of `POST /api/chat`.
///
/// `prompt` is optional at the serde level so that a missing prompt is
/// reported as a client error rather than a deserialization failure.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    /// Overrides the configured response mode for this request.
    #[serde(default)]
    pub stream: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text_response: String,
    pub updated_history: Vec<ConversationTurn>,
    /// Base64 encoded audio of `text_response`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_content: Option<String>,
}
