//! Request, response and conversation types exchanged over HTTP.

pub mod chat;
pub mod conversation;
pub mod summarize;

pub use chat::{ChatRequest, ChatResponse};
pub use conversation::{validate_history, ConversationTurn, Role};
pub use summarize::{SummarizeRequest, SummarizeResponse};
