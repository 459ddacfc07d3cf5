use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One message of a conversation, tagged with its author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ConversationTurn {
    pub role: Role,
    #[validate(length(min = 1, message = "Each history turn needs at least one part"))]
    pub parts: Vec<String>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![text.into()],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![text.into()],
        }
    }

    /// All text segments of the turn joined together.
    pub fn text(&self) -> String {
        self.parts.concat()
    }
}

/// Validate every turn of a history, stopping at the first invalid one.
pub fn validate_history(history: &[ConversationTurn]) -> Result<(), ValidationErrors> {
    history.iter().try_for_each(|turn| turn.validate())
}
