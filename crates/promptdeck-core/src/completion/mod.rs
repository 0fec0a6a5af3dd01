//! Chat-completion backend abstraction.
//!
//! Generation code talks to a [`CompletionProvider`]; the production backend
//! is [`GroqClient`], an OpenAI-compatible HTTP client. Tests substitute
//! their own implementations.

pub mod groq;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use groq::{CompletionConfig, GroqClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error payload or a non-success status.
    #[error("completion API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("no reply returned by the completion API")]
    EmptyReply,

    #[error("invalid completion response: {0}")]
    InvalidResponse(String),
}

/// A backend that turns a message list into one reply.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError>;
}
