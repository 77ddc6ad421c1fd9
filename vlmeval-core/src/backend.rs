use std::fmt::Display;

use async_trait::async_trait;
use either::Either;
use serde::Serialize;

use crate::{
    config::{GenerationConfig, PruningConfig},
    message::ContentItem,
    Result,
};

/// A chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(with = "either::serde_untagged")]
    pub content: Either<String, Vec<ContentItem>>,
}

impl ChatMessage {
    pub fn system(text: impl ToString) -> Self {
        Self {
            role: Role::System,
            content: Either::Left(text.to_string()),
        }
    }

    pub fn user(content: Vec<ContentItem>) -> Self {
        Self {
            role: Role::User,
            content: Either::Right(content),
        }
    }
}

/// Everything the model needs for one generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub generation: GenerationConfig,
    pub use_cache: bool,
    /// Passed through verbatim when the model runs in pruning mode.
    pub pruning: Option<PruningConfig>,
}

/// Something that can run a chat generation and return the decoded completion.
///
/// The returned text holds only newly generated tokens, with special tokens removed.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<String>;

    /// Human readable location of the model, used in logs.
    fn describe(&self) -> String;
}
