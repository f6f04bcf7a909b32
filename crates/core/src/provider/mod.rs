//! Completion provider port.
//!
//! Defines how the engine talks to an LLM completion service. The OpenAI-compatible adapter lives
//! in [`openai`]; tests substitute a scripted provider.

pub mod openai;
pub mod sse;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Serialize;

use crate::error::ProviderError;
use crate::patient::{ConversationTurn, Role};

pub use openai::OpenAiProvider;

/// Content deltas of one streamed completion, in the order the provider sent them.
///
/// Dropping the stream cancels the underlying provider call.
pub type DeltaStream = BoxStream<'static, Result<String, ProviderError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
}

impl From<&ConversationTurn> for ChatMessage {
    fn from(turn: &ConversationTurn) -> Self {
        let role = match turn.role() {
            Role::User => ChatRole::User,
            Role::Assistant => ChatRole::Assistant,
        };
        Self {
            role,
            content: turn.content().to_owned(),
        }
    }
}

/// Provider-neutral description of one streamed completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
}

/// A remote streaming text-completion service.
///
/// Implementations must be safe to call from many in-flight requests at once.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Opens a streamed completion.
    ///
    /// Returns once the provider has accepted the request; deltas are then pulled from the
    /// returned stream. Errors may occur here or as items of the stream.
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<DeltaStream, ProviderError>;
}
