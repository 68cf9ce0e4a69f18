//! The LLM client contract.
//!
//! Provider-specific payload shaping lives behind this trait; the pipeline
//! only hands over the final assembled message list and generation params.

use crate::error::LlmError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Generation parameters for a chat call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatParams {
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Token accounting from the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A complete (non-streaming) chat result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub content: String,
    #[serde(default)]
    pub usage: Usage,
    pub finish_reason: String,
}

/// One incremental piece of a streamed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub delta: String,
    pub done: bool,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, messages: &[Message], params: &ChatParams)
    -> Result<ChatOutcome, LlmError>;

    /// Streaming variant: chunks arrive on the returned channel; the final
    /// chunk has `done == true`.
    async fn chat_stream(
        &self,
        messages: &[Message],
        params: &ChatParams,
    ) -> Result<mpsc::Receiver<StreamChunk>, LlmError>;
}
