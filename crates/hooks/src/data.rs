//! Checkpoints and their typed payloads.
//!
//! Every checkpoint has exactly one payload shape, declared once in
//! [`Checkpoint::shape`]. A callback that answers with the wrong variant is
//! ignored with a warning rather than corrupting the running value.

use loreloom_core::llm::{ChatOutcome, ChatParams, StreamChunk};
use loreloom_core::message::Message;
use loreloom_core::vars::Variables;
use serde::{Deserialize, Serialize};

/// The fixed set of pipeline checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Checkpoint {
    #[serde(rename = "beforeRaw")]
    BeforeRaw,
    #[serde(rename = "afterInsert")]
    AfterInsert,
    #[serde(rename = "afterRaw")]
    AfterRaw,
    #[serde(rename = "beforePostprocessUser")]
    BeforePostprocessUser,
    #[serde(rename = "beforePostprocessAssistant")]
    BeforePostprocessAssistant,
    #[serde(rename = "afterPostprocessUser")]
    AfterPostprocessUser,
    #[serde(rename = "afterPostprocessAssistant")]
    AfterPostprocessAssistant,
    #[serde(rename = "beforeVariablesSave")]
    BeforeVariablesSave,
    #[serde(rename = "afterVariablesSave")]
    AfterVariablesSave,
    #[serde(rename = "beforeLLMCall")]
    BeforeLlmCall,
    #[serde(rename = "afterLLMCall")]
    AfterLlmCall,
    #[serde(rename = "beforeStreamChunk")]
    BeforeStreamChunk,
    #[serde(rename = "afterStreamChunk")]
    AfterStreamChunk,
    #[serde(rename = "beforeSaveResponse")]
    BeforeSaveResponse,
    #[serde(rename = "afterSaveResponse")]
    AfterSaveResponse,
}

/// The payload shape a checkpoint carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Messages,
    Variables,
    LlmCall,
    Chunk,
    Response,
}

impl Checkpoint {
    pub fn shape(&self) -> PayloadShape {
        use Checkpoint::*;
        match self {
            BeforeRaw | AfterInsert | AfterRaw | BeforePostprocessUser
            | BeforePostprocessAssistant | AfterPostprocessUser | AfterPostprocessAssistant => {
                PayloadShape::Messages
            }
            BeforeVariablesSave | AfterVariablesSave => PayloadShape::Variables,
            BeforeLlmCall => PayloadShape::LlmCall,
            BeforeStreamChunk | AfterStreamChunk => PayloadShape::Chunk,
            AfterLlmCall | BeforeSaveResponse | AfterSaveResponse => PayloadShape::Response,
        }
    }
}

/// An outbound LLM call: the final message list plus generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmCall {
    pub messages: Vec<Message>,
    pub params: ChatParams,
}

/// The typed payload union. One variant per [`PayloadShape`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HookData {
    Messages(Vec<Message>),
    Variables(Variables),
    LlmCall(LlmCall),
    Chunk(StreamChunk),
    Response(ChatOutcome),
}

impl HookData {
    pub fn shape(&self) -> PayloadShape {
        match self {
            HookData::Messages(_) => PayloadShape::Messages,
            HookData::Variables(_) => PayloadShape::Variables,
            HookData::LlmCall(_) => PayloadShape::LlmCall,
            HookData::Chunk(_) => PayloadShape::Chunk,
            HookData::Response(_) => PayloadShape::Response,
        }
    }

    /// Merge a callback's contribution into the running value.
    ///
    /// Lists, chunks, calls, and responses replace wholesale; variables
    /// shallow-merge by top-level key so a hook can update one variable
    /// without clobbering the rest. Returns `false` (and leaves `self`
    /// untouched) when the variants don't line up.
    pub fn merge(&mut self, contribution: HookData) -> bool {
        match (self, contribution) {
            (HookData::Messages(current), HookData::Messages(next)) => {
                *current = next;
                true
            }
            (HookData::Variables(current), HookData::Variables(next)) => {
                match (current.as_object_mut(), next) {
                    (Some(map), serde_json::Value::Object(updates)) => {
                        for (key, value) in updates {
                            map.insert(key, value);
                        }
                    }
                    (_, next) => *current = next,
                }
                true
            }
            (HookData::LlmCall(current), HookData::LlmCall(next)) => {
                *current = next;
                true
            }
            (HookData::Chunk(current), HookData::Chunk(next)) => {
                *current = next;
                true
            }
            (HookData::Response(current), HookData::Response(next)) => {
                *current = next;
                true
            }
            _ => false,
        }
    }
}
