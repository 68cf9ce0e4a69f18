//! Storage collaborator traits.
//!
//! The pipeline never touches the filesystem directly; it consumes assets
//! and conversations through these narrow contracts. Implementations live in
//! `loreloom-store`.

use crate::error::StoreError;
use crate::message::Message;
use crate::vars::Variables;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kinds of assets the pipeline reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Preset,
    Character,
    Persona,
    WorldBook,
    RegexRules,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Preset => "preset",
            AssetKind::Character => "character",
            AssetKind::Persona => "persona",
            AssetKind::WorldBook => "world_book",
            AssetKind::RegexRules => "regex_rules",
        }
    }
}

/// One result from a batch asset scan. Unreadable files degrade to an
/// `error` entry instead of failing the whole scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEntry {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanEntry {
    pub fn ok(file: impl Into<String>, value: Value) -> Self {
        Self {
            file: file.into(),
            value: Some(value),
            error: None,
        }
    }

    pub fn failed(file: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            value: None,
            error: Some(error.into()),
        }
    }
}

/// Read access to preset/character/persona/world-book/rule files.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Read and parse one asset file.
    async fn read(&self, kind: AssetKind, path: &str) -> Result<Value, StoreError>;

    /// List every asset of a kind. Unreadable files come back as structured
    /// `{file, error}` entries, never as an `Err`.
    async fn scan(&self, kind: AssetKind) -> Vec<ScanEntry>;
}

/// A conversation flattened along its active path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlattenedConversation {
    pub messages: Vec<Message>,
    /// Node ids along the active path, root first.
    pub active_path: Vec<String>,
}

/// Access to tree-structured conversations.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Flatten the conversation's active path into an ordered message list.
    /// Roles are validated strictly; an unknown role is a hard error.
    async fn flatten(&self, file: &str) -> Result<FlattenedConversation, StoreError>;

    /// Append a message to the end of the active path.
    async fn append(&self, file: &str, message: Message) -> Result<(), StoreError>;

    /// Load the conversation's variable document (empty object if absent).
    async fn load_variables(&self, file: &str) -> Result<Variables, StoreError>;

    /// Persist the conversation's variable document. Last write wins.
    async fn save_variables(&self, file: &str, variables: &Variables) -> Result<(), StoreError>;
}
