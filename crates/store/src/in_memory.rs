//! In-memory storage backend.
//!
//! Holds conversations and assets in maps behind an `RwLock`. Used in tests
//! and for ephemeral sessions; the file backend is the durable counterpart.

use crate::tree::{ConversationNode, ConversationTree};
use async_trait::async_trait;
use loreloom_core::error::StoreError;
use loreloom_core::message::Message;
use loreloom_core::store::{
    AssetKind, AssetStore, ConversationStore, FlattenedConversation, ScanEntry,
};
use loreloom_core::vars::Variables;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryStore {
    conversations: RwLock<HashMap<String, ConversationTree>>,
    assets: RwLock<HashMap<(AssetKind, String), Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_conversation(&self, file: impl Into<String>, tree: ConversationTree) {
        self.conversations.write().await.insert(file.into(), tree);
    }

    pub async fn insert_asset(&self, kind: AssetKind, path: impl Into<String>, value: Value) {
        self.assets.write().await.insert((kind, path.into()), value);
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn flatten(&self, file: &str) -> Result<FlattenedConversation, StoreError> {
        let conversations = self.conversations.read().await;
        let tree = conversations
            .get(file)
            .ok_or_else(|| StoreError::ConversationNotFound {
                file: file.to_string(),
            })?;
        tree.flatten(file)
    }

    async fn append(&self, file: &str, message: Message) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        let tree = conversations
            .get_mut(file)
            .ok_or_else(|| StoreError::ConversationNotFound {
                file: file.to_string(),
            })?;
        tree.append(ConversationNode::new(message.role.as_str(), message.content));
        Ok(())
    }

    async fn load_variables(&self, file: &str) -> Result<Variables, StoreError> {
        let conversations = self.conversations.read().await;
        let tree = conversations
            .get(file)
            .ok_or_else(|| StoreError::ConversationNotFound {
                file: file.to_string(),
            })?;
        if tree.variables.is_null() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        Ok(tree.variables.clone())
    }

    async fn save_variables(&self, file: &str, variables: &Variables) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        let tree = conversations
            .get_mut(file)
            .ok_or_else(|| StoreError::ConversationNotFound {
                file: file.to_string(),
            })?;
        tree.variables = variables.clone();
        Ok(())
    }
}

#[async_trait]
impl AssetStore for InMemoryStore {
    async fn read(&self, kind: AssetKind, path: &str) -> Result<Value, StoreError> {
        self.assets
            .read()
            .await
            .get(&(kind, path.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                file: path.to_string(),
            })
    }

    async fn scan(&self, kind: AssetKind) -> Vec<ScanEntry> {
        let assets = self.assets.read().await;
        let mut entries: Vec<ScanEntry> = assets
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|((_, path), value)| ScanEntry::ok(path.clone(), value.clone()))
            .collect();
        entries.sort_by(|a, b| a.file.cmp(&b.file));
        entries
    }
}
