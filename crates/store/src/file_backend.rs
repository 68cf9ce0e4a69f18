//! File-based storage backend.
//!
//! Layout under the data root:
//!
//! ```text
//! <root>/conversations/<file>     one JSON ConversationTree per file
//! <root>/presets/*.json
//! <root>/characters/*.json
//! <root>/personas/*.json
//! <root>/world_books/*.json
//! <root>/regex_rules/*.json
//! ```
//!
//! Conversations carry their variable document inline, so variable saves
//! rewrite the conversation file. Asset scans degrade per file: a JSON file
//! that fails to read or parse becomes a `{file, error}` entry, never a
//! failed scan.

use crate::tree::{ConversationNode, ConversationTree};
use async_trait::async_trait;
use loreloom_core::error::StoreError;
use loreloom_core::message::Message;
use loreloom_core::store::{
    AssetKind, AssetStore, ConversationStore, FlattenedConversation, ScanEntry,
};
use loreloom_core::vars::Variables;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct FileStore {
    root: PathBuf,
}

fn subdir(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Preset => "presets",
        AssetKind::Character => "characters",
        AssetKind::Persona => "personas",
        AssetKind::WorldBook => "world_books",
        AssetKind::RegexRules => "regex_rules",
    }
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        debug!(root = %root.display(), "file store opened");
        Self { root }
    }

    fn conversation_path(&self, file: &str) -> PathBuf {
        self.root.join("conversations").join(file)
    }

    fn asset_path(&self, kind: AssetKind, path: &str) -> PathBuf {
        self.root.join(subdir(kind)).join(path)
    }

    fn load_tree(&self, file: &str) -> Result<ConversationTree, StoreError> {
        let path = self.conversation_path(file);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::ConversationNotFound {
                    file: file.to_string(),
                }
            } else {
                StoreError::Io {
                    file: file.to_string(),
                    error: e.to_string(),
                }
            }
        })?;
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            file: file.to_string(),
            error: e.to_string(),
        })
    }

    fn save_tree(&self, file: &str, tree: &ConversationTree) -> Result<(), StoreError> {
        let path = self.conversation_path(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                file: file.to_string(),
                error: e.to_string(),
            })?;
        }
        let content = serde_json::to_string_pretty(tree).map_err(|e| StoreError::Corrupt {
            file: file.to_string(),
            error: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| StoreError::Io {
            file: file.to_string(),
            error: e.to_string(),
        })
    }
}

fn read_asset_file(path: &Path) -> Result<Value, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&content).map_err(|e| e.to_string())
}

#[async_trait]
impl ConversationStore for FileStore {
    async fn flatten(&self, file: &str) -> Result<FlattenedConversation, StoreError> {
        self.load_tree(file)?.flatten(file)
    }

    async fn append(&self, file: &str, message: Message) -> Result<(), StoreError> {
        let mut tree = self.load_tree(file)?;
        tree.append(ConversationNode::new(message.role.as_str(), message.content));
        self.save_tree(file, &tree)
    }

    async fn load_variables(&self, file: &str) -> Result<Variables, StoreError> {
        let tree = self.load_tree(file)?;
        if tree.variables.is_null() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        Ok(tree.variables)
    }

    async fn save_variables(&self, file: &str, variables: &Variables) -> Result<(), StoreError> {
        let mut tree = self.load_tree(file)?;
        tree.variables = variables.clone();
        self.save_tree(file, &tree)
    }
}

#[async_trait]
impl AssetStore for FileStore {
    async fn read(&self, kind: AssetKind, path: &str) -> Result<Value, StoreError> {
        let full = self.asset_path(kind, path);
        if !full.exists() {
            return Err(StoreError::NotFound {
                file: path.to_string(),
            });
        }
        read_asset_file(&full).map_err(|error| StoreError::Unreadable {
            file: path.to_string(),
            error,
        })
    }

    async fn scan(&self, kind: AssetKind) -> Vec<ScanEntry> {
        let dir = self.root.join(subdir(kind));
        let reader = match std::fs::read_dir(&dir) {
            Ok(r) => r,
            // A missing kind directory is an empty scan, not an error.
            Err(_) => return Vec::new(),
        };

        let mut entries = Vec::new();
        for item in reader.flatten() {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let name = item.file_name().to_string_lossy().into_owned();
            match read_asset_file(&path) {
                Ok(value) => entries.push(ScanEntry::ok(name, value)),
                Err(error) => entries.push(ScanEntry::failed(name, error)),
            }
        }
        entries.sort_by(|a, b| a.file.cmp(&b.file));
        entries
    }
}
