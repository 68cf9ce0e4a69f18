//! Conversation trees.
//!
//! A conversation is a tree of turns: regenerating a reply or editing a turn
//! forks a new branch, and exactly one path through the tree is "active" at
//! a time. The pipeline only ever consumes the active path, flattened into
//! an ordered message list.
//!
//! Roles are stored as raw strings and validated at flatten time — that is
//! the strict boundary where unknown roles become a hard error.

use loreloom_core::error::StoreError;
use loreloom_core::message::{Message, Role};
use loreloom_core::store::FlattenedConversation;
use loreloom_core::vars::Variables;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One turn in a conversation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationNode {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ConversationNode>,
    /// Which child continues the active path. Missing means the most
    /// recently added child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_child: Option<usize>,
}

impl ConversationNode {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: role.into(),
            content: content.into(),
            children: Vec::new(),
            active_child: None,
        }
    }

    fn active_child_index(&self) -> Option<usize> {
        if self.children.is_empty() {
            return None;
        }
        match self.active_child {
            Some(i) if i < self.children.len() => Some(i),
            _ => Some(self.children.len() - 1),
        }
    }
}

/// A whole conversation: a forest of root turns plus the variable document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationTree {
    #[serde(default)]
    pub roots: Vec<ConversationNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_root: Option<usize>,
    #[serde(default)]
    pub variables: Variables,
}

impl ConversationTree {
    fn active_root_index(&self) -> Option<usize> {
        if self.roots.is_empty() {
            return None;
        }
        match self.active_root {
            Some(i) if i < self.roots.len() => Some(i),
            _ => Some(self.roots.len() - 1),
        }
    }

    /// Flatten the active path into ordered messages, validating roles.
    pub fn flatten(&self, file: &str) -> Result<FlattenedConversation, StoreError> {
        let mut messages = Vec::new();
        let mut active_path = Vec::new();

        let mut current = self.active_root_index().map(|i| &self.roots[i]);
        let mut index = 0;
        while let Some(node) = current {
            let role = Role::parse(&node.role).ok_or_else(|| StoreError::InvalidTree {
                file: file.to_string(),
                reason: format!("unknown role '{}' at node {}", node.role, node.id),
            })?;
            messages.push(Message::history(role, node.content.clone(), index));
            active_path.push(node.id.clone());
            index += 1;
            current = node.active_child_index().map(|i| &node.children[i]);
        }

        Ok(FlattenedConversation {
            messages,
            active_path,
        })
    }

    /// Append a turn at the end of the active path and make it active.
    pub fn append(&mut self, node: ConversationNode) {
        match self.active_root_index() {
            None => {
                self.roots.push(node);
                self.active_root = Some(self.roots.len() - 1);
            }
            Some(root) => {
                self.active_root = Some(root);
                let mut current = &mut self.roots[root];
                while let Some(i) = current.active_child_index() {
                    current.active_child = Some(i);
                    current = &mut current.children[i];
                }
                current.children.push(node);
                current.active_child = Some(current.children.len() - 1);
            }
        }
    }
}
