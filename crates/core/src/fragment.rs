//! Prompt fragment and world-book entry types.
//!
//! Both presets and world books are authored as plain JSON; the structs here
//! use permissive serde defaults so partially-specified entries still load.
//!
//! Two different `enabled` defaulting policies exist by design (see the
//! project DESIGN notes): relative preset fragments require an explicit
//! `enabled: true`, while in-chat fragments and world-book entries treat a
//! missing `enabled` as enabled.

use crate::message::Role;
use serde::{Deserialize, Serialize};

/// Where a preset fragment is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FragmentPosition {
    /// Placed once, in document order, relative to other fragments.
    #[serde(rename = "relative")]
    Relative,
    /// Injected at a specific depth within the conversation.
    #[serde(rename = "in-chat")]
    InChat,
}

/// How a fragment/entry decides whether it participates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    #[default]
    Always,
    Conditional,
}

/// A single preset prompt fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Slot selector for relative fragments (`chatHistory`, `charBefore`,
    /// `charAfter`, `charDescription`, `personaDescription`, or free-form).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    #[serde(default)]
    pub content: String,

    pub position: FragmentPosition,

    /// Tri-state on purpose: `None` means "enabled" for in-chat fragments
    /// but "disabled" for relative fragments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub mode: TriggerMode,

    /// Condition expression for `mode == conditional`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Substring trigger keys, matched case-sensitively against history.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,

    /// Assembly order, default 100. Smaller sorts earlier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,

    /// Injection depth for in-chat fragments, default 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl PromptFragment {
    /// Enablement under the in-chat policy: missing means enabled.
    pub fn enabled_in_chat(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Enablement under the relative policy: only an explicit `true` counts.
    pub fn enabled_relative(&self) -> bool {
        self.enabled == Some(true)
    }
}

/// Where a world-book entry injects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorldBookPosition {
    #[serde(rename = "before_char")]
    BeforeChar,
    #[serde(rename = "after_char")]
    AfterChar,
    #[default]
    #[serde(rename = "in-chat")]
    InChat,
}

/// A single world-book (lorebook) entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldBookEntry {
    /// Original ids may be strings or numbers; kept opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub position: WorldBookPosition,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub mode: TriggerMode,

    /// Substring trigger keys for conditional entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,

    /// Condition expression, preferred over `keys` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl WorldBookEntry {
    /// World-book entries treat a missing `enabled` as enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// The message role for this entry: explicit role if declared and valid
    /// for a prompt (user/assistant/system), otherwise `system`.
    pub fn effective_role(&self) -> Role {
        match self.role {
            Some(Role::User) => Role::User,
            Some(Role::Assistant) => Role::Assistant,
            _ => Role::System,
        }
    }
}

/// A character card. Only the fields the pipeline consumes are modeled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A user persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    #[serde(default)]
    pub description: String,
}
