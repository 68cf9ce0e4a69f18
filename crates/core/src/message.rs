//! Message and provenance domain types.
//!
//! These are the core value objects that flow through the entire pipeline:
//! a conversation tree is flattened into [`Message`]s, the assembly stages
//! weave preset fragments and world-book entries in, and the postprocessor
//! rewrites content — but every message keeps its [`Source`] so later stages
//! can always tell where a piece of the prompt came from.
//!
//! Wire contract: a message serializes as `role` → `content` → `source`, in
//! that field order. Messages are immutable once built; the pipeline only
//! ever produces new message lists, never mutates history in place.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions (presets, lore, descriptions)
    System,
    /// Reasoning turns — carried through assembly, excluded from LLM payloads
    Thinking,
}

impl Role {
    /// Parse a raw role string. Returns `None` for anything unrecognized —
    /// callers in strict contexts turn that into a validation error.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            "thinking" => Some(Role::Thinking),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Thinking => "thinking",
        }
    }

    /// Sort priority used when candidates tie on `order`:
    /// assistant first, then user, then system.
    pub fn priority(&self) -> u8 {
        match self {
            Role::Assistant => 0,
            Role::User => 1,
            Role::System => 2,
            Role::Thinking => 3,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The rendering context a postprocessed message list is built for.
///
/// `user_view` is what the client displays; `assistant_view` is what is
/// actually sent to the LLM. Each view has an independently configurable
/// regex rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum View {
    #[serde(rename = "user_view")]
    UserView,
    #[serde(rename = "assistant_view")]
    AssistantView,
}

impl View {
    pub fn as_str(&self) -> &'static str {
        match self {
            View::UserView => "user_view",
            View::AssistantView => "assistant_view",
        }
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance tag: which kind of thing produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    #[serde(rename = "history.user")]
    HistoryUser,
    #[serde(rename = "history.assistant")]
    HistoryAssistant,
    #[serde(rename = "history.system")]
    HistorySystem,
    #[serde(rename = "history.thinking")]
    HistoryThinking,
    #[serde(rename = "preset.relative")]
    PresetRelative,
    #[serde(rename = "preset.in-chat")]
    PresetInChat,
    #[serde(rename = "world_book.before_char")]
    WorldBookBeforeChar,
    #[serde(rename = "world_book.after_char")]
    WorldBookAfterChar,
    #[serde(rename = "world_book.in-chat")]
    WorldBookInChat,
    #[serde(rename = "char.description")]
    CharDescription,
    #[serde(rename = "persona.description")]
    PersonaDescription,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::HistoryUser => "history.user",
            SourceKind::HistoryAssistant => "history.assistant",
            SourceKind::HistorySystem => "history.system",
            SourceKind::HistoryThinking => "history.thinking",
            SourceKind::PresetRelative => "preset.relative",
            SourceKind::PresetInChat => "preset.in-chat",
            SourceKind::WorldBookBeforeChar => "world_book.before_char",
            SourceKind::WorldBookAfterChar => "world_book.after_char",
            SourceKind::WorldBookInChat => "world_book.in-chat",
            SourceKind::CharDescription => "char.description",
            SourceKind::PersonaDescription => "persona.description",
        }
    }

    /// The coarse category prefix: one of `history`, `preset`, `world_book`,
    /// `char`, `persona`.
    pub fn category(&self) -> &'static str {
        match self {
            SourceKind::HistoryUser
            | SourceKind::HistoryAssistant
            | SourceKind::HistorySystem
            | SourceKind::HistoryThinking => "history",
            SourceKind::PresetRelative | SourceKind::PresetInChat => "preset",
            SourceKind::WorldBookBeforeChar
            | SourceKind::WorldBookAfterChar
            | SourceKind::WorldBookInChat => "world_book",
            SourceKind::CharDescription => "char",
            SourceKind::PersonaDescription => "persona",
        }
    }

    /// Whether a rule target string selects this kind: exact match on the
    /// full type, or prefix match on one of the five coarse categories.
    pub fn matches_target(&self, target: &str) -> bool {
        target == self.as_str() || target == self.category()
    }

    pub fn is_history(&self) -> bool {
        self.category() == "history"
    }
}

/// Provenance metadata attached to every assembled message.
///
/// Beyond the tag itself, a source carries the original fragment/entry
/// fields (flattened into the serialized record; a world-book entry's `id`
/// is renamed to `wb_id` to avoid collision) and the ordering metadata used
/// only during assembly (`order`, `role`, `internal_order`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub kind: SourceKind,

    /// Position in the flattened history (history sources only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,

    /// Stable identifier used as the delta fingerprint key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,

    /// World-book entry id (renamed from `id`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wb_id: Option<Value>,

    /// Assembly ordering: smaller runs earlier. Default 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,

    /// Assembly ordering: role priority tie-break.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Assembly ordering: stable tie-break, the original array index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_order: Option<usize>,

    /// Remaining original fragment/entry fields, carried verbatim.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Source {
    fn bare(kind: SourceKind) -> Self {
        Self {
            kind,
            index: None,
            source_id: None,
            wb_id: None,
            order: None,
            role: None,
            internal_order: None,
            fields: Map::new(),
        }
    }

    /// Provenance for a flattened history turn.
    pub fn history(role: Role, index: usize) -> Self {
        let kind = match role {
            Role::User => SourceKind::HistoryUser,
            Role::Assistant => SourceKind::HistoryAssistant,
            Role::System => SourceKind::HistorySystem,
            Role::Thinking => SourceKind::HistoryThinking,
        };
        Self {
            index: Some(index),
            ..Self::bare(kind)
        }
    }

    /// Provenance for a preset fragment, carrying its original fields.
    pub fn preset(kind: SourceKind, fields: Map<String, Value>) -> Self {
        Self {
            fields,
            ..Self::bare(kind)
        }
    }

    /// Provenance for a world-book entry. The entry's `id` moves to `wb_id`.
    pub fn world_book(kind: SourceKind, wb_id: Option<Value>, fields: Map<String, Value>) -> Self {
        Self {
            wb_id,
            fields,
            ..Self::bare(kind)
        }
    }

    pub fn char_description() -> Self {
        Self::bare(SourceKind::CharDescription)
    }

    pub fn persona_description() -> Self {
        Self::bare(SourceKind::PersonaDescription)
    }

    /// The key used by the delta fingerprint map: `source_id`, falling back
    /// to the original `id` field, falling back to `history_{index}`.
    pub fn delta_key(&self) -> String {
        if let Some(id) = &self.source_id {
            return id.clone();
        }
        if let Some(id) = self.fields.get("id") {
            return match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
        }
        format!("history_{}", self.index.unwrap_or(0))
    }
}

/// A single message in an assembled prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who speaks this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Where this message came from
    pub source: Source,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, source: Source) -> Self {
        Self {
            role,
            content: content.into(),
            source,
        }
    }

    /// A history turn at the given flattened index.
    pub fn history(role: Role, content: impl Into<String>, index: usize) -> Self {
        Self::new(role, content, Source::history(role, index))
    }
}
