//! Prompt assembly — the core of the pipeline.
//!
//! Three stages, always in this order:
//!
//! 1. [`depth`] — compute each history message's depth (distance from the
//!    end of the conversation, measured in user/assistant turns)
//! 2. [`in_chat`] — inject in-chat preset fragments and world-book entries
//!    at their configured depths
//! 3. [`relative`] — wrap the depth-injected history in the relative preset
//!    frame (descriptions, lore blocks, free-form fragments) in document
//!    order
//!
//! Assembly is deterministic: identical inputs always produce identical
//! outputs. Candidates that tie on order and role collapse to original
//! declaration order.

pub mod depth;
pub mod in_chat;
pub mod relative;

pub use depth::assign_depths;
pub use in_chat::{construct, inject, parse_history};
pub use relative::{AssemblyInputs, assemble};

use loreloom_core::message::Message;
use serde_json::{Map, Value};

/// Serialize a fragment/entry to its source metadata fields: everything the
/// author wrote except the (potentially large) `content`, and minus `id` for
/// world-book entries where it moves to `wb_id`.
pub(crate) fn source_fields<T: serde::Serialize>(item: &T, drop: &[&str]) -> Map<String, Value> {
    match serde_json::to_value(item) {
        Ok(Value::Object(mut map)) => {
            map.remove("content");
            for key in drop {
                map.remove(*key);
            }
            map
        }
        _ => Map::new(),
    }
}

/// Concatenate history content for substring key matching.
pub(crate) fn history_text(history: &[Message]) -> String {
    let mut text = String::new();
    for m in history {
        text.push_str(&m.content);
        text.push('\n');
    }
    text
}
