//! Fingerprint computation and diffing.
//!
//! Delta mode sends the client only what changed since its last fetch.
//! Messages fingerprint as `{content, role}` keyed by the source's delta
//! key; variables fingerprint per flattened leaf path. The whole-document
//! variables hash supports a fast no-op path when the client already holds
//! the current state.

use crate::canonical::hash_value;
use loreloom_core::message::{Message, Role};
use loreloom_core::vars::{self, Variables};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Fingerprints for one `(file, view, router)` combination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fingerprints {
    /// delta key → message hash
    pub messages: BTreeMap<String, String>,
    /// flattened path → leaf hash
    pub variables: BTreeMap<String, String>,
    /// hash of the whole variable document
    pub variables_hash: String,
}

/// A message the client needs to refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedMessage {
    pub source_id: String,
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDelta {
    pub changed: Vec<ChangedMessage>,
    pub unchanged: usize,
    pub messages_deleted: Vec<String>,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableDelta {
    /// path → current leaf value
    pub variables_changed: BTreeMap<String, Value>,
    pub variables_deleted: Vec<String>,
    pub variables_unchanged: usize,
    /// True when the client's whole-document hash already matched.
    pub variables_noop: bool,
}

/// Whether a message participates in delta tracking: history provenance
/// with a prompt-visible role.
fn retained(message: &Message) -> bool {
    message.source.kind.is_history()
        && matches!(message.role, Role::User | Role::Assistant | Role::System)
}

fn message_hash(message: &Message) -> String {
    hash_value(&json!({
        "content": message.content,
        "role": message.role,
    }))
}

/// Compute the fingerprint map for the retained messages in a list.
pub fn message_fingerprints(messages: &[Message]) -> BTreeMap<String, String> {
    messages
        .iter()
        .filter(|m| retained(m))
        .map(|m| (m.source.delta_key(), message_hash(m)))
        .collect()
}

/// Diff current messages against a baseline fingerprint map.
pub fn diff_messages(messages: &[Message], baseline: &BTreeMap<String, String>) -> MessageDelta {
    let mut delta = MessageDelta::default();
    let mut current_keys = BTreeMap::new();

    for message in messages.iter().filter(|m| retained(m)) {
        let key = message.source.delta_key();
        let hash = message_hash(message);
        delta.total += 1;
        if baseline.get(&key) == Some(&hash) {
            delta.unchanged += 1;
        } else {
            delta.changed.push(ChangedMessage {
                source_id: key.clone(),
                role: message.role,
                content: message.content.clone(),
            });
        }
        current_keys.insert(key, hash);
    }

    delta.messages_deleted = baseline
        .keys()
        .filter(|k| !current_keys.contains_key(*k))
        .cloned()
        .collect();
    delta
}

/// Compute per-path fingerprints for a variable document.
pub fn variable_fingerprints(variables: &Variables) -> BTreeMap<String, String> {
    vars::flatten(variables)
        .into_iter()
        .map(|(path, leaf)| (path, hash_value(&leaf)))
        .collect()
}

/// Hash the whole variable document.
pub fn variables_hash(variables: &Variables) -> String {
    hash_value(variables)
}

/// Diff current variables against baseline per-path fingerprints.
///
/// If the caller's whole-document hash matches the current one, the per-path
/// diff is skipped entirely and `variables_noop` is set.
pub fn diff_variables(
    variables: &Variables,
    baseline: &BTreeMap<String, String>,
    client_hash: Option<&str>,
) -> VariableDelta {
    let current_hash = variables_hash(variables);
    if client_hash == Some(current_hash.as_str()) {
        return VariableDelta {
            variables_noop: true,
            ..VariableDelta::default()
        };
    }

    let mut delta = VariableDelta::default();
    let mut current_paths = BTreeMap::new();

    for (path, leaf) in vars::flatten(variables) {
        let hash = hash_value(&leaf);
        if baseline.get(&path) == Some(&hash) {
            delta.variables_unchanged += 1;
        } else {
            delta.variables_changed.insert(path.clone(), leaf);
        }
        current_paths.insert(path, hash);
    }

    delta.variables_deleted = baseline
        .keys()
        .filter(|k| !current_paths.contains_key(*k))
        .cloned()
        .collect();
    delta
}

/// Build the full fingerprint snapshot stored after a delta computation.
pub fn snapshot(messages: &[Message], variables: &Variables) -> Fingerprints {
    Fingerprints {
        messages: message_fingerprints(messages),
        variables: variable_fingerprints(variables),
        variables_hash: variables_hash(variables),
    }
}
