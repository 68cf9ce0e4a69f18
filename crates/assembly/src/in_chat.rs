//! In-chat injection.
//!
//! Merges in-chat preset fragments and world-book entries into the history
//! at their configured depths. Trigger evaluation is fail-closed: any
//! condition failure means "not triggered", never an error.

use crate::{history_text, source_fields};
use loreloom_core::error::AssemblyError;
use loreloom_core::fragment::{
    FragmentPosition, PromptFragment, TriggerMode, WorldBookEntry, WorldBookPosition,
};
use loreloom_core::macros::MacroEngine;
use loreloom_core::message::{Message, Role, Source, SourceKind};
use loreloom_core::vars::Variables;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// How a candidate decides whether it fires.
enum Trigger {
    Always,
    /// Condition DSL expression, evaluated against the variable context.
    Expr(String),
    /// Substring keys, matched case-sensitively against history content.
    Keys(Vec<String>),
    /// Conditional with nothing to evaluate: never fires.
    Never,
}

struct Candidate {
    depth: usize,
    order: i64,
    role: Role,
    internal_order: usize,
    trigger: Trigger,
    message: Message,
}

fn trigger_for(mode: TriggerMode, condition: &Option<String>, keys: &[String]) -> Trigger {
    match mode {
        TriggerMode::Always => Trigger::Always,
        TriggerMode::Conditional => {
            if let Some(expr) = condition {
                Trigger::Expr(expr.clone())
            } else if !keys.is_empty() {
                Trigger::Keys(keys.to_vec())
            } else {
                Trigger::Never
            }
        }
    }
}

fn fragment_candidate(fragment: &PromptFragment, internal_order: usize) -> Candidate {
    let role = fragment.role.unwrap_or(Role::System);
    let order = fragment.order.unwrap_or(100);
    let depth = fragment.depth.unwrap_or(0).max(0) as usize;

    let mut source = Source::preset(SourceKind::PresetInChat, source_fields(fragment, &[]));
    source.source_id = fragment.id.clone();
    source.order = Some(order);
    source.role = Some(role);
    source.internal_order = Some(internal_order);

    Candidate {
        depth,
        order,
        role,
        internal_order,
        trigger: trigger_for(fragment.mode, &fragment.condition, &fragment.keys),
        message: Message::new(role, fragment.content.clone(), source),
    }
}

fn entry_candidate(entry: &WorldBookEntry, internal_order: usize) -> Candidate {
    let role = entry.effective_role();
    let order = entry.order.unwrap_or(100);
    let depth = entry.depth.unwrap_or(0).max(0) as usize;

    let mut source = Source::world_book(
        SourceKind::WorldBookInChat,
        entry.id.clone(),
        source_fields(entry, &["id"]),
    );
    source.order = Some(order);
    source.role = Some(role);
    source.internal_order = Some(internal_order);

    Candidate {
        depth,
        order,
        role,
        internal_order,
        trigger: trigger_for(entry.mode, &entry.condition, &entry.keys),
        message: Message::new(role, entry.content.clone(), source),
    }
}

/// Resolve triggers for all candidates, batching expression evaluation.
///
/// The batch call amortizes interpreter overhead; on batch failure the
/// expressions are retried one by one, and any per-item failure is treated
/// as "not triggered".
async fn filter_triggered(
    candidates: Vec<Candidate>,
    history: &[Message],
    variables: &Variables,
    macros: &dyn MacroEngine,
) -> Vec<Candidate> {
    let exprs: Vec<String> = candidates
        .iter()
        .filter_map(|c| match &c.trigger {
            Trigger::Expr(e) => Some(e.clone()),
            _ => None,
        })
        .collect();

    let batch = if exprs.is_empty() {
        Some(Vec::new())
    } else {
        match macros.eval_batch(&exprs, variables).await {
            Ok(results) => Some(results),
            Err(e) => {
                debug!(error = %e, "batch condition evaluation failed, falling back to per-item");
                None
            }
        }
    };

    let text = history_text(history);
    let mut expr_idx = 0;
    let mut kept = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let fires = match &candidate.trigger {
            Trigger::Always => true,
            Trigger::Never => false,
            Trigger::Keys(keys) => keys.iter().any(|k| text.contains(k.as_str())),
            Trigger::Expr(expr) => {
                let result = match &batch {
                    Some(results) => results[expr_idx],
                    None => macros
                        .eval_condition(expr, variables)
                        .await
                        .unwrap_or_else(|e| {
                            warn!(error = %e, "condition evaluation failed, treating as false");
                            false
                        }),
                };
                expr_idx += 1;
                result
            }
        };
        if fires {
            kept.push(candidate);
        }
    }
    kept
}

/// Inject in-chat fragments and world-book entries into the history.
///
/// Candidates are sorted by `(order, role priority, internal order)`, grouped
/// by depth, and each group is spliced in at `max(0, len − depth)` measured
/// against the working list, largest depth first. Insertion is stable.
pub async fn inject(
    history: &[Message],
    fragments: &[PromptFragment],
    world_book: &[WorldBookEntry],
    variables: &Variables,
    macros: &dyn MacroEngine,
) -> Vec<Message> {
    let mut candidates = Vec::new();
    let mut internal_order = 0;

    for fragment in fragments {
        if fragment.position == FragmentPosition::InChat && fragment.enabled_in_chat() {
            candidates.push(fragment_candidate(fragment, internal_order));
            internal_order += 1;
        }
    }
    for entry in world_book {
        if entry.position == WorldBookPosition::InChat && entry.is_enabled() {
            candidates.push(entry_candidate(entry, internal_order));
            internal_order += 1;
        }
    }

    if candidates.is_empty() {
        return history.to_vec();
    }

    let mut candidates = filter_triggered(candidates, history, variables, macros).await;
    candidates.sort_by_key(|c| (c.order, c.role.priority(), c.internal_order));

    let mut by_depth: BTreeMap<usize, Vec<Candidate>> = BTreeMap::new();
    for candidate in candidates {
        by_depth.entry(candidate.depth).or_default().push(candidate);
    }

    let mut out = history.to_vec();
    // Largest depth first; within a group, insert members in reverse at the
    // same index so earlier members end up first.
    for (depth, group) in by_depth.iter().rev() {
        let index = out.len().saturating_sub(*depth);
        for candidate in group.iter().rev() {
            out.insert(index, candidate.message.clone());
        }
    }
    out
}

/// Parse raw history JSON into typed messages, strictly.
///
/// This is the one place the pipeline fails loud: an unknown role in raw
/// history means caller-side data corruption.
pub fn parse_history(raw: &Value) -> Result<Vec<Message>, AssemblyError> {
    let entries = raw.as_array().cloned().unwrap_or_default();
    let mut messages = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let obj = entry
            .as_object()
            .ok_or(AssemblyError::MalformedHistoryEntry { index })?;
        let role_str = obj.get("role").and_then(Value::as_str).unwrap_or("");
        let role = Role::parse(role_str).ok_or_else(|| AssemblyError::InvalidRole {
            role: role_str.to_string(),
            index,
        })?;
        let content = obj.get("content").and_then(Value::as_str).unwrap_or("");
        messages.push(Message::history(role, content, index));
    }
    Ok(messages)
}

/// The strict in-chat construction entry point: parse raw history, then
/// inject. Matches the `construct(history, presetsInChat, worldBooks,
/// variables?)` contract.
pub async fn construct(
    raw_history: &Value,
    fragments: &[PromptFragment],
    world_book: &[WorldBookEntry],
    variables: &Variables,
    macros: &dyn MacroEngine,
) -> Result<Vec<Message>, AssemblyError> {
    let history = parse_history(raw_history)?;
    Ok(inject(&history, fragments, world_book, variables, macros).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loreloom_macros::TemplateMacroEngine;
    use serde_json::json;

    fn frag(json: Value) -> PromptFragment {
        serde_json::from_value(json).unwrap()
    }

    fn entry(json: Value) -> WorldBookEntry {
        serde_json::from_value(json).unwrap()
    }

    fn history_pair() -> Vec<Message> {
        vec![
            Message::history(Role::User, "hi", 0),
            Message::history(Role::Assistant, "hello", 1),
        ]
    }

    #[tokio::test]
    async fn empty_candidates_is_identity() {
        let engine = TemplateMacroEngine::new();
        let history = history_pair();
        let out = inject(&history, &[], &[], &json!({}), &engine).await;
        assert_eq!(out, history);
    }

    #[tokio::test]
    async fn spec_example_depth_one_insertion() {
        let engine = TemplateMacroEngine::new();
        let history = history_pair();
        let fragments = vec![frag(json!({
            "position": "in-chat", "content": "[SYS]",
            "depth": 1, "order": 50, "role": "system"
        }))];
        let out = inject(&history, &fragments, &[], &json!({}), &engine).await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].content, "hi");
        assert_eq!(out[1].content, "[SYS]");
        assert_eq!(out[1].role, Role::System);
        assert_eq!(out[2].content, "hello");
    }

    #[tokio::test]
    async fn depth_beyond_history_prepends() {
        let engine = TemplateMacroEngine::new();
        let history = history_pair();
        let fragments = vec![frag(json!({
            "position": "in-chat", "content": "way back", "depth": 99
        }))];
        let out = inject(&history, &fragments, &[], &json!({}), &engine).await;
        assert_eq!(out[0].content, "way back");
    }

    #[tokio::test]
    async fn stable_order_for_ties() {
        let engine = TemplateMacroEngine::new();
        let history = history_pair();
        let fragments = vec![
            frag(json!({"position": "in-chat", "content": "first", "depth": 0, "order": 10})),
            frag(json!({"position": "in-chat", "content": "second", "depth": 0, "order": 10})),
        ];
        let out = inject(&history, &fragments, &[], &json!({}), &engine).await;
        let first = out.iter().position(|m| m.content == "first").unwrap();
        let second = out.iter().position(|m| m.content == "second").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn role_priority_breaks_order_ties() {
        let engine = TemplateMacroEngine::new();
        let history = history_pair();
        let fragments = vec![
            frag(json!({"position": "in-chat", "content": "sys", "role": "system"})),
            frag(json!({"position": "in-chat", "content": "asst", "role": "assistant"})),
        ];
        let out = inject(&history, &fragments, &[], &json!({}), &engine).await;
        let asst = out.iter().position(|m| m.content == "asst").unwrap();
        let sys = out.iter().position(|m| m.content == "sys").unwrap();
        assert!(asst < sys);
    }

    #[tokio::test]
    async fn conditional_expression_gates_injection() {
        let engine = TemplateMacroEngine::new();
        let history = history_pair();
        let fragments = vec![frag(json!({
            "position": "in-chat", "content": "tense note",
            "mode": "conditional", "condition": "vars.mood == \"tense\""
        }))];

        let out = inject(&history, &fragments, &[], &json!({"mood": "calm"}), &engine).await;
        assert_eq!(out.len(), 2);

        let out = inject(&history, &fragments, &[], &json!({"mood": "tense"}), &engine).await;
        assert_eq!(out.len(), 3);
    }

    #[tokio::test]
    async fn bad_condition_is_not_triggered_but_others_survive() {
        let engine = TemplateMacroEngine::new();
        let history = history_pair();
        let fragments = vec![
            frag(json!({
                "position": "in-chat", "content": "broken",
                "mode": "conditional", "condition": "THIS IS NOT VALID"
            })),
            frag(json!({
                "position": "in-chat", "content": "fine",
                "mode": "conditional", "condition": "vars.x == 1"
            })),
        ];
        let out = inject(&history, &fragments, &[], &json!({"x": 1}), &engine).await;
        assert!(out.iter().any(|m| m.content == "fine"));
        assert!(!out.iter().any(|m| m.content == "broken"));
    }

    #[tokio::test]
    async fn world_book_keys_match_history_case_sensitively() {
        let engine = TemplateMacroEngine::new();
        let history = vec![Message::history(Role::User, "we found the Ruins", 0)];
        let entries = vec![
            entry(json!({"content": "ruins lore", "mode": "conditional", "keys": ["Ruins"]})),
            entry(json!({"content": "no match", "mode": "conditional", "keys": ["ruins"]})),
        ];
        let out = inject(&history, &[], &entries, &json!({}), &engine).await;
        assert!(out.iter().any(|m| m.content == "ruins lore"));
        assert!(!out.iter().any(|m| m.content == "no match"));
    }

    #[tokio::test]
    async fn disabled_fragment_skipped_but_missing_enabled_passes() {
        let engine = TemplateMacroEngine::new();
        let history = history_pair();
        let fragments = vec![
            frag(json!({"position": "in-chat", "content": "off", "enabled": false})),
            frag(json!({"position": "in-chat", "content": "on"})),
        ];
        let out = inject(&history, &fragments, &[], &json!({}), &engine).await;
        assert!(out.iter().any(|m| m.content == "on"));
        assert!(!out.iter().any(|m| m.content == "off"));
    }

    #[tokio::test]
    async fn world_book_entry_id_moves_to_wb_id() {
        let engine = TemplateMacroEngine::new();
        let entries = vec![entry(json!({"id": 7, "content": "lore"}))];
        let out = inject(&history_pair(), &[], &entries, &json!({}), &engine).await;
        let lore = out.iter().find(|m| m.content == "lore").unwrap();
        assert_eq!(lore.source.kind, SourceKind::WorldBookInChat);
        assert_eq!(lore.source.wb_id, Some(json!(7)));
        assert!(!lore.source.fields.contains_key("id"));
    }

    #[test]
    fn parse_history_rejects_unknown_role() {
        let raw = json!([
            {"role": "user", "content": "hi"},
            {"role": "narrator", "content": "boom"}
        ]);
        let err = parse_history(&raw).unwrap_err();
        match err {
            AssemblyError::InvalidRole { role, index } => {
                assert_eq!(role, "narrator");
                assert_eq!(index, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn construct_parses_then_injects() {
        let engine = TemplateMacroEngine::new();
        let raw = json!([
            {"role": "user", "content": "hi"},
            {"role": "assistant", "content": "hello"}
        ]);
        let fragments = vec![frag(json!({
            "position": "in-chat", "content": "[SYS]", "depth": 1
        }))];
        let out = construct(&raw, &fragments, &[], &json!({}), &engine)
            .await
            .unwrap();
        assert_eq!(out[1].content, "[SYS]");
    }
}
