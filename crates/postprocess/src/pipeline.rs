//! The view postprocessing pipeline.
//!
//! Three steps, always run in order: a before-macro regex pass, macro
//! expansion, an after-macro regex pass. The pipeline is fail-soft the whole
//! way down: a rule that doesn't compile is skipped, a condition that can't
//! be evaluated doesn't fire, a macro pass that errors or times out leaves
//! content as it was. Only `content` is ever rewritten; `role` and `source`
//! pass through untouched.

use crate::rule::{Placement, RegexRule};
use loreloom_core::fragment::TriggerMode;
use loreloom_core::macros::MacroEngine;
use loreloom_core::message::{Message, View};
use loreloom_core::vars::Variables;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// The variable map before and after macro expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableStates {
    pub initial: Variables,
    pub r#final: Variables,
}

/// Result of a postprocessing pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostprocessOutput {
    pub message: Vec<Message>,
    pub variables: VariableStates,
}

/// Run the full three-step pipeline for one view.
pub async fn apply(
    messages: &[Message],
    rules: &[RegexRule],
    view: View,
    variables: &Variables,
    macros: &dyn MacroEngine,
    macro_timeout: Duration,
) -> PostprocessOutput {
    // Depth is a function of list shape, which no step changes.
    let depths = loreloom_assembly::assign_depths(messages);
    let mut working = messages.to_vec();

    let before = triggered_rules(rules, Placement::BeforeMacro, view, messages, variables, macros)
        .await;
    run_regex_pass(&mut working, &depths, &before);

    let mut final_vars = variables.clone();
    // `working` stays intact for the timeout/error branches below.
    match tokio::time::timeout(macro_timeout, macros.expand(working.clone(), variables)).await {
        Ok(Ok(expanded)) => {
            working = expanded.messages;
            final_vars = expanded.variables;
        }
        Ok(Err(e)) => warn!(error = %e, "macro expansion failed, content left as-is"),
        Err(_) => warn!(
            timeout_secs = macro_timeout.as_secs(),
            "macro expansion timed out, content left as-is"
        ),
    }

    let after = triggered_rules(rules, Placement::AfterMacro, view, messages, &final_vars, macros)
        .await;
    run_regex_pass(&mut working, &depths, &after);

    PostprocessOutput {
        message: working,
        variables: VariableStates {
            initial: variables.clone(),
            r#final: final_vars,
        },
    }
}

/// Select the rules for one placement and resolve their triggers, batching
/// condition evaluation with per-item fallback, same as in-chat injection.
async fn triggered_rules<'a>(
    rules: &'a [RegexRule],
    placement: Placement,
    view: View,
    messages: &[Message],
    variables: &Variables,
    macros: &dyn MacroEngine,
) -> Vec<&'a RegexRule> {
    let candidates: Vec<&RegexRule> = rules
        .iter()
        .filter(|r| r.applies_to(placement, view))
        .collect();
    if candidates.is_empty() {
        return candidates;
    }

    let exprs: Vec<String> = candidates
        .iter()
        .filter_map(|r| match r.mode {
            TriggerMode::Conditional => r.condition.clone(),
            TriggerMode::Always => None,
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

    let text: String = messages.iter().fold(String::new(), |mut acc, m| {
        acc.push_str(&m.content);
        acc.push('\n');
        acc
    });

    let mut expr_idx = 0;
    let mut kept = Vec::with_capacity(candidates.len());
    for rule in candidates {
        let fires = match rule.mode {
            TriggerMode::Always => true,
            TriggerMode::Conditional => {
                if let Some(expr) = &rule.condition {
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
                } else if !rule.keys.is_empty() {
                    rule.keys.iter().any(|k| text.contains(k.as_str()))
                } else {
                    false
                }
            }
        };
        if fires {
            kept.push(rule);
        }
    }
    kept
}

/// Apply one placement's rules to every in-scope message.
fn run_regex_pass(messages: &mut [Message], depths: &[usize], rules: &[&RegexRule]) {
    for rule in rules {
        let re = match Regex::new(&rule.find_regex) {
            Ok(re) => re,
            Err(e) => {
                warn!(rule = ?rule.id, error = %e, "malformed find_regex, rule skipped");
                continue;
            }
        };
        let replacement = brace_backrefs(&rule.replace_with);

        for (message, depth) in messages.iter_mut().zip(depths) {
            if !rule.depth_in_window(*depth) || !rule.targets_match(&message.source.kind) {
                continue;
            }
            message.content = re
                .replace_all(&message.content, replacement.as_str())
                .into_owned();
        }
    }
}

/// Rewrite `$N` back-references to the unambiguous `${N}` form so a
/// replacement like `$1st` means "group 1 then `st`", not group `1st`.
fn brace_backrefs(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            // `$$` is a literal dollar; keep it as written.
            Some('$') => {
                out.push('$');
                out.push('$');
                chars.next();
            }
            Some(d) if d.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(*d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str("${");
                out.push_str(&digits);
                out.push('}');
            }
            _ => out.push('$'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use loreloom_core::message::Role;
    use loreloom_macros::TemplateMacroEngine;
    use serde_json::json;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn rule(json: serde_json::Value) -> RegexRule {
        serde_json::from_value(json).unwrap()
    }

    fn history() -> Vec<Message> {
        vec![
            Message::history(Role::User, "hi there", 0),
            Message::history(Role::Assistant, "hello {{name}}", 1),
        ]
    }

    #[test]
    fn backref_translation() {
        assert_eq!(brace_backrefs("$1st place"), "${1}st place");
        assert_eq!(brace_backrefs("a$12b"), "a${12}b");
        assert_eq!(brace_backrefs("$$1"), "$$1");
        assert_eq!(brace_backrefs("no refs"), "no refs");
        assert_eq!(brace_backrefs("trailing $"), "trailing $");
    }

    #[tokio::test]
    async fn empty_rules_still_expand_macros() {
        let engine = TemplateMacroEngine::new();
        let out = apply(
            &history(),
            &[],
            View::UserView,
            &json!({"name": "Ada"}),
            &engine,
            TIMEOUT,
        )
        .await;
        assert_eq!(out.message[1].content, "hello Ada");
        // role/source pass through untouched
        assert_eq!(out.message[0].role, history()[0].role);
        assert_eq!(out.message[0].source, history()[0].source);
        assert_eq!(out.variables.initial, json!({"name": "Ada"}));
    }

    #[tokio::test]
    async fn before_macro_rules_run_before_expansion() {
        let engine = TemplateMacroEngine::new();
        // Rewrites the macro itself before expansion sees it.
        let rules = vec![rule(json!({
            "enabled": true, "placement": "before_macro",
            "find_regex": r"\{\{name\}\}", "replace_with": "{{alias}}"
        }))];
        let out = apply(
            &history(),
            &rules,
            View::UserView,
            &json!({"name": "Ada", "alias": "A."}),
            &engine,
            TIMEOUT,
        )
        .await;
        assert_eq!(out.message[1].content, "hello A.");
    }

    #[tokio::test]
    async fn after_macro_rules_see_expanded_content() {
        let engine = TemplateMacroEngine::new();
        let rules = vec![rule(json!({
            "enabled": true, "placement": "after_macro",
            "find_regex": "Ada", "replace_with": "[redacted]"
        }))];
        let out = apply(
            &history(),
            &rules,
            View::UserView,
            &json!({"name": "Ada"}),
            &engine,
            TIMEOUT,
        )
        .await;
        assert_eq!(out.message[1].content, "hello [redacted]");
    }

    #[tokio::test]
    async fn view_filter_excludes_other_view() {
        let engine = TemplateMacroEngine::new();
        let rules = vec![rule(json!({
            "enabled": true, "placement": "before_macro",
            "find_regex": "hi", "replace_with": "HI",
            "views": ["assistant_view"]
        }))];
        let out = apply(&history(), &rules, View::UserView, &json!({}), &engine, TIMEOUT).await;
        assert_eq!(out.message[0].content, "hi there");
    }

    #[tokio::test]
    async fn depth_window_scopes_rewrites() {
        let engine = TemplateMacroEngine::new();
        // Both history turns are anchors: depths are [2, 1].
        let rules = vec![rule(json!({
            "enabled": true, "placement": "before_macro",
            "find_regex": "h", "replace_with": "H",
            "min_depth": 2
        }))];
        let out = apply(&history(), &rules, View::UserView, &json!({"name": "Ada"}), &engine, TIMEOUT).await;
        assert_eq!(out.message[0].content, "Hi tHere");
        // Depth 1 is below the window: the rule never touches this turn,
        // only macro expansion does.
        assert_eq!(out.message[1].content, "hello Ada");
    }

    #[tokio::test]
    async fn target_filter_scopes_rewrites() {
        let engine = TemplateMacroEngine::new();
        let rules = vec![rule(json!({
            "enabled": true, "placement": "before_macro",
            "find_regex": "h", "replace_with": "H",
            "targets": ["history.user"]
        }))];
        let out = apply(&history(), &rules, View::UserView, &json!({"name": "Ada"}), &engine, TIMEOUT).await;
        assert_eq!(out.message[0].content, "Hi tHere");
        // Assistant provenance is out of scope for the rule; expansion still
        // runs on it.
        assert_eq!(out.message[1].content, "hello Ada");
    }

    #[tokio::test]
    async fn malformed_regex_is_skipped_not_fatal() {
        let engine = TemplateMacroEngine::new();
        let rules = vec![
            rule(json!({
                "enabled": true, "placement": "before_macro",
                "find_regex": "(unclosed", "replace_with": "x"
            })),
            rule(json!({
                "enabled": true, "placement": "before_macro",
                "find_regex": "hi", "replace_with": "yo"
            })),
        ];
        let out = apply(&history(), &rules, View::UserView, &json!({}), &engine, TIMEOUT).await;
        assert_eq!(out.message[0].content, "yo there");
    }

    #[tokio::test]
    async fn backrefs_in_replacement() {
        let engine = TemplateMacroEngine::new();
        let messages = vec![Message::history(Role::User, "call me Ishmael", 0)];
        let rules = vec![rule(json!({
            "enabled": true, "placement": "before_macro",
            "find_regex": "call me (\\w+)", "replace_with": "$1 speaking"
        }))];
        let out = apply(&messages, &rules, View::UserView, &json!({}), &engine, TIMEOUT).await;
        assert_eq!(out.message[0].content, "Ishmael speaking");
    }

    #[tokio::test]
    async fn conditional_rule_gated_by_variables() {
        let engine = TemplateMacroEngine::new();
        let rules = vec![rule(json!({
            "enabled": true, "placement": "before_macro",
            "find_regex": "hi", "replace_with": "HI",
            "mode": "conditional", "condition": "vars.shout == true"
        }))];

        let off = apply(&history(), &rules, View::UserView, &json!({"shout": false}), &engine, TIMEOUT).await;
        assert_eq!(off.message[0].content, "hi there");

        let on = apply(&history(), &rules, View::UserView, &json!({"shout": true}), &engine, TIMEOUT).await;
        assert_eq!(on.message[0].content, "HI there");
    }

    #[tokio::test]
    async fn set_macro_threads_into_final_variables() {
        let engine = TemplateMacroEngine::new();
        let messages = vec![Message::history(Role::User, "{{set::seen::true}}ok", 0)];
        let out = apply(&messages, &[], View::UserView, &json!({}), &engine, TIMEOUT).await;
        assert_eq!(out.message[0].content, "ok");
        assert_eq!(out.variables.initial, json!({}));
        assert_eq!(out.variables.r#final, json!({"seen": true}));
    }

    struct FailingEngine;

    #[async_trait::async_trait]
    impl MacroEngine for FailingEngine {
        async fn expand(
            &self,
            _messages: Vec<Message>,
            _variables: &Variables,
        ) -> Result<loreloom_core::macros::Expanded, loreloom_core::error::MacroError> {
            Err(loreloom_core::error::MacroError::Evaluation("boom".into()))
        }

        async fn eval_condition(
            &self,
            _expr: &str,
            _variables: &Variables,
        ) -> Result<bool, loreloom_core::error::MacroError> {
            Err(loreloom_core::error::MacroError::Evaluation("boom".into()))
        }
    }

    #[tokio::test]
    async fn failed_expansion_keeps_regex_passed_content() {
        let rules = vec![rule(json!({
            "enabled": true, "placement": "before_macro",
            "find_regex": "hi", "replace_with": "yo"
        }))];
        let out = apply(
            &history(),
            &rules,
            View::UserView,
            &json!({"name": "Ada"}),
            &FailingEngine,
            TIMEOUT,
        )
        .await;
        // The before_macro rewrite survives; the macro stays unexpanded.
        assert_eq!(out.message[0].content, "yo there");
        assert_eq!(out.message[1].content, "hello {{name}}");
        assert_eq!(out.variables.r#final, json!({"name": "Ada"}));
    }

    #[tokio::test]
    async fn second_pass_with_idempotent_rules_is_stable() {
        let engine = TemplateMacroEngine::new();
        let rules = vec![rule(json!({
            "enabled": true, "placement": "after_macro",
            "find_regex": r"\bhi\b", "replace_with": "hey"
        }))];
        let vars = json!({"name": "Ada"});
        let first = apply(&history(), &rules, View::UserView, &vars, &engine, TIMEOUT).await;
        let second = apply(
            &first.message,
            &rules,
            View::UserView,
            &first.variables.r#final,
            &engine,
            TIMEOUT,
        )
        .await;
        assert_eq!(first.message[0].content, "hey there");
        assert_eq!(second.message, first.message);
        assert_eq!(second.variables.r#final, first.variables.r#final);
    }
}
