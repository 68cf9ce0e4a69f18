//! The in-process macro engine.
//!
//! Expands `{{...}}` macros in message content against the variable
//! document and evaluates condition expressions through the DSL parser.
//! Unknown macros expand to the empty string; expansion itself never fails.

use crate::parser::{self, EvalContext};
use async_trait::async_trait;
use loreloom_core::error::MacroError;
use loreloom_core::macros::{Expanded, MacroEngine};
use loreloom_core::message::Message;
use loreloom_core::vars::{self, Variables};
use serde_json::Value;
use tracing::debug;

/// Built-in `MacroEngine` over the variable document.
#[derive(Debug, Default)]
pub struct TemplateMacroEngine;

impl TemplateMacroEngine {
    pub fn new() -> Self {
        Self
    }

    fn expand_content(content: &str, variables: &mut Variables) -> String {
        let mut out = String::with_capacity(content.len());
        let mut rest = content;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    out.push_str(&Self::expand_macro(after[..end].trim(), variables));
                    rest = &after[end + 2..];
                }
                None => {
                    // Unterminated macro: emit verbatim.
                    out.push_str(&rest[start..]);
                    return out;
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn expand_macro(inner: &str, variables: &mut Variables) -> String {
        if let Some(rest) = inner.strip_prefix("set::") {
            let (path, raw) = match rest.split_once("::") {
                Some(pair) => pair,
                None => (rest, ""),
            };
            let value = serde_json::from_str::<Value>(raw)
                .unwrap_or_else(|_| Value::String(raw.to_string()));
            match vars::parse_path(path.trim()) {
                Ok(segments) => {
                    if !vars::set_path(variables, &segments, value) {
                        debug!(path = %path, "set macro did not apply");
                    }
                }
                Err(e) => debug!(path = %path, error = %e, "set macro path invalid"),
            }
            String::new()
        } else if let Some(path) = inner.strip_prefix("get::") {
            Self::lookup(path.trim(), variables)
        } else {
            Self::lookup(inner, variables)
        }
    }

    fn lookup(path: &str, variables: &Variables) -> String {
        let Ok(segments) = vars::parse_path(path) else {
            return String::new();
        };
        match vars::get_path(variables, &segments) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

#[async_trait]
impl MacroEngine for TemplateMacroEngine {
    async fn expand(
        &self,
        messages: Vec<Message>,
        variables: &Variables,
    ) -> Result<Expanded, MacroError> {
        let mut working = variables.clone();
        let messages = messages
            .into_iter()
            .map(|mut m| {
                if m.content.contains("{{") {
                    m.content = Self::expand_content(&m.content, &mut working);
                }
                m
            })
            .collect();
        Ok(Expanded {
            messages,
            variables: working,
        })
    }

    async fn eval_condition(&self, expr: &str, variables: &Variables) -> Result<bool, MacroError> {
        let cond = parser::parse_condition(expr).map_err(MacroError::Parse)?;
        Ok(cond.evaluate(&EvalContext {
            variables,
            history: None,
        }))
    }

    async fn eval_batch(
        &self,
        exprs: &[String],
        variables: &Variables,
    ) -> Result<Vec<bool>, MacroError> {
        // Parse everything up front: one bad expression fails the batch, and
        // callers drop to per-item evaluation where only the bad expression
        // ends up untriggered.
        let mut compiled = Vec::with_capacity(exprs.len());
        for expr in exprs {
            compiled.push(parser::parse_condition(expr).map_err(MacroError::Parse)?);
        }
        let ctx = EvalContext {
            variables,
            history: None,
        };
        Ok(compiled.iter().map(|c| c.evaluate(&ctx)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loreloom_core::message::Role;
    use serde_json::json;

    fn msg(content: &str) -> Message {
        Message::history(Role::User, content, 0)
    }

    #[tokio::test]
    async fn expands_bare_variable() {
        let engine = TemplateMacroEngine::new();
        let out = engine
            .expand(vec![msg("Hello {{user.name}}!")], &json!({"user": {"name": "Ada"}}))
            .await
            .unwrap();
        assert_eq!(out.messages[0].content, "Hello Ada!");
    }

    #[tokio::test]
    async fn get_and_set_thread_variables_forward() {
        let engine = TemplateMacroEngine::new();
        let out = engine
            .expand(
                vec![msg("{{set::count::3}}go"), msg("count={{get::count}}")],
                &json!({}),
            )
            .await
            .unwrap();
        assert_eq!(out.messages[0].content, "go");
        assert_eq!(out.messages[1].content, "count=3");
        assert_eq!(out.variables, json!({"count": 3}));
    }

    #[tokio::test]
    async fn unknown_macro_expands_empty() {
        let engine = TemplateMacroEngine::new();
        let out = engine
            .expand(vec![msg("a{{missing.var}}b")], &json!({}))
            .await
            .unwrap();
        assert_eq!(out.messages[0].content, "ab");
    }

    #[tokio::test]
    async fn unterminated_macro_left_verbatim() {
        let engine = TemplateMacroEngine::new();
        let out = engine.expand(vec![msg("a{{oops")], &json!({})).await.unwrap();
        assert_eq!(out.messages[0].content, "a{{oops");
    }

    #[tokio::test]
    async fn roles_and_sources_untouched() {
        let engine = TemplateMacroEngine::new();
        let input = msg("{{x}}");
        let out = engine
            .expand(vec![input.clone()], &json!({"x": "y"}))
            .await
            .unwrap();
        assert_eq!(out.messages[0].role, input.role);
        assert_eq!(out.messages[0].source, input.source);
    }

    #[tokio::test]
    async fn batch_fails_on_any_parse_error() {
        let engine = TemplateMacroEngine::new();
        let exprs = vec!["vars.a == 1".to_string(), "BAD OP".to_string()];
        assert!(engine.eval_batch(&exprs, &json!({"a": 1})).await.is_err());

        // Per-item fallback still resolves the good one.
        assert!(
            engine
                .eval_condition("vars.a == 1", &json!({"a": 1}))
                .await
                .unwrap()
        );
        assert!(engine.eval_condition("BAD OP", &json!({})).await.is_err());
    }

    #[tokio::test]
    async fn set_with_string_value() {
        let engine = TemplateMacroEngine::new();
        let out = engine
            .expand(vec![msg("{{set::mood::tense}}")], &json!({}))
            .await
            .unwrap();
        assert_eq!(out.variables, json!({"mood": "tense"}));
    }
}
