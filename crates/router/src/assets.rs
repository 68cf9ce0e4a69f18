//! Asset document parsing.
//!
//! Asset files tolerate two shapes: a bare array of items, or an object
//! wrapping the array under a conventional key (`prompts`, `entries`,
//! `rules`). Characters and personas are single objects.

use loreloom_core::error::{Error, Result};
use loreloom_core::fragment::{Character, Persona, PromptFragment, WorldBookEntry};
use loreloom_postprocess::RegexRule;
use serde::de::DeserializeOwned;
use serde_json::Value;

fn items_from<T: DeserializeOwned>(value: Value, wrapper_key: &str) -> Result<Vec<T>> {
    let array = match value {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut map) => map.remove(wrapper_key).unwrap_or(Value::Array(Vec::new())),
        _ => Value::Array(Vec::new()),
    };
    serde_json::from_value(array).map_err(Error::Serialization)
}

pub fn fragments_from(value: Value) -> Result<Vec<PromptFragment>> {
    items_from(value, "prompts")
}

pub fn entries_from(value: Value) -> Result<Vec<WorldBookEntry>> {
    items_from(value, "entries")
}

pub fn rules_from(value: Value) -> Result<Vec<RegexRule>> {
    items_from(value, "rules")
}

pub fn character_from(value: Value) -> Result<Character> {
    serde_json::from_value(value).map_err(Error::Serialization)
}

pub fn persona_from(value: Value) -> Result<Persona> {
    serde_json::from_value(value).map_err(Error::Serialization)
}
