//! Request and response shapes for the route entry point.

use loreloom_core::message::{Message, View};
use loreloom_core::vars::Variables;
use loreloom_delta::{ChangedMessage, Fingerprints, MessageDelta, VariableDelta};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// How much of the pipeline's result the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// The full assembled, postprocessed message list plus variables.
    #[default]
    Full,
    /// Only the history-provenance messages.
    History,
    /// Fingerprint diff against what the client already holds.
    Delta,
}

/// One pipeline request.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteRequest {
    /// Conversation file name.
    pub file: String,

    /// Rendering view; falls back to the orchestrator's default.
    #[serde(default)]
    pub view: Option<View>,

    #[serde(default)]
    pub output: OutputMode,

    /// Asset file names. Missing means that layer is absent, not an error.
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub world_book: Option<String>,
    #[serde(default)]
    pub regex_rules: Option<String>,

    /// Client-held fingerprints for delta mode. When present they are the
    /// diff baseline, taking precedence over the server cache.
    #[serde(default)]
    pub fingerprints: Option<Fingerprints>,

    /// Client's whole-document variables hash (delta fast path).
    #[serde(default)]
    pub variables_hash: Option<String>,
}

impl RouteRequest {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            view: None,
            output: OutputMode::Full,
            preset: None,
            character: None,
            persona: None,
            world_book: None,
            regex_rules: None,
            fingerprints: None,
            variables_hash: None,
        }
    }
}

/// The structured response. Absent fields are omitted from the JSON body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Variables>,

    // delta mode: messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed: Option<Vec<ChangedMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unchanged: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages_deleted: Option<Vec<String>>,

    // delta mode: variables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables_changed: Option<BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables_deleted: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables_unchanged: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables_noop: Option<bool>,

    /// Fingerprint snapshot the client should hold for its next delta call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprints: Option<Fingerprints>,
}

impl RouteResponse {
    pub fn full(messages: Vec<Message>, variables: Variables) -> Self {
        Self {
            success: true,
            messages: Some(messages),
            variables: Some(variables),
            ..Self::default()
        }
    }

    pub fn delta(
        messages: MessageDelta,
        variables: VariableDelta,
        fingerprints: Fingerprints,
    ) -> Self {
        Self {
            success: true,
            changed: Some(messages.changed),
            unchanged: Some(messages.unchanged),
            total: Some(messages.total),
            messages_deleted: Some(messages.messages_deleted),
            variables_changed: Some(variables.variables_changed),
            variables_deleted: Some(variables.variables_deleted),
            variables_unchanged: Some(variables.variables_unchanged),
            variables_noop: Some(variables.variables_noop),
            fingerprints: Some(fingerprints),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults() {
        let req: RouteRequest = serde_json::from_str(r#"{"file": "c.json"}"#).unwrap();
        assert_eq!(req.output, OutputMode::Full);
        assert!(req.view.is_none());
        assert!(req.fingerprints.is_none());
    }

    #[test]
    fn output_mode_wire_names() {
        let req: RouteRequest =
            serde_json::from_str(r#"{"file": "c.json", "output": "delta"}"#).unwrap();
        assert_eq!(req.output, OutputMode::Delta);
    }

    #[test]
    fn full_response_omits_delta_fields() {
        let resp = RouteResponse::full(vec![], serde_json::json!({}));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("changed").is_none());
        assert!(json.get("variables_noop").is_none());
    }
}
