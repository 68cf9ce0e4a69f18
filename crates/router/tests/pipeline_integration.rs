//! End-to-end pipeline tests: conversation flattening through assembly,
//! postprocessing, hook checkpoints, variable persistence, and delta output.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use loreloom_core::error::LlmError;
use loreloom_core::llm::{ChatOutcome, ChatParams, LlmClient, StreamChunk, Usage};
use loreloom_core::message::{Message, Role, View};
use loreloom_core::store::AssetKind;
use loreloom_hooks::{Checkpoint, HookCallback, HookContext, HookData, HookError};
use loreloom_macros::TemplateMacroEngine;
use loreloom_router::{OutputMode, RouteOrchestrator, RouteRequest};
use loreloom_store::{ConversationNode, ConversationTree, InMemoryStore};
use serde_json::json;
use tokio::sync::mpsc;

// ── Fixtures ─────────────────────────────────────────────────────────────

async fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    let mut tree = ConversationTree::default();
    tree.append(ConversationNode::new("user", "hi"));
    tree.append(ConversationNode::new("assistant", "hello"));
    tree.variables = json!({"mood": "calm"});
    store.insert_conversation("story.json", tree).await;

    store
        .insert_asset(
            AssetKind::Preset,
            "main.json",
            json!({"prompts": [
                {"id": "frame", "position": "relative", "enabled": true,
                 "identifier": "chatHistory"},
                {"id": "note", "position": "in-chat", "content": "[GUIDE]",
                 "depth": 1, "order": 50, "role": "system"}
            ]}),
        )
        .await;
    store
        .insert_asset(
            AssetKind::RegexRules,
            "rules.json",
            json!({"rules": [
                {"id": "loud", "enabled": true, "placement": "after_macro",
                 "find_regex": "hello", "replace_with": "HELLO",
                 "views": ["assistant_view"]}
            ]}),
        )
        .await;
    store
}

fn orchestrator(store: Arc<InMemoryStore>) -> RouteOrchestrator {
    RouteOrchestrator::new(
        "test-router",
        store.clone(),
        store,
        Arc::new(TemplateMacroEngine::new()),
    )
}

fn request() -> RouteRequest {
    let mut req = RouteRequest::new("story.json");
    req.preset = Some("main.json".into());
    req.regex_rules = Some("rules.json".into());
    req
}

// ── Full output ──────────────────────────────────────────────────────────

#[tokio::test]
async fn full_route_injects_and_postprocesses() {
    let store = seeded_store().await;
    let orch = orchestrator(store);

    let resp = orch.route(request()).await.unwrap();
    assert!(resp.success);
    let messages = resp.messages.unwrap();

    // Depth-1 injection lands between the two history turns.
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["hi", "[GUIDE]", "HELLO"]);
    assert_eq!(messages[1].role, Role::System);
}

#[tokio::test]
async fn user_view_skips_assistant_only_rules() {
    let store = seeded_store().await;
    let orch = orchestrator(store);

    let mut req = request();
    req.view = Some(View::UserView);
    let resp = orch.route(req).await.unwrap();
    let messages = resp.messages.unwrap();
    assert!(messages.iter().any(|m| m.content == "hello"));
}

#[tokio::test]
async fn history_output_drops_injected_messages() {
    let store = seeded_store().await;
    let orch = orchestrator(store);

    let mut req = request();
    req.output = OutputMode::History;
    let resp = orch.route(req).await.unwrap();
    let messages = resp.messages.unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.source.kind.is_history()));
}

#[tokio::test]
async fn missing_conversation_is_an_error() {
    let store = seeded_store().await;
    let orch = orchestrator(store);

    let err = orch.route(RouteRequest::new("nope.json")).await.unwrap_err();
    let body = err.to_body();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "store_error");
}

// ── Delta output ─────────────────────────────────────────────────────────

#[tokio::test]
async fn second_delta_call_with_returned_fingerprints_is_all_unchanged() {
    let store = seeded_store().await;
    let orch = orchestrator(store);

    let mut req = request();
    req.output = OutputMode::Delta;
    let first = orch.route(req.clone()).await.unwrap();
    assert!(first.total.unwrap() > 0);

    let mut second_req = req;
    second_req.fingerprints = first.fingerprints.clone();
    second_req.variables_hash = first
        .fingerprints
        .map(|f| f.variables_hash);
    let second = orch.route(second_req).await.unwrap();

    assert_eq!(second.changed.unwrap(), vec![]);
    assert_eq!(second.unchanged.unwrap(), second.total.unwrap());
    assert!(second.messages_deleted.unwrap().is_empty());
    assert_eq!(second.variables_noop, Some(true));
}

#[tokio::test]
async fn deleting_a_message_shows_in_messages_deleted() {
    let store = seeded_store().await;
    let orch = orchestrator(store.clone());

    let mut req = request();
    req.output = OutputMode::Delta;
    let first = orch.route(req.clone()).await.unwrap();
    let first_total = first.total.unwrap();

    // Replace the conversation with a shorter one.
    let mut shorter = ConversationTree::default();
    shorter.append(ConversationNode::new("user", "hi"));
    shorter.variables = json!({"mood": "calm"});
    store.insert_conversation("story.json", shorter).await;

    let mut second_req = req;
    second_req.fingerprints = first.fingerprints;
    let second = orch.route(second_req).await.unwrap();

    assert!(second.total.unwrap() < first_total);
    assert_eq!(second.messages_deleted.unwrap(), vec!["history_1"]);
}

#[tokio::test]
async fn server_cache_is_the_fallback_baseline() {
    let store = seeded_store().await;
    let orch = orchestrator(store);

    let mut req = request();
    req.output = OutputMode::Delta;
    // First call: empty baseline, everything changed.
    let first = orch.route(req.clone()).await.unwrap();
    assert_eq!(first.unchanged, Some(0));

    // Second call without client fingerprints: cache makes it unchanged.
    let second = orch.route(req).await.unwrap();
    assert_eq!(second.changed.unwrap(), vec![]);
    assert_eq!(second.unchanged.unwrap(), second.total.unwrap());
}

// ── Hooks ────────────────────────────────────────────────────────────────

struct Prepender(&'static str);

#[async_trait]
impl HookCallback for Prepender {
    async fn call(
        &self,
        _point: Checkpoint,
        data: &HookData,
        _ctx: &HookContext,
    ) -> Result<Option<HookData>, HookError> {
        let HookData::Messages(messages) = data else {
            return Ok(None);
        };
        let mut next = messages.clone();
        next.insert(0, Message::history(Role::System, self.0, 0));
        Ok(Some(HookData::Messages(next)))
    }
}

struct VariableStamp;

#[async_trait]
impl HookCallback for VariableStamp {
    async fn call(
        &self,
        _point: Checkpoint,
        _data: &HookData,
        _ctx: &HookContext,
    ) -> Result<Option<HookData>, HookError> {
        Ok(Some(HookData::Variables(json!({"stamped": true}))))
    }
}

fn single(
    point: Checkpoint,
    cb: Arc<dyn HookCallback>,
) -> HashMap<Checkpoint, Arc<dyn HookCallback>> {
    let mut map: HashMap<Checkpoint, Arc<dyn HookCallback>> = HashMap::new();
    map.insert(point, cb);
    map
}

#[tokio::test]
async fn before_raw_hook_shapes_the_history() {
    let store = seeded_store().await;
    let orch = orchestrator(store);
    orch.register_hooks(
        "prep",
        single(Checkpoint::BeforeRaw, Arc::new(Prepender("[HOOKED]"))),
        0,
    )
    .await;

    let resp = orch.route(request()).await.unwrap();
    let messages = resp.messages.unwrap();
    assert_eq!(messages[0].content, "[HOOKED]");
}

#[tokio::test]
async fn variables_save_hook_merges_into_persisted_document() {
    let store = seeded_store().await;
    let orch = orchestrator(store.clone());
    orch.register_hooks(
        "stamp",
        single(Checkpoint::BeforeVariablesSave, Arc::new(VariableStamp)),
        0,
    )
    .await;

    let resp = orch.route(request()).await.unwrap();
    let variables = resp.variables.unwrap();
    assert_eq!(variables["stamped"], true);
    // Shallow merge keeps pre-existing keys.
    assert_eq!(variables["mood"], "calm");

    use loreloom_core::store::ConversationStore;
    let saved = store.load_variables("story.json").await.unwrap();
    assert_eq!(saved["stamped"], true);
}

#[tokio::test]
async fn unregistered_hooks_stop_firing() {
    let store = seeded_store().await;
    let orch = orchestrator(store);
    orch.register_hooks(
        "prep",
        single(Checkpoint::BeforeRaw, Arc::new(Prepender("[HOOKED]"))),
        0,
    )
    .await;
    assert!(orch.unregister_hooks("prep").await);

    let resp = orch.route(request()).await.unwrap();
    let messages = resp.messages.unwrap();
    assert_ne!(messages[0].content, "[HOOKED]");
}

// ── LLM dispatch ─────────────────────────────────────────────────────────

struct ScriptedLlm {
    reply: String,
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(
        &self,
        _messages: &[Message],
        _params: &ChatParams,
    ) -> Result<ChatOutcome, LlmError> {
        Ok(ChatOutcome {
            content: self.reply.clone(),
            usage: Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
            },
            finish_reason: "stop".into(),
        })
    }

    async fn chat_stream(
        &self,
        _messages: &[Message],
        _params: &ChatParams,
    ) -> Result<mpsc::Receiver<StreamChunk>, LlmError> {
        let (tx, rx) = mpsc::channel(8);
        let reply = self.reply.clone();
        tokio::spawn(async move {
            for word in reply.split_inclusive(' ') {
                let _ = tx
                    .send(StreamChunk {
                        delta: word.to_string(),
                        done: false,
                    })
                    .await;
            }
            let _ = tx
                .send(StreamChunk {
                    delta: String::new(),
                    done: true,
                })
                .await;
        });
        Ok(rx)
    }
}

#[tokio::test]
async fn chat_dispatches_and_persists_the_reply() {
    let store = seeded_store().await;
    let orch = orchestrator(store.clone()).with_llm(Arc::new(ScriptedLlm {
        reply: "once upon a time".into(),
    }));

    let outcome = orch
        .chat(request(), ChatParams::default())
        .await
        .unwrap();
    assert_eq!(outcome.content, "once upon a time");

    use loreloom_core::store::ConversationStore;
    let flat = store.flatten("story.json").await.unwrap();
    assert_eq!(flat.messages.last().unwrap().content, "once upon a time");
    assert_eq!(flat.messages.last().unwrap().role, Role::Assistant);
}

#[tokio::test]
async fn chat_without_llm_is_not_configured() {
    let store = seeded_store().await;
    let orch = orchestrator(store);
    let err = orch
        .chat(request(), ChatParams::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_body()["error"], "llm_error");
}

#[tokio::test]
async fn chat_stream_forwards_chunks_and_persists() {
    let store = seeded_store().await;
    let orch = orchestrator(store.clone()).with_llm(Arc::new(ScriptedLlm {
        reply: "streamed words here".into(),
    }));

    let (tx, mut rx) = mpsc::channel(32);
    let outcome = orch
        .chat_stream(request(), ChatParams::default(), tx)
        .await
        .unwrap();
    assert_eq!(outcome.content, "streamed words here");

    let mut forwarded = String::new();
    while let Ok(chunk) = rx.try_recv() {
        forwarded.push_str(&chunk.delta);
    }
    assert_eq!(forwarded, "streamed words here");

    use loreloom_core::store::ConversationStore;
    let flat = store.flatten("story.json").await.unwrap();
    assert_eq!(flat.messages.last().unwrap().content, "streamed words here");
}
