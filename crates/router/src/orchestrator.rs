//! The request orchestrator.
//!
//! One `route` call drives the whole pipeline top to bottom as a single
//! async flow: flatten, hook, inject, assemble, hook, postprocess, hook,
//! save variables, shape output. Hook callbacks are awaited strictly in
//! sequence; there is no parallel fan-out at a checkpoint.

use crate::assets;
use crate::dto::{OutputMode, RouteRequest, RouteResponse};
use loreloom_assembly::AssemblyInputs;
use loreloom_core::error::{Error, LlmError, Result};
use loreloom_core::fragment::{Character, Persona, PromptFragment, WorldBookEntry};
use loreloom_core::llm::{ChatOutcome, ChatParams, LlmClient, StreamChunk};
use loreloom_core::macros::MacroEngine;
use loreloom_core::message::{Message, Role, View};
use loreloom_core::store::{AssetKind, AssetStore, ConversationStore, ScanEntry};
use loreloom_core::vars::Variables;
use loreloom_delta::{DeltaCache, DeltaKey, diff_messages, diff_variables, snapshot};
use loreloom_hooks::{Checkpoint, HookCallback, HookContext, HookManager, LlmCall};
use loreloom_postprocess::RegexRule;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

struct LoadedAssets {
    fragments: Vec<PromptFragment>,
    world_book: Vec<WorldBookEntry>,
    character: Option<Character>,
    persona: Option<Persona>,
    rules: Vec<RegexRule>,
}

pub struct RouteOrchestrator {
    id: String,
    conversations: Arc<dyn ConversationStore>,
    assets: Arc<dyn AssetStore>,
    macros: Arc<dyn MacroEngine>,
    hooks: RwLock<HookManager>,
    cache: Arc<DeltaCache>,
    llm: Option<Arc<dyn LlmClient>>,
    macro_timeout: Duration,
    default_view: View,
}

impl RouteOrchestrator {
    pub fn new(
        id: impl Into<String>,
        conversations: Arc<dyn ConversationStore>,
        assets: Arc<dyn AssetStore>,
        macros: Arc<dyn MacroEngine>,
    ) -> Self {
        Self {
            id: id.into(),
            conversations,
            assets,
            macros,
            hooks: RwLock::new(HookManager::new()),
            cache: Arc::new(DeltaCache::default()),
            llm: None,
            macro_timeout: Duration::from_secs(5),
            default_view: View::AssistantView,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_cache(mut self, cache: Arc<DeltaCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_macro_timeout(mut self, timeout: Duration) -> Self {
        self.macro_timeout = timeout;
        self
    }

    pub fn with_default_view(mut self, view: View) -> Self {
        self.default_view = view;
        self
    }

    pub async fn register_hooks(
        &self,
        strategy_id: impl Into<String>,
        hooks: HashMap<Checkpoint, Arc<dyn HookCallback>>,
        order: i64,
    ) {
        self.hooks
            .write()
            .await
            .register_strategy(strategy_id, hooks, order);
    }

    pub async fn unregister_hooks(&self, strategy_id: &str) -> bool {
        self.hooks.write().await.unregister(strategy_id)
    }

    /// List assets of one kind. Unreadable files degrade per entry.
    pub async fn scan_assets(&self, kind: AssetKind) -> Vec<ScanEntry> {
        self.assets.scan(kind).await
    }

    async fn load_assets(&self, request: &RouteRequest) -> Result<LoadedAssets> {
        let fragments = match &request.preset {
            Some(path) => {
                assets::fragments_from(self.assets.read(AssetKind::Preset, path).await?)?
            }
            None => Vec::new(),
        };
        let world_book = match &request.world_book {
            Some(path) => {
                assets::entries_from(self.assets.read(AssetKind::WorldBook, path).await?)?
            }
            None => Vec::new(),
        };
        let character = match &request.character {
            Some(path) => Some(assets::character_from(
                self.assets.read(AssetKind::Character, path).await?,
            )?),
            None => None,
        };
        let persona = match &request.persona {
            Some(path) => Some(assets::persona_from(
                self.assets.read(AssetKind::Persona, path).await?,
            )?),
            None => None,
        };
        let rules = match &request.regex_rules {
            Some(path) => {
                assets::rules_from(self.assets.read(AssetKind::RegexRules, path).await?)?
            }
            None => Vec::new(),
        };
        Ok(LoadedAssets {
            fragments,
            world_book,
            character,
            persona,
            rules,
        })
    }

    fn context(&self, file: &str, view: View) -> HookContext {
        HookContext {
            router_id: self.id.clone(),
            conversation_file: file.to_string(),
            view: Some(view),
        }
    }

    /// Run the full pipeline for one request.
    pub async fn route(&self, request: RouteRequest) -> Result<RouteResponse> {
        let view = request.view.unwrap_or(self.default_view);
        let ctx = self.context(&request.file, view);
        debug!(file = %request.file, view = %view, output = ?request.output, "routing");

        let flat = self.conversations.flatten(&request.file).await?;
        let variables = self.conversations.load_variables(&request.file).await?;
        let loaded = self.load_assets(&request).await?;
        let hooks = self.hooks.read().await;

        let history = hooks
            .run_messages(Checkpoint::BeforeRaw, flat.messages, &ctx)
            .await;

        let injected = loreloom_assembly::inject(
            &history,
            &loaded.fragments,
            &loaded.world_book,
            &variables,
            self.macros.as_ref(),
        )
        .await;
        let injected = hooks
            .run_messages(Checkpoint::AfterInsert, injected, &ctx)
            .await;

        let inputs = AssemblyInputs {
            world_book: &loaded.world_book,
            character: loaded.character.as_ref(),
            persona: loaded.persona.as_ref(),
        };
        let assembled = loreloom_assembly::assemble(&injected, &loaded.fragments, &inputs);
        let assembled = hooks
            .run_messages(Checkpoint::AfterRaw, assembled, &ctx)
            .await;

        let (before_pp, after_pp) = match view {
            View::UserView => (
                Checkpoint::BeforePostprocessUser,
                Checkpoint::AfterPostprocessUser,
            ),
            View::AssistantView => (
                Checkpoint::BeforePostprocessAssistant,
                Checkpoint::AfterPostprocessAssistant,
            ),
        };
        let assembled = hooks.run_messages(before_pp, assembled, &ctx).await;
        let processed = loreloom_postprocess::apply(
            &assembled,
            &loaded.rules,
            view,
            &variables,
            self.macros.as_ref(),
            self.macro_timeout,
        )
        .await;
        let messages = hooks.run_messages(after_pp, processed.message, &ctx).await;

        let final_vars = hooks
            .run_variables(
                Checkpoint::BeforeVariablesSave,
                processed.variables.r#final,
                &ctx,
            )
            .await;
        self.conversations
            .save_variables(&request.file, &final_vars)
            .await?;
        let final_vars = hooks
            .run_variables(Checkpoint::AfterVariablesSave, final_vars, &ctx)
            .await;

        Ok(self.shape_output(&request, view, messages, final_vars))
    }

    fn shape_output(
        &self,
        request: &RouteRequest,
        view: View,
        messages: Vec<Message>,
        variables: Variables,
    ) -> RouteResponse {
        match request.output {
            OutputMode::Full => RouteResponse::full(messages, variables),
            OutputMode::History => {
                let history: Vec<Message> = messages
                    .into_iter()
                    .filter(|m| m.source.kind.is_history())
                    .collect();
                RouteResponse::full(history, variables)
            }
            OutputMode::Delta => {
                let key = DeltaKey {
                    file: request.file.clone(),
                    view: view.as_str().to_string(),
                    router_id: self.id.clone(),
                };
                // Client fingerprints are the baseline when supplied; the
                // server cache is only a fallback.
                let baseline = request
                    .fingerprints
                    .clone()
                    .or_else(|| self.cache.get(&key))
                    .unwrap_or_default();

                let message_delta = diff_messages(&messages, &baseline.messages);
                let variable_delta = diff_variables(
                    &variables,
                    &baseline.variables,
                    request.variables_hash.as_deref(),
                );

                let fresh = snapshot(&messages, &variables);
                self.cache.put(key, fresh.clone());
                RouteResponse::delta(message_delta, variable_delta, fresh)
            }
        }
    }

    fn llm(&self) -> Result<&Arc<dyn LlmClient>> {
        self.llm.as_ref().ok_or_else(|| {
            Error::Llm(LlmError::NotConfigured(
                "no LLM client attached to this orchestrator".into(),
            ))
        })
    }

    async fn assemble_for_llm(&self, request: RouteRequest) -> Result<(String, Vec<Message>)> {
        let mut request = request;
        request.view = Some(View::AssistantView);
        request.output = OutputMode::Full;
        let file = request.file.clone();

        let response = self.route(request).await?;
        let messages: Vec<Message> = response
            .messages
            .unwrap_or_default()
            .into_iter()
            // Thinking turns never reach the provider.
            .filter(|m| m.role != Role::Thinking)
            .collect();
        Ok((file, messages))
    }

    async fn save_response(
        &self,
        file: &str,
        outcome: ChatOutcome,
        ctx: &HookContext,
    ) -> Result<ChatOutcome> {
        let hooks = self.hooks.read().await;
        let outcome = hooks
            .run_response(Checkpoint::BeforeSaveResponse, outcome, ctx)
            .await;
        self.conversations
            .append(
                file,
                Message::history(Role::Assistant, outcome.content.clone(), 0),
            )
            .await?;
        let outcome = hooks
            .run_response(Checkpoint::AfterSaveResponse, outcome, ctx)
            .await;
        Ok(outcome)
    }

    /// Assemble, dispatch to the LLM, and persist the reply.
    pub async fn chat(&self, request: RouteRequest, params: ChatParams) -> Result<ChatOutcome> {
        let llm = self.llm()?.clone();
        let (file, messages) = self.assemble_for_llm(request).await?;
        let ctx = self.context(&file, View::AssistantView);

        let call = {
            let hooks = self.hooks.read().await;
            hooks
                .run_llm_call(
                    Checkpoint::BeforeLlmCall,
                    LlmCall { messages, params },
                    &ctx,
                )
                .await
        };

        info!(file = %file, model = %call.params.model, "dispatching chat");
        let outcome = llm
            .chat(&call.messages, &call.params)
            .await
            .map_err(Error::Llm)?;

        let outcome = {
            let hooks = self.hooks.read().await;
            hooks
                .run_response(Checkpoint::AfterLlmCall, outcome, &ctx)
                .await
        };
        self.save_response(&file, outcome, &ctx).await
    }

    /// Streaming variant. Chunks pass through the stream-chunk hooks and are
    /// forwarded on `tx`; the accumulated reply is persisted and returned.
    pub async fn chat_stream(
        &self,
        request: RouteRequest,
        params: ChatParams,
        tx: mpsc::Sender<StreamChunk>,
    ) -> Result<ChatOutcome> {
        let llm = self.llm()?.clone();
        let (file, messages) = self.assemble_for_llm(request).await?;
        let ctx = self.context(&file, View::AssistantView);

        let call = {
            let hooks = self.hooks.read().await;
            hooks
                .run_llm_call(
                    Checkpoint::BeforeLlmCall,
                    LlmCall { messages, params },
                    &ctx,
                )
                .await
        };

        info!(file = %file, model = %call.params.model, "dispatching streamed chat");
        let mut rx = llm
            .chat_stream(&call.messages, &call.params)
            .await
            .map_err(Error::Llm)?;

        let mut content = String::new();
        while let Some(chunk) = rx.recv().await {
            let chunk = {
                let hooks = self.hooks.read().await;
                let chunk = hooks
                    .run_chunk(Checkpoint::BeforeStreamChunk, chunk, &ctx)
                    .await;
                hooks
                    .run_chunk(Checkpoint::AfterStreamChunk, chunk, &ctx)
                    .await
            };
            content.push_str(&chunk.delta);
            let done = chunk.done;
            if tx.send(chunk).await.is_err() {
                // Receiver gone; keep draining so the reply still gets saved.
                warn!(file = %file, "stream receiver dropped, continuing to accumulate");
            }
            if done {
                break;
            }
        }

        let outcome = {
            let hooks = self.hooks.read().await;
            hooks
                .run_response(
                    Checkpoint::AfterLlmCall,
                    ChatOutcome {
                        content,
                        usage: Default::default(),
                        finish_reason: "stop".into(),
                    },
                    &ctx,
                )
                .await
        };
        self.save_response(&file, outcome, &ctx).await
    }
}
