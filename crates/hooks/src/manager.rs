//! Strategy registration and checkpoint execution.
//!
//! Strategies run strictly in sequence at each checkpoint, sorted by
//! `(order descending, id ascending, registration sequence ascending)`.
//! A failing callback is logged and skipped; it never aborts the remaining
//! strategies or the request.

use crate::data::{Checkpoint, HookData};
use async_trait::async_trait;
use loreloom_core::message::View;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Request-scoped context handed to every callback.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub router_id: String,
    pub conversation_file: String,
    pub view: Option<View>,
}

/// A hook callback. Return `Ok(None)` to observe without contributing,
/// `Ok(Some(data))` to merge a contribution into the running value.
#[async_trait]
pub trait HookCallback: Send + Sync {
    async fn call(
        &self,
        point: Checkpoint,
        data: &HookData,
        ctx: &HookContext,
    ) -> Result<Option<HookData>, HookError>;
}

struct Strategy {
    id: String,
    order: i64,
    seq: u64,
    hooks: HashMap<Checkpoint, Arc<dyn HookCallback>>,
}

/// The ordered hook registry.
#[derive(Default)]
pub struct HookManager {
    strategies: Vec<Strategy>,
    next_seq: u64,
}

impl HookManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a strategy. Re-registering an id drops the old
    /// strategy entirely and assigns a fresh registration sequence.
    pub fn register_strategy(
        &mut self,
        id: impl Into<String>,
        hooks: HashMap<Checkpoint, Arc<dyn HookCallback>>,
        order: i64,
    ) {
        let id = id.into();
        if self.strategies.iter().any(|s| s.id == id) {
            debug!(strategy = %id, "replacing existing hook strategy");
            self.strategies.retain(|s| s.id != id);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.strategies.push(Strategy {
            id,
            order,
            seq,
            hooks,
        });
    }

    /// Remove a strategy from every checkpoint at once.
    pub fn unregister(&mut self, id: &str) -> bool {
        let before = self.strategies.len();
        self.strategies.retain(|s| s.id != id);
        self.strategies.len() != before
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.strategies.iter().any(|s| s.id == id)
    }

    /// Run every strategy registered at `point`, in order, threading the
    /// payload through each contribution.
    pub async fn run(&self, point: Checkpoint, data: HookData, ctx: &HookContext) -> HookData {
        let mut ordered: Vec<&Strategy> = self
            .strategies
            .iter()
            .filter(|s| s.hooks.contains_key(&point))
            .collect();
        // Higher order first; ties broken by id, then registration sequence.
        ordered.sort_by(|a, b| {
            b.order
                .cmp(&a.order)
                .then_with(|| a.id.cmp(&b.id))
                .then_with(|| a.seq.cmp(&b.seq))
        });

        let mut running = data;
        for strategy in ordered {
            let callback = &strategy.hooks[&point];
            match callback.call(point, &running, ctx).await {
                Ok(None) => {}
                Ok(Some(contribution)) => {
                    if !running.merge(contribution) {
                        warn!(
                            strategy = %strategy.id,
                            checkpoint = ?point,
                            "hook returned wrong payload shape, contribution ignored"
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        strategy = %strategy.id,
                        checkpoint = ?point,
                        error = %e,
                        "hook callback failed, skipping"
                    );
                }
            }
        }
        running
    }

    /// Typed runner for message-list checkpoints. `merge` never changes the
    /// payload variant, so the output variant always matches the input.
    pub async fn run_messages(
        &self,
        point: Checkpoint,
        messages: Vec<loreloom_core::message::Message>,
        ctx: &HookContext,
    ) -> Vec<loreloom_core::message::Message> {
        match self.run(point, HookData::Messages(messages), ctx).await {
            HookData::Messages(out) => out,
            _ => unreachable!("merge preserves the payload variant"),
        }
    }

    /// Typed runner for variable-document checkpoints.
    pub async fn run_variables(
        &self,
        point: Checkpoint,
        variables: loreloom_core::vars::Variables,
        ctx: &HookContext,
    ) -> loreloom_core::vars::Variables {
        match self.run(point, HookData::Variables(variables), ctx).await {
            HookData::Variables(out) => out,
            _ => unreachable!("merge preserves the payload variant"),
        }
    }

    /// Typed runner for the outbound LLM call checkpoint.
    pub async fn run_llm_call(
        &self,
        point: Checkpoint,
        call: crate::data::LlmCall,
        ctx: &HookContext,
    ) -> crate::data::LlmCall {
        match self.run(point, HookData::LlmCall(call), ctx).await {
            HookData::LlmCall(out) => out,
            _ => unreachable!("merge preserves the payload variant"),
        }
    }

    /// Typed runner for stream chunk checkpoints.
    pub async fn run_chunk(
        &self,
        point: Checkpoint,
        chunk: loreloom_core::llm::StreamChunk,
        ctx: &HookContext,
    ) -> loreloom_core::llm::StreamChunk {
        match self.run(point, HookData::Chunk(chunk), ctx).await {
            HookData::Chunk(out) => out,
            _ => unreachable!("merge preserves the payload variant"),
        }
    }

    /// Typed runner for response checkpoints.
    pub async fn run_response(
        &self,
        point: Checkpoint,
        response: loreloom_core::llm::ChatOutcome,
        ctx: &HookContext,
    ) -> loreloom_core::llm::ChatOutcome {
        match self.run(point, HookData::Response(response), ctx).await {
            HookData::Response(out) => out,
            _ => unreachable!("merge preserves the payload variant"),
        }
    }
}
