//! The macro/condition interpreter contract.
//!
//! Macro expansion and condition evaluation run in an external interpreter
//! from the pipeline's point of view; this trait is the narrow seam. Calls
//! may block, so callers bound them with a hard timeout and fail closed
//! (condition false, content unchanged) on timeout or error.

use crate::error::MacroError;
use crate::message::Message;
use crate::vars::Variables;
use async_trait::async_trait;

/// The result of a macro expansion pass.
#[derive(Debug, Clone)]
pub struct Expanded {
    pub messages: Vec<Message>,
    /// The possibly-updated variable document, threaded forward.
    pub variables: Variables,
}

#[async_trait]
pub trait MacroEngine: Send + Sync {
    /// Expand embedded macro syntax in every message's content against the
    /// variable document. Only `content` may change.
    async fn expand(
        &self,
        messages: Vec<Message>,
        variables: &Variables,
    ) -> Result<Expanded, MacroError>;

    /// Evaluate one condition expression to a boolean.
    async fn eval_condition(&self, expr: &str, variables: &Variables) -> Result<bool, MacroError>;

    /// Evaluate a batch of expressions in one interpreter round-trip.
    ///
    /// The default implementation loops [`eval_condition`]; engines with
    /// real batch support override it. An `Err` from the batch makes callers
    /// fall back to per-item evaluation.
    ///
    /// [`eval_condition`]: MacroEngine::eval_condition
    async fn eval_batch(
        &self,
        exprs: &[String],
        variables: &Variables,
    ) -> Result<Vec<bool>, MacroError> {
        let mut results = Vec::with_capacity(exprs.len());
        for expr in exprs {
            results.push(self.eval_condition(expr, variables).await?);
        }
        Ok(results)
    }
}
