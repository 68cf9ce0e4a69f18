//! Hook checkpoints: named extension points threaded through the pipeline,
//! with typed payloads and deterministic execution order.

pub mod data;
pub mod manager;

pub use data::{Checkpoint, HookData, LlmCall, PayloadShape};
pub use manager::{HookCallback, HookContext, HookError, HookManager};
