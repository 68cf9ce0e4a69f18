//! # Loreloom Core
//!
//! Domain types, traits, and error definitions for the Loreloom prompt
//! pipeline. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (asset storage, conversation storage, the
//! macro interpreter, the LLM client) is defined as a trait here.
//! Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod fragment;
pub mod llm;
pub mod macros;
pub mod message;
pub mod store;
pub mod vars;

// Re-export key types at crate root for ergonomics
pub use error::{AssemblyError, Error, LlmError, MacroError, Result, StoreError};
pub use fragment::{
    Character, FragmentPosition, Persona, PromptFragment, TriggerMode, WorldBookEntry,
    WorldBookPosition,
};
pub use llm::{ChatOutcome, ChatParams, LlmClient, StreamChunk, Usage};
pub use macros::{Expanded, MacroEngine};
pub use message::{Message, Role, Source, SourceKind, View};
pub use store::{AssetKind, AssetStore, ConversationStore, FlattenedConversation, ScanEntry};
pub use vars::{PathSegment, Variables};
