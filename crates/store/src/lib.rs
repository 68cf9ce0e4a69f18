//! Storage backends: conversation trees plus asset files, behind the
//! `ConversationStore`/`AssetStore` contracts from `loreloom-core`.

pub mod file_backend;
pub mod in_memory;
pub mod tree;

pub use file_backend::FileStore;
pub use in_memory::InMemoryStore;
pub use tree::{ConversationNode, ConversationTree};
