//! Error types for the Loreloom domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! The pipeline is "fail soft" toward content production: malformed regex
//! rules are skipped, condition/macro failures evaluate to false, and hook
//! callback failures drop only that strategy's contribution. The errors
//! defined here are the "fail loud" cases — structurally invalid input the
//! pipeline directly controls (bad roles in raw history, unreadable
//! conversation files) that must surface to the caller.

use thiserror::Error;

/// The top-level error type for all Loreloom operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Assembly errors ---
    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    // --- Storage errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Macro/condition interpreter errors ---
    #[error("Macro error: {0}")]
    Macro(#[from] MacroError),

    // --- LLM client errors ---
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable code for structured JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Assembly(_) => "assembly_error",
            Error::Store(_) => "store_error",
            Error::Macro(_) => "macro_error",
            Error::Llm(_) => "llm_error",
            Error::Serialization(_) => "serialization_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Shape this error as the structured JSON body callers receive.
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.code(),
            "message": self.to_string(),
        })
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum AssemblyError {
    /// Raw history carried a role the pipeline does not recognize.
    /// This indicates caller-side data corruption and is always fatal.
    #[error("Invalid message role '{role}' at history index {index}")]
    InvalidRole { role: String, index: usize },

    #[error("History entry at index {index} is not an object")]
    MalformedHistoryEntry { index: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Asset not found: {file}")]
    NotFound { file: String },

    #[error("Asset unreadable: {file} — {error}")]
    Unreadable { file: String, error: String },

    #[error("Asset corrupt: {file} — {error}")]
    Corrupt { file: String, error: String },

    #[error("Conversation not found: {file}")]
    ConversationNotFound { file: String },

    #[error("Conversation tree invalid: {file} — {reason}")]
    InvalidTree { file: String, reason: String },

    #[error("I/O error on {file}: {error}")]
    Io { file: String, error: String },
}

#[derive(Debug, Clone, Error)]
pub enum MacroError {
    #[error("Condition parse failed: {0}")]
    Parse(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("Interpreter timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Client not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_role_displays_index() {
        let err = Error::Assembly(AssemblyError::InvalidRole {
            role: "narrator".into(),
            index: 3,
        });
        assert!(err.to_string().contains("narrator"));
        assert!(err.to_string().contains("3"));
        assert_eq!(err.code(), "assembly_error");
    }

    #[test]
    fn error_body_is_structured() {
        let err = Error::Store(StoreError::Unreadable {
            file: "presets/main.json".into(),
            error: "permission denied".into(),
        });
        let body = err.to_body();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "store_error");
        assert!(body["message"].as_str().unwrap().contains("main.json"));
    }
}
