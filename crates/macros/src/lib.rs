//! Built-in macro expansion and condition evaluation.
//!
//! The pipeline's `MacroEngine` seam is usually backed by an external
//! interpreter; this crate provides the in-process implementation used by
//! the CLI and by tests:
//!
//! - a condition DSL over the variable document
//!   (`vars.mood == "tense" AND vars.turns > 3`)
//! - `{{...}}` template macros in message content
//!   (`{{get::path}}`, `{{set::path::value}}`, `{{name}}`)
//!
//! Evaluation failures never escape as panics — callers treat any error as
//! "condition false" / "content unchanged".

pub mod engine;
pub mod parser;

pub use engine::TemplateMacroEngine;
pub use parser::{Condition, EvalContext, parse_condition};
