//! View postprocessing: regex rules applied in two phases around macro
//! expansion, scoped by view, depth window, and message provenance.

pub mod pipeline;
pub mod rule;

pub use pipeline::{PostprocessOutput, VariableStates, apply};
pub use rule::{Placement, RegexRule};
