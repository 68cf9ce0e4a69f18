//! Pipeline orchestration: one async flow per request, from conversation
//! flattening through assembly, postprocessing, variable persistence, and
//! output shaping (full / history / delta).

pub mod assets;
pub mod dto;
pub mod orchestrator;

pub use dto::{OutputMode, RouteRequest, RouteResponse};
pub use orchestrator::RouteOrchestrator;
