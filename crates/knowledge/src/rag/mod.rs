//! Retrieval-augmented answering over the physics textbook corpus.
//!
//! `ranker` merges vector and keyword hits, `context` packs them into a
//! bounded prompt context, and `engine` drives a request through both
//! stages.

pub mod context;
pub mod engine;
pub mod ranker;
pub mod types;

pub use context::{AssembledContext, ContextAssembler};
pub use engine::RagEngine;
pub use ranker::{fuse, normalize_scores, HybridRanker, Ranking};
pub use types::{
    EngineStats, GenerationResult, HealthReport, HealthStatus, RagFailure, RequestState,
    ServiceHealth, ServiceStatus, Stage,
};
