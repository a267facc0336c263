//! Retrieval and generation for the physics textbook assistant.
//!
//! Embedding providers, vector index backends, hybrid ranking, context
//! assembly and the `RagEngine` that ties them to an LLM.

pub mod embeddings;
pub mod gate;
pub mod memory_index;
pub mod rag;
pub mod types;
pub mod vector_index;
pub mod weaviate_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use embeddings::{create_provider, EmbeddingProvider};
pub use gate::{ProviderGate, ProviderKind};
pub use memory_index::{CorpusRecord, MemoryIndex};
pub use rag::{
    EngineStats, HealthReport, HealthStatus, RagEngine, RagFailure, RequestState, ServiceHealth,
    ServiceStatus, Stage,
};
pub use types::{
    ChatTurn, Chunk, Citation, Query, RankingMethod, RetrievalResult, ScoredChunk, SearchType,
    StageTimings,
};
pub use vector_index::{create_index, VectorIndex};
pub use weaviate_index::WeaviateIndex;
