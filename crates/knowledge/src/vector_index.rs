//! Vector index abstraction over the textbook corpus.
//!
//! The index is read-only from this crate's point of view; ingestion is a
//! separate offline job.

use crate::memory_index::MemoryIndex;
use crate::types::Chunk;
use crate::weaviate_index::WeaviateIndex;
use physrag_core::{AppError, AppResult, RagConfig};
use std::sync::Arc;

/// Trait for vector index backends.
///
/// Both query methods return chunks ordered by descending raw score and
/// report transport problems as `IndexUnavailable`. A collection that does
/// not exist yet is not an error: it yields an empty list.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Backend name (e.g., "weaviate", "memory")
    fn backend_name(&self) -> &str;

    fn collection(&self) -> &str;

    /// Nearest neighbours of `vector` by similarity.
    async fn query_vector(&self, vector: &[f32], top_k: usize) -> AppResult<Vec<(Chunk, f32)>>;

    /// Lexical (BM25) matches for `text`.
    async fn query_keyword(&self, text: &str, top_k: usize) -> AppResult<Vec<(Chunk, f32)>>;

    async fn ping(&self) -> AppResult<()>;

    /// Number of chunks in the collection, when the backend can tell.
    async fn count(&self) -> AppResult<Option<u64>>;
}

/// Create the configured index backend.
pub fn create_index(config: &RagConfig) -> AppResult<Arc<dyn VectorIndex>> {
    let settings = &config.index;
    match settings.provider.as_str() {
        "weaviate" => Ok(Arc::new(WeaviateIndex::new(settings)?)),

        "memory" => {
            let path = settings.corpus_path.as_deref().ok_or_else(|| {
                AppError::Config("index.corpusPath is required for the memory index".to_string())
            })?;
            let index = MemoryIndex::load_jsonl(&config.resolve_path(path), &settings.collection)?;
            Ok(Arc::new(index))
        }

        other => Err(AppError::Config(format!(
            "Unknown index provider: '{}'. Supported providers: weaviate, memory",
            other
        ))),
    }
}
