//! Embedding provider trait and factory.

use super::providers::{gemini::GeminiProvider, mock::MockProvider, ollama::OllamaProvider};
use physrag_core::config::EmbeddingSettings;
use physrag_core::{AppError, AppResult};
use std::sync::Arc;

/// Trait for embedding providers.
///
/// Implementations report transport failures and dimension mismatches as
/// `EmbeddingUnavailable`; retry policy belongs to the caller.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "mock", "gemini", "ollama")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results.pop().ok_or_else(|| {
            AppError::EmbeddingUnavailable(format!(
                "{} returned no embedding",
                self.provider_name()
            ))
        })
    }

    /// Cheap reachability probe used by health checks.
    async fn ping(&self) -> AppResult<()>;
}

/// Create an embedding provider from settings.
pub fn create_provider(settings: &EmbeddingSettings) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.provider.as_str() {
        "mock" => Ok(Arc::new(
            MockProvider::new(settings.dimensions).with_max_input_chars(settings.max_input_chars),
        )),

        "ollama" => Ok(Arc::new(OllamaProvider::new(settings)?)),

        "gemini" => {
            let api_key = settings.resolve_api_key()?.ok_or_else(|| {
                AppError::Config(
                    "Gemini embeddings require embedding.apiKeyEnv to name a set variable"
                        .to_string(),
                )
            })?;
            Ok(Arc::new(GeminiProvider::new(settings, api_key)?))
        }

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: ollama, gemini, mock",
            settings.provider
        ))),
    }
}

/// Clip input to `max_chars` characters; oversize text is truncated, never rejected.
pub fn prepare_input(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            tracing::debug!(max_chars, "Truncating embedding input");
            &text[..byte_idx]
        }
        None => text,
    }
}

/// Reject vectors whose length disagrees with the configured dimensions.
pub fn check_dimensions(provider: &str, expected: usize, embedding: &[f32]) -> AppResult<()> {
    if embedding.len() != expected {
        return Err(AppError::EmbeddingUnavailable(format!(
            "{} returned {} dimensions, expected {}",
            provider,
            embedding.len(),
            expected
        )));
    }
    Ok(())
}
