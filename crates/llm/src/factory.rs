//! Generation provider factory.
//!
//! Resolves the configured provider name, injects the API key from the
//! environment and builds the matching `LlmClient`.

use crate::client::LlmClient;
use crate::providers::{GeminiClient, OllamaClient};
use crate::types::ProviderType;
use physrag_core::config::GenerationSettings;
use physrag_core::{AppError, AppResult};
use std::sync::Arc;

/// Create an LLM client from generation settings.
///
/// # Errors
/// Returns `AppError::Config` if:
/// - Provider is unknown
/// - Gemini is selected and no API key can be resolved
/// - The HTTP client cannot be built
pub fn create_client(settings: &GenerationSettings) -> AppResult<Arc<dyn LlmClient>> {
    let provider = ProviderType::parse(&settings.provider).ok_or_else(|| {
        AppError::Config(format!("Unknown generation provider: {}", settings.provider))
    })?;

    tracing::debug!(provider = provider.as_str(), model = %settings.model, "Creating generation client");

    match provider {
        ProviderType::Ollama => {
            let base_url = settings
                .endpoint
                .as_deref()
                .unwrap_or(crate::providers::ollama::DEFAULT_OLLAMA_URL);
            let client = OllamaClient::with_base_url(base_url, settings.timeout())?;
            Ok(Arc::new(client))
        }
        ProviderType::Gemini => {
            let api_key = settings.resolve_api_key()?.ok_or_else(|| {
                AppError::Config("Gemini provider requires generation.apiKeyEnv".to_string())
            })?;
            let client =
                GeminiClient::new(settings.endpoint.as_deref(), api_key, settings.timeout())?;
            Ok(Arc::new(client))
        }
    }
}
