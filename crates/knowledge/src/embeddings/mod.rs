//! Embedding adapter: turns query text into a fixed-dimension vector.

pub mod provider;
pub mod providers;

pub use provider::{check_dimensions, create_provider, prepare_input, EmbeddingProvider};
pub use providers::{GeminiProvider, MockProvider, OllamaProvider};
