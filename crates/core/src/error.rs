//! Error types for PhysRAG.
//!
//! The retrieval and generation adapters each report failures with a
//! dedicated variant so the orchestrator can tell a transport failure
//! (degrade or retry) from a policy refusal (surface immediately).

use thiserror::Error;

/// Unified error type for PhysRAG.
///
/// All functions in the workspace return `Result<T, AppError>`.
/// Every failure is scoped to a single request; nothing here is fatal
/// to the process.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Prompt template errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Rejected before any provider call (empty text, out-of-range top_k/alpha)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Embedding provider unreachable, unauthorized or timed out
    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Vector index unreachable, unauthorized or timed out
    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// Generation provider unreachable, unauthorized or timed out
    #[error("Generation provider unavailable: {0}")]
    GenerationUnavailable(String),

    /// Generation provider returned an empty or policy-blocked completion
    #[error("Generation refused: {0}")]
    GenerationRefused(String),
}

impl AppError {
    /// True for the transport-class `*Unavailable` kinds.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            AppError::EmbeddingUnavailable(_)
                | AppError::IndexUnavailable(_)
                | AppError::GenerationUnavailable(_)
        )
    }

    /// Only transport failures of the generation step are worth repeating;
    /// a refusal of an identical prompt will not change.
    pub fn is_retryable_generation(&self) -> bool {
        matches!(self, AppError::GenerationUnavailable(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
