//! Request lifecycle, failure and reporting types.

use crate::types::{Citation, StageTimings};
use chrono::{DateTime, Utc};
use physrag_core::AppError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Per-request lifecycle.
///
/// `Received -> Retrieving -> (Retrieved | RetrievalFailed)`, then for
/// answering operations `Retrieved -> Generating -> (Done | GenerationFailed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    Received,
    Retrieving,
    Retrieved,
    RetrievalFailed,
    Generating,
    Done,
    GenerationFailed,
}

impl RequestState {
    pub fn can_advance_to(&self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Received, Retrieving)
                | (Retrieving, Retrieved)
                | (Retrieving, RetrievalFailed)
                | (Retrieved, Generating)
                | (Generating, Done)
                | (Generating, GenerationFailed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::RetrievalFailed | RequestState::Done | RequestState::GenerationFailed
        )
    }
}

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Validation,
    Retrieval,
    Generation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validation => "validation",
            Stage::Retrieval => "retrieval",
            Stage::Generation => "generation",
        };
        f.write_str(name)
    }
}

/// A failed request with the stage that failed and the time spent so far.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {source}")]
pub struct RagFailure {
    pub stage: Stage,
    pub state: RequestState,
    #[source]
    pub source: AppError,
    pub timings: StageTimings,
}

impl RagFailure {
    pub fn error(&self) -> &AppError {
        &self.source
    }

    pub fn into_error(self) -> AppError {
        self.source
    }
}

/// Generated answer before it is folded into a `ChatTurn`.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub answer: String,
    pub generation_time: Duration,
    pub cited: Vec<Citation>,
    /// Attempts made, including the first
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: ServiceStatus,
    pub provider: String,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reachability of every provider the engine depends on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Keyed by "embedding", "index", "generation"
    pub services: BTreeMap<String, ServiceHealth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_size: Option<u64>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Static description of the running engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub embedding_provider: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub index_backend: String,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_size: Option<u64>,
    pub generation_provider: String,
    pub generation_model: String,
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub hybrid_alpha: f32,
    pub max_context_chars: usize,
    pub max_tokens: u32,
    pub temperature: f32,
}
