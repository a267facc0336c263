//! RAG orchestration.
//!
//! Every operation validates its query, ranks chunks through the hybrid
//! ranker and, for answering operations, assembles a bounded context and
//! asks the generation provider for a grounded answer. Timings are kept
//! for both stages and returned even when a stage fails.

use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::gate::{ProviderGate, ProviderKind};
use crate::rag::context::{AssembledContext, ContextAssembler};
use crate::rag::ranker::{HybridRanker, Ranking};
use crate::rag::types::{
    EngineStats, GenerationResult, HealthReport, HealthStatus, RagFailure, RequestState,
    ServiceHealth, ServiceStatus, Stage,
};
use crate::types::{ChatTurn, Query, RetrievalResult, SearchType, StageTimings};
use crate::vector_index::{create_index, VectorIndex};
use chrono::Utc;
use physrag_core::config::{GenerationSettings, RetrievalSettings};
use physrag_core::{AppError, AppResult, RagConfig};
use physrag_llm::{create_client, LlmClient, LlmRequest};
use physrag_prompt::{PromptKind, PromptSet, PromptVars};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Tracks one request through its lifecycle.
struct RequestRun {
    state: RequestState,
    timings: StageTimings,
}

impl RequestRun {
    fn new() -> Self {
        Self {
            state: RequestState::Received,
            timings: StageTimings::default(),
        }
    }

    fn advance(&mut self, next: RequestState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(from = ?self.state, to = ?next, "Request state");
        self.state = next;
    }

    fn fail(&mut self, stage: Stage, next: Option<RequestState>, source: AppError) -> RagFailure {
        if let Some(next) = next {
            self.advance(next);
        }
        RagFailure {
            stage,
            state: self.state,
            source,
            timings: self.timings,
        }
    }
}

/// Retrieval and generation engine over one textbook collection.
///
/// Holds no per-request state; one instance serves concurrent requests.
pub struct RagEngine {
    ranker: HybridRanker,
    assembler: ContextAssembler,
    llm: Arc<dyn LlmClient>,
    generation_gate: ProviderGate,
    prompts: PromptSet,
    retrieval: RetrievalSettings,
    generation: GenerationSettings,
    generation_retries: u32,
}

impl RagEngine {
    /// Build every provider from configuration.
    pub fn from_config(config: &RagConfig) -> AppResult<Self> {
        config.validate()?;

        let embedder = create_provider(&config.embedding)?;
        let index = create_index(config)?;
        let llm = create_client(&config.generation)?;

        let prompts_dir = config
            .generation
            .prompts_dir
            .as_deref()
            .map(|dir| config.resolve_path(dir));
        let prompts = PromptSet::new(prompts_dir.as_deref())?;

        tracing::info!(
            embedding = %config.embedding.provider,
            index = %config.index.provider,
            generation = %config.generation.provider,
            collection = %config.index.collection,
            "RAG engine configured"
        );

        Ok(Self::with_providers(config, embedder, index, llm, prompts))
    }

    /// Build around already constructed providers.
    pub fn with_providers(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        llm: Arc<dyn LlmClient>,
        prompts: PromptSet,
    ) -> Self {
        let max_in_flight = config.orchestration.max_in_flight;

        let ranker = HybridRanker::new(
            embedder,
            index,
            ProviderGate::new(
                ProviderKind::Embedding,
                max_in_flight,
                config.embedding.timeout(),
            ),
            ProviderGate::new(ProviderKind::Index, max_in_flight, config.index.timeout()),
            config.retrieval.overfetch_factor,
        );

        Self {
            ranker,
            assembler: ContextAssembler::new(config.retrieval.max_context_chars),
            llm,
            generation_gate: ProviderGate::new(
                ProviderKind::Generation,
                max_in_flight,
                config.generation.timeout(),
            ),
            prompts,
            retrieval: config.retrieval.clone(),
            generation: config.generation.clone(),
            generation_retries: config.orchestration.generation_retries,
        }
    }

    /// Ranked chunks for `text`; no generation.
    pub async fn search(
        &self,
        text: &str,
        search_type: SearchType,
        top_k: Option<usize>,
        alpha: Option<f32>,
    ) -> Result<RetrievalResult, RagFailure> {
        let query = Query::new(
            text,
            search_type,
            top_k.unwrap_or(self.retrieval.default_top_k),
            alpha.unwrap_or(self.retrieval.hybrid_alpha),
        );
        let span = tracing::info_span!(
            "rag_request",
            op = "search",
            search_type = %query.search_type,
            top_k = query.top_k
        );

        async {
            let mut run = RequestRun::new();
            let ranking = self.retrieve(&query, &mut run).await?;

            tracing::info!(
                results = ranking.chunks.len(),
                degraded = ranking.degraded,
                search_ms = run.timings.search_time.as_millis() as u64,
                "Search complete"
            );

            Ok::<_, RagFailure>(RetrievalResult {
                chunks: ranking.chunks,
                search_type: query.search_type,
                search_time: run.timings.search_time,
                degraded: ranking.degraded,
            })
        }
        .instrument(span)
        .await
    }

    /// Chunks semantically close to `text` (vector mode).
    pub async fn similar(
        &self,
        text: &str,
        top_k: Option<usize>,
    ) -> Result<RetrievalResult, RagFailure> {
        self.search(text, SearchType::Vector, top_k, None).await
    }

    /// Answer a question grounded in retrieved passages.
    pub async fn chat(
        &self,
        message: &str,
        include_sources: bool,
        search_type: SearchType,
        top_k: Option<usize>,
    ) -> Result<ChatTurn, RagFailure> {
        let query = Query::new(
            message,
            search_type,
            top_k.unwrap_or(self.retrieval.default_top_k),
            self.retrieval.hybrid_alpha,
        );
        let span = tracing::info_span!(
            "rag_request",
            op = "chat",
            search_type = %query.search_type,
            top_k = query.top_k
        );

        self.answer(PromptKind::Chat, &query, include_sources, None)
            .instrument(span)
            .await
    }

    /// Explain a concept from the few most relevant passages.
    pub async fn explain(
        &self,
        concept: &str,
        top_k: Option<usize>,
    ) -> Result<ChatTurn, RagFailure> {
        let query = Query::new(
            concept,
            SearchType::Hybrid,
            top_k.unwrap_or(self.retrieval.explain_top_k),
            self.retrieval.hybrid_alpha,
        );
        let span = tracing::info_span!(
            "rag_request",
            op = "explain",
            search_type = %query.search_type,
            top_k = query.top_k
        );

        self.answer(
            PromptKind::Explain,
            &query,
            true,
            Some(self.retrieval.explain_context_chunks),
        )
        .instrument(span)
        .await
    }

    /// Probe every provider concurrently.
    pub async fn health(&self) -> HealthReport {
        let embedder = self.ranker.embedder();
        let index = self.ranker.index();

        let (embedding, index_health, generation, count) = tokio::join!(
            probe(
                self.ranker.embedding_gate(),
                embedder.provider_name(),
                embedder.ping()
            ),
            probe(self.ranker.index_gate(), index.backend_name(), index.ping()),
            probe(
                &self.generation_gate,
                self.llm.provider_name(),
                self.llm.ping()
            ),
            self.ranker.index_gate().run("count", index.count()),
        );

        let mut services = BTreeMap::new();
        services.insert(ProviderKind::Embedding.as_str().to_string(), embedding);
        services.insert(ProviderKind::Index.as_str().to_string(), index_health);
        services.insert(ProviderKind::Generation.as_str().to_string(), generation);

        let status = if services.values().all(|s| s.status == ServiceStatus::Up) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthReport {
            status,
            services,
            corpus_size: count.ok().flatten(),
            checked_at: Utc::now(),
        }
    }

    /// Describe the configured providers and retrieval defaults.
    pub async fn stats(&self) -> EngineStats {
        let embedder = self.ranker.embedder();
        let index = self.ranker.index();

        let corpus_size = match self.ranker.index_gate().run("count", index.count()).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "Could not count corpus");
                None
            }
        };

        EngineStats {
            embedding_provider: embedder.provider_name().to_string(),
            embedding_model: embedder.model_name().to_string(),
            embedding_dimensions: embedder.dimensions(),
            index_backend: index.backend_name().to_string(),
            collection: index.collection().to_string(),
            corpus_size,
            generation_provider: self.llm.provider_name().to_string(),
            generation_model: self.generation.model.clone(),
            default_top_k: self.retrieval.default_top_k,
            max_top_k: self.retrieval.max_top_k,
            hybrid_alpha: self.retrieval.hybrid_alpha,
            max_context_chars: self.assembler.max_chars(),
            max_tokens: self.generation.max_tokens,
            temperature: self.generation.temperature,
        }
    }

    async fn retrieve(&self, query: &Query, run: &mut RequestRun) -> Result<Ranking, RagFailure> {
        if let Err(e) = query.validate(self.retrieval.max_top_k) {
            tracing::debug!(error = %e, "Query rejected");
            return Err(run.fail(Stage::Validation, None, e));
        }

        run.advance(RequestState::Retrieving);
        let started = Instant::now();
        let result = self.ranker.rank(query).await;
        run.timings.search_time = started.elapsed();

        match result {
            Ok(ranking) => {
                run.advance(RequestState::Retrieved);
                Ok(ranking)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Retrieval failed");
                Err(run.fail(Stage::Retrieval, Some(RequestState::RetrievalFailed), e))
            }
        }
    }

    async fn answer(
        &self,
        kind: PromptKind,
        query: &Query,
        include_sources: bool,
        max_chunks: Option<usize>,
    ) -> Result<ChatTurn, RagFailure> {
        let mut run = RequestRun::new();
        let ranking = self.retrieve(query, &mut run).await?;

        let context = self.assembler.assemble(&ranking.chunks, max_chunks);
        tracing::debug!(
            included = context.included.len(),
            dropped = context.dropped,
            chars = context.text.chars().count(),
            "Context assembled"
        );

        run.advance(RequestState::Generating);
        let started = Instant::now();
        let outcome = self.generate(kind, &query.text, &context).await;
        run.timings.generation_time = started.elapsed();

        let (answer, attempts) = match outcome {
            Ok(done) => done,
            Err(e) => {
                tracing::warn!(error = %e, "Generation failed");
                return Err(run.fail(
                    Stage::Generation,
                    Some(RequestState::GenerationFailed),
                    e,
                ));
            }
        };
        run.advance(RequestState::Done);

        let generation = GenerationResult {
            answer,
            generation_time: run.timings.generation_time,
            cited: if include_sources {
                context.citations(self.retrieval.max_citations, self.retrieval.preview_chars)
            } else {
                Vec::new()
            },
            attempts,
        };

        tracing::info!(
            chunks = context.included.len(),
            attempts = generation.attempts,
            degraded = ranking.degraded,
            search_ms = run.timings.search_time.as_millis() as u64,
            generation_ms = run.timings.generation_time.as_millis() as u64,
            "Answer generated"
        );

        Ok(ChatTurn {
            answer: generation.answer,
            citations: generation.cited,
            search_time: run.timings.search_time,
            generation_time: generation.generation_time,
            search_type: query.search_type,
            degraded: ranking.degraded,
            confidence: context.confidence(),
            search_results_count: ranking.chunks.len(),
        })
    }

    /// Render the prompt and complete it, retrying transport failures.
    ///
    /// Returns the answer and the number of attempts made.
    async fn generate(
        &self,
        kind: PromptKind,
        question: &str,
        context: &AssembledContext,
    ) -> AppResult<(String, u32)> {
        let prompt = self.prompts.render(
            kind,
            &PromptVars {
                question: question.to_string(),
                context: context.text.clone(),
                language: self.generation.answer_language.clone(),
            },
        )?;

        let mut request = LlmRequest::new(prompt.user, &self.generation.model)
            .with_max_tokens(self.generation.max_tokens)
            .with_temperature(self.generation.temperature);
        if let Some(system) = prompt.system {
            request = request.with_system(system);
        }

        let max_attempts = self.generation_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .generation_gate
                .run("complete", self.llm.complete(&request))
                .await
            {
                Ok(response) => return Ok((response.content, attempt)),
                Err(e) if e.is_retryable_generation() && attempt < max_attempts => {
                    tracing::warn!(attempt, max_attempts, error = %e, "Generation unavailable, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

async fn probe<F>(gate: &ProviderGate, provider: &str, call: F) -> ServiceHealth
where
    F: Future<Output = AppResult<()>>,
{
    let started = Instant::now();
    let result = gate.run("ping", call).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(()) => ServiceHealth {
            status: ServiceStatus::Up,
            provider: provider.to_string(),
            latency_ms,
            error: None,
        },
        Err(e) => {
            tracing::warn!(provider, service = gate.kind().as_str(), error = %e, "Health probe failed");
            ServiceHealth {
                status: ServiceStatus::Down,
                provider: provider.to_string(),
                latency_ms,
                error: Some(e.to_string()),
            }
        }
    }
}
