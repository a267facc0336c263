//! End-to-end behaviour of the engine over scripted providers.

use super::fakes::{
    chunk, engine, ranked_hits, test_config, FakeEmbedder, FakeIndex, ScriptedLlm, DEFAULT_ANSWER,
};
use crate::rag::{HealthStatus, RagEngine, RequestState, ServiceStatus, Stage};
use crate::types::SearchType;
use physrag_core::AppError;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn newton_index() -> FakeIndex {
    FakeIndex::with_hits(
        vec![
            (chunk("newton-1", 10, "Newton's first law describes inertia."), 0.88),
            (chunk("newton-2", 11, "A net force changes the state of motion."), 0.74),
            (chunk("energy-1", 30, "Kinetic energy depends on speed."), 0.41),
        ],
        vec![
            (chunk("newton-1", 10, "Newton's first law describes inertia."), 11.2),
            (chunk("newton-3", 12, "Newton's laws hold in inertial frames."), 6.5),
        ],
    )
}

struct Harness {
    embedder: Arc<FakeEmbedder>,
    index: Arc<FakeIndex>,
    llm: Arc<ScriptedLlm>,
    engine: RagEngine,
}

fn harness_with(
    config: physrag_core::RagConfig,
    embedder: FakeEmbedder,
    index: FakeIndex,
    llm: ScriptedLlm,
) -> Harness {
    let embedder = Arc::new(embedder);
    let index = Arc::new(index);
    let llm = Arc::new(llm);
    let engine = engine(
        &config,
        Arc::clone(&embedder),
        Arc::clone(&index),
        Arc::clone(&llm),
    );
    Harness {
        embedder,
        index,
        llm,
        engine,
    }
}

fn harness(index: FakeIndex, llm: ScriptedLlm) -> Harness {
    harness_with(test_config(), FakeEmbedder::default(), index, llm)
}

#[tokio::test]
async fn test_chat_cites_only_retrieved_chunks() {
    let h = harness(newton_index(), ScriptedLlm::default());

    let search = h
        .engine
        .search("What is Newton's first law?", SearchType::Hybrid, Some(3), None)
        .await
        .unwrap();
    let turn = h
        .engine
        .chat("What is Newton's first law?", true, SearchType::Hybrid, Some(3))
        .await
        .unwrap();

    assert_eq!(turn.answer, DEFAULT_ANSWER);
    assert!(!turn.citations.is_empty());
    assert!(turn.citations.len() <= 3);
    assert_eq!(turn.search_results_count, search.len());
    assert!(!turn.degraded);

    let retrieved: HashSet<&str> = search.chunks.iter().map(|c| c.chunk.id.as_str()).collect();
    for citation in &turn.citations {
        assert!(retrieved.contains(citation.chunk_id.as_str()));
    }
    assert_eq!(turn.citations[0].chunk_id, "newton-1");
    assert_eq!(turn.citations[0].rank, 1);

    let prompt = h.llm.last_prompt();
    assert!(prompt.contains("What is Newton's first law?"));
    assert!(prompt.contains("[Source 1] Chapter: Force and Motion"));
    assert!(prompt.contains("Newton's first law describes inertia."));
}

#[tokio::test]
async fn test_chat_request_carries_generation_settings() {
    let mut config = test_config();
    config.generation.model = "physics-tutor".to_string();
    config.generation.max_tokens = 321;
    let h = harness_with(
        config,
        FakeEmbedder::default(),
        newton_index(),
        ScriptedLlm::default(),
    );

    h.engine
        .chat("inertia", true, SearchType::Hybrid, None)
        .await
        .unwrap();

    let requests = h.llm.requests.lock().unwrap();
    let request = &requests[0];
    assert_eq!(request.model, "physics-tutor");
    assert_eq!(request.max_tokens, Some(321));
    assert!(request
        .system
        .as_deref()
        .is_some_and(|s| s.contains("English")));
}

#[tokio::test]
async fn test_empty_corpus_still_answers() {
    let h = harness(FakeIndex::default(), ScriptedLlm::default());

    let search = h
        .engine
        .search("What is entropy?", SearchType::Hybrid, None, None)
        .await
        .unwrap();
    assert!(search.is_empty());
    assert!(!search.degraded);

    let turn = h
        .engine
        .chat("What is entropy?", true, SearchType::Hybrid, None)
        .await
        .unwrap();
    assert!(turn.citations.is_empty());
    assert_eq!(turn.search_results_count, 0);
    assert_eq!(turn.confidence, 0.0);
    assert_eq!(h.llm.calls(), 1);
    assert!(h.llm.last_prompt().contains("No textbook passages were found"));
}

#[tokio::test]
async fn test_invalid_queries_touch_no_provider() {
    let h = harness(newton_index(), ScriptedLlm::default());

    let zero = h
        .engine
        .chat("inertia", true, SearchType::Hybrid, Some(0))
        .await
        .unwrap_err();
    let too_many = h
        .engine
        .search("inertia", SearchType::Hybrid, Some(500), None)
        .await
        .unwrap_err();
    let bad_alpha = h
        .engine
        .search("inertia", SearchType::Hybrid, None, Some(1.5))
        .await
        .unwrap_err();
    let blank = h.engine.explain("   ", None).await.unwrap_err();

    for failure in [zero, too_many, bad_alpha, blank] {
        assert_eq!(failure.stage, Stage::Validation);
        assert_eq!(failure.state, RequestState::Received);
        assert!(matches!(failure.error(), AppError::InvalidQuery(_)));
    }

    assert_eq!(h.embedder.calls(), 0);
    assert_eq!(h.index.calls(), 0);
    assert_eq!(h.llm.calls(), 0);
}

#[tokio::test]
async fn test_keyword_outage_degrades_to_vector_scores() {
    let mut index = FakeIndex::with_hits(ranked_hits("v", 4, 0.9), ranked_hits("k", 4, 9.0));
    index.fail_keyword = true;
    let h = harness(index, ScriptedLlm::default());

    let result = h
        .engine
        .search("friction", SearchType::Hybrid, Some(4), Some(0.5))
        .await
        .unwrap();

    assert!(result.degraded);
    let ids: Vec<&str> = result.chunks.iter().map(|c| c.chunk.id.as_str()).collect();
    assert_eq!(ids, vec!["v0", "v1", "v2", "v3"]);

    // vector scores normalise to 1, 2/3, 1/3, 0 and carry weight alpha
    let expected = [0.5, 1.0 / 3.0, 1.0 / 6.0, 0.0];
    for (scored, want) in result.chunks.iter().zip(expected) {
        assert!((scored.score - want).abs() < 1e-4, "{} vs {}", scored.score, want);
    }
}

#[tokio::test]
async fn test_embedding_outage_degrades_to_keyword() {
    let h = harness_with(
        test_config(),
        FakeEmbedder::failing(),
        newton_index(),
        ScriptedLlm::default(),
    );

    let turn = h
        .engine
        .chat("Newton's laws", true, SearchType::Hybrid, Some(2))
        .await
        .unwrap();

    assert!(turn.degraded);
    assert_eq!(turn.citations[0].chunk_id, "newton-1");
    assert_eq!(h.index.vector_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.index.keyword_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_both_branches_down_fails_retrieval() {
    let mut index = newton_index();
    index.fail_vector = true;
    index.fail_keyword = true;
    let h = harness(index, ScriptedLlm::default());

    let failure = h
        .engine
        .chat("momentum", true, SearchType::Hybrid, None)
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Retrieval);
    assert_eq!(failure.state, RequestState::RetrievalFailed);
    assert!(matches!(failure.error(), AppError::IndexUnavailable(_)));
    assert_eq!(failure.timings.generation_time, Duration::ZERO);
    assert_eq!(h.llm.calls(), 0);
}

#[tokio::test]
async fn test_single_mode_outage_is_not_degraded_but_failed() {
    let h = harness_with(
        test_config(),
        FakeEmbedder::failing(),
        newton_index(),
        ScriptedLlm::default(),
    );

    let failure = h.engine.similar("inertia", None).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Retrieval);
    assert!(matches!(failure.error(), AppError::EmbeddingUnavailable(_)));
}

#[tokio::test]
async fn test_generation_unavailable_is_retried_once() {
    let h = harness(
        newton_index(),
        ScriptedLlm::scripted(vec![Err(AppError::GenerationUnavailable(
            "connection reset".to_string(),
        ))]),
    );

    let turn = h
        .engine
        .chat("inertia", true, SearchType::Hybrid, None)
        .await
        .unwrap();
    assert_eq!(turn.answer, DEFAULT_ANSWER);
    assert_eq!(h.llm.calls(), 2);
}

#[tokio::test]
async fn test_generation_gives_up_after_retry_budget() {
    let outage = || Err(AppError::GenerationUnavailable("503".to_string()));
    let h = harness(
        newton_index(),
        ScriptedLlm::scripted(vec![outage(), outage(), outage()]),
    );

    let failure = h
        .engine
        .chat("inertia", true, SearchType::Hybrid, None)
        .await
        .unwrap_err();
    assert_eq!(failure.stage, Stage::Generation);
    assert_eq!(failure.state, RequestState::GenerationFailed);
    assert!(matches!(failure.error(), AppError::GenerationUnavailable(_)));
    assert_eq!(h.llm.calls(), 2);
}

#[tokio::test]
async fn test_zero_retries_configured() {
    let mut config = test_config();
    config.orchestration.generation_retries = 0;
    let h = harness_with(
        config,
        FakeEmbedder::default(),
        newton_index(),
        ScriptedLlm::scripted(vec![Err(AppError::GenerationUnavailable(
            "timeout".to_string(),
        ))]),
    );

    let failure = h
        .engine
        .chat("inertia", true, SearchType::Hybrid, None)
        .await
        .unwrap_err();
    assert!(matches!(failure.error(), AppError::GenerationUnavailable(_)));
    assert_eq!(h.llm.calls(), 1);
}

#[tokio::test]
async fn test_refusal_is_not_retried() {
    let h = harness(
        newton_index(),
        ScriptedLlm::scripted(vec![Err(AppError::GenerationRefused(
            "SAFETY".to_string(),
        ))]),
    );

    let failure = h
        .engine
        .explain("inertia", None)
        .await
        .unwrap_err();
    assert_eq!(failure.stage, Stage::Generation);
    assert!(matches!(failure.error(), AppError::GenerationRefused(_)));
    assert_eq!(h.llm.calls(), 1);
}

#[tokio::test]
async fn test_failure_reports_stage_timings() {
    let mut index = newton_index();
    index.delay = Some(Duration::from_millis(15));
    let mut llm = ScriptedLlm::scripted(vec![Err(AppError::GenerationRefused(
        "blocked".to_string(),
    ))]);
    llm.delay = Some(Duration::from_millis(10));
    let h = harness(index, llm);

    let failure = h
        .engine
        .chat("inertia", true, SearchType::Keyword, None)
        .await
        .unwrap_err();

    assert!(failure.timings.search_time >= Duration::from_millis(15));
    assert!(failure.timings.generation_time >= Duration::from_millis(10));
}

#[tokio::test]
async fn test_sources_can_be_left_out() {
    let h = harness(newton_index(), ScriptedLlm::default());

    let turn = h
        .engine
        .chat("inertia", false, SearchType::Hybrid, None)
        .await
        .unwrap();
    assert!(turn.citations.is_empty());
    assert!(turn.search_results_count > 0);
    assert!(turn.confidence > 0.0);
}

#[tokio::test]
async fn test_citations_follow_context_budget() {
    let long = "x".repeat(400);
    let index = FakeIndex::with_hits(
        vec![
            (chunk("a", 0, "short passage"), 0.9),
            (chunk("b", 1, &long), 0.8),
            (chunk("c", 2, "another short passage"), 0.7),
        ],
        Vec::new(),
    );
    let mut config = test_config();
    config.retrieval.max_context_chars = 200;
    let h = harness_with(config, FakeEmbedder::default(), index, ScriptedLlm::default());

    let turn = h
        .engine
        .chat("passage", true, SearchType::Vector, Some(3))
        .await
        .unwrap();

    assert_eq!(turn.search_results_count, 3);
    let cited: Vec<&str> = turn.citations.iter().map(|c| c.chunk_id.as_str()).collect();
    assert_eq!(cited, vec!["a"]);
    assert!(!h.llm.last_prompt().contains(&long));
}

#[tokio::test]
async fn test_explain_uses_few_passages() {
    let index = FakeIndex::with_hits(ranked_hits("v", 10, 0.9), ranked_hits("k", 10, 9.0));
    let h = harness(index, ScriptedLlm::default());

    let turn = h.engine.explain("inertia", None).await.unwrap();

    assert!(turn.citations.len() <= 2);
    assert!(!turn.citations.is_empty());
    assert_eq!(turn.search_type, SearchType::Hybrid);
    assert!(turn.search_results_count <= 3);
    assert_eq!(h.index.requested_top_k(), vec![6, 6]);
}

#[tokio::test]
async fn test_similar_uses_vector_branch_only() {
    let h = harness(newton_index(), ScriptedLlm::default());

    let result = h.engine.similar("inertia", Some(2)).await.unwrap();

    assert_eq!(result.search_type, SearchType::Vector);
    assert_eq!(result.len(), 2);
    assert_eq!(h.index.keyword_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.embedder.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hybrid_branches_run_concurrently() {
    let mut index = newton_index();
    index.delay = Some(Duration::from_millis(100));
    let embedder = FakeEmbedder {
        delay: Some(Duration::from_millis(100)),
        ..Default::default()
    };
    let h = harness_with(test_config(), embedder, index, ScriptedLlm::default());

    let started = tokio::time::Instant::now();
    h.engine
        .search("inertia", SearchType::Hybrid, None, None)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // embed + vector query on one side, keyword query on the other
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_slow_index_times_out() {
    let mut index = newton_index();
    index.delay = Some(Duration::from_secs(30));
    let mut config = test_config();
    config.index.timeout_secs = 2;
    let h = harness_with(config, FakeEmbedder::default(), index, ScriptedLlm::default());

    let failure = h
        .engine
        .search("inertia", SearchType::Keyword, None, None)
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Retrieval);
    assert!(matches!(failure.error(), AppError::IndexUnavailable(_)));
}

#[tokio::test]
async fn test_concurrent_requests_share_engine() {
    let h = harness(newton_index(), ScriptedLlm::default());
    let engine = Arc::new(h.engine);

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .chat(&format!("question {}", i), true, SearchType::Hybrid, None)
                    .await
            })
        })
        .collect();

    for task in tasks {
        let turn = task.await.unwrap().unwrap();
        assert_eq!(turn.answer, DEFAULT_ANSWER);
    }
    assert_eq!(h.llm.calls(), 8);
    assert_eq!(h.embedder.calls(), 8);
}

#[tokio::test]
async fn test_health_reports_down_provider() {
    let h = harness_with(
        test_config(),
        FakeEmbedder::failing(),
        newton_index(),
        ScriptedLlm::default(),
    );

    let report = h.engine.health().await;

    assert_eq!(report.status, HealthStatus::Degraded);
    assert!(!report.is_healthy());
    let embedding = &report.services["embedding"];
    assert_eq!(embedding.status, ServiceStatus::Down);
    assert!(embedding.error.is_some());
    assert_eq!(report.services["index"].status, ServiceStatus::Up);
    assert_eq!(report.services["generation"].status, ServiceStatus::Up);
    assert_eq!(report.corpus_size, Some(5));
}

#[tokio::test]
async fn test_health_all_up() {
    let h = harness(newton_index(), ScriptedLlm::default());
    let report = h.engine.health().await;
    assert!(report.is_healthy());
    assert_eq!(report.services.len(), 3);
}

#[tokio::test]
async fn test_stats_describe_engine() {
    let h = harness(newton_index(), ScriptedLlm::default());

    let stats = h.engine.stats().await;

    assert_eq!(stats.embedding_provider, "fake");
    assert_eq!(stats.embedding_dimensions, 3);
    assert_eq!(stats.index_backend, "fake");
    assert_eq!(stats.collection, "PhysicsChunk");
    assert_eq!(stats.corpus_size, Some(5));
    assert_eq!(stats.generation_provider, "scripted");
    assert_eq!(stats.default_top_k, 5);
    assert_eq!(stats.max_top_k, 20);
    assert!((stats.hybrid_alpha - 0.5).abs() < f32::EPSILON);
}
