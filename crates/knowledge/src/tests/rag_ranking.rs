//! Ranking behaviour through the ranker and the in-process corpus.

use super::fakes::{chunk, ranked_hits, FakeEmbedder, FakeIndex};
use crate::embeddings::{EmbeddingProvider, MockProvider};
use crate::gate::{ProviderGate, ProviderKind};
use crate::memory_index::{CorpusRecord, MemoryIndex};
use crate::rag::{fuse, HybridRanker};
use crate::types::{Query, RankingMethod, SearchType};
use crate::vector_index::VectorIndex;
use std::sync::Arc;
use std::time::Duration;

fn ranker(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> HybridRanker {
    HybridRanker::new(
        embedder,
        index,
        ProviderGate::new(ProviderKind::Embedding, 4, Duration::from_secs(5)),
        ProviderGate::new(ProviderKind::Index, 4, Duration::from_secs(5)),
        2,
    )
}

fn ids(chunks: &[crate::types::ScoredChunk]) -> Vec<String> {
    chunks.iter().map(|c| c.chunk.id.clone()).collect()
}

#[tokio::test]
async fn test_hybrid_respects_top_k_and_score_range() {
    let index = Arc::new(FakeIndex::with_hits(
        ranked_hits("v", 10, 0.95),
        ranked_hits("k", 10, 14.0),
    ));
    let ranker = ranker(Arc::new(FakeEmbedder::default()), index);

    for top_k in [1, 3, 7] {
        let query = Query::new("momentum", SearchType::Hybrid, top_k, 0.5);
        let ranking = ranker.rank(&query).await.unwrap();

        assert!(ranking.chunks.len() <= top_k);
        assert!(!ranking.degraded);
        for scored in &ranking.chunks {
            assert!((0.0..=1.0).contains(&scored.score));
            assert_eq!(scored.method, RankingMethod::Hybrid);
        }
        for pair in ranking.chunks.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}

#[tokio::test]
async fn test_hybrid_overfetches_both_branches() {
    let index = Arc::new(FakeIndex::with_hits(
        ranked_hits("v", 10, 0.9),
        ranked_hits("k", 10, 9.0),
    ));
    let ranker = ranker(Arc::new(FakeEmbedder::default()), Arc::clone(&index) as _);

    let query = Query::new("work and energy", SearchType::Hybrid, 3, 0.5);
    ranker.rank(&query).await.unwrap();

    assert_eq!(index.requested_top_k(), vec![6, 6]);
}

#[tokio::test]
async fn test_single_modes_do_not_overfetch() {
    let index = Arc::new(FakeIndex::with_hits(
        ranked_hits("v", 10, 0.9),
        ranked_hits("k", 10, 9.0),
    ));
    let ranker = ranker(Arc::new(FakeEmbedder::default()), Arc::clone(&index) as _);

    ranker
        .rank(&Query::new("lens", SearchType::Vector, 4, 0.5))
        .await
        .unwrap();
    ranker
        .rank(&Query::new("lens", SearchType::Keyword, 4, 0.5))
        .await
        .unwrap();

    assert_eq!(index.requested_top_k(), vec![4, 4]);
}

#[tokio::test]
async fn test_single_modes_tag_their_method() {
    let index = Arc::new(FakeIndex::with_hits(
        ranked_hits("v", 3, 0.9),
        ranked_hits("k", 3, 9.0),
    ));
    let ranker = ranker(Arc::new(FakeEmbedder::default()), index);

    let vector = ranker
        .rank(&Query::new("lens", SearchType::Vector, 3, 0.5))
        .await
        .unwrap();
    let keyword = ranker
        .rank(&Query::new("lens", SearchType::Keyword, 3, 0.5))
        .await
        .unwrap();

    assert!(vector.chunks.iter().all(|c| c.method == RankingMethod::Vector));
    assert!(keyword.chunks.iter().all(|c| c.method == RankingMethod::Keyword));
}

#[tokio::test]
async fn test_non_outage_branch_error_is_not_degraded() {
    let mut index = FakeIndex::with_hits(ranked_hits("v", 4, 0.9), ranked_hits("k", 4, 9.0));
    index.corrupt_keyword = true;
    let ranker = ranker(Arc::new(FakeEmbedder::default()), Arc::new(index));

    let err = ranker
        .rank(&Query::new("friction", SearchType::Hybrid, 3, 0.5))
        .await
        .unwrap_err();
    assert!(matches!(err, physrag_core::AppError::Serialization(_)));
}

#[tokio::test]
async fn test_alpha_one_matches_vector_order() {
    let vector_hits = vec![
        (chunk("a", 4, "inertia"), 0.91),
        (chunk("b", 1, "mass"), 0.72),
        (chunk("c", 2, "force"), 0.40),
        (chunk("d", 3, "friction"), 0.33),
    ];
    let keyword_hits = vec![
        (chunk("d", 3, "friction"), 12.0),
        (chunk("e", 5, "pressure"), 8.0),
        (chunk("a", 4, "inertia"), 2.0),
    ];
    let index = Arc::new(FakeIndex::with_hits(vector_hits, keyword_hits));
    let ranker = ranker(Arc::new(FakeEmbedder::default()), index);

    let hybrid = ranker
        .rank(&Query::new("inertia", SearchType::Hybrid, 3, 1.0))
        .await
        .unwrap();
    let vector = ranker
        .rank(&Query::new("inertia", SearchType::Vector, 3, 1.0))
        .await
        .unwrap();

    assert_eq!(ids(&hybrid.chunks), ids(&vector.chunks));
}

#[tokio::test]
async fn test_alpha_zero_follows_keyword_order() {
    let index = Arc::new(FakeIndex::with_hits(
        vec![(chunk("a", 0, "x"), 0.9), (chunk("b", 1, "y"), 0.8)],
        vec![(chunk("b", 1, "y"), 7.0), (chunk("c", 2, "z"), 3.0)],
    ));
    let ranker = ranker(Arc::new(FakeEmbedder::default()), index);

    let ranking = ranker
        .rank(&Query::new("x", SearchType::Hybrid, 2, 0.0))
        .await
        .unwrap();

    assert_eq!(ranking.chunks[0].chunk.id, "b");
    assert!((ranking.chunks[0].score - 1.0).abs() < 1e-6);
    // zero-score tie between "a" and "c" goes to the vector-ranked chunk
    assert_eq!(ranking.chunks[1].chunk.id, "a");
}

#[tokio::test]
async fn test_ranking_is_deterministic() {
    let index = Arc::new(FakeIndex::with_hits(
        ranked_hits("v", 8, 0.8),
        ranked_hits("k", 8, 5.0),
    ));
    let ranker = ranker(Arc::new(FakeEmbedder::default()), index);
    let query = Query::new("heat", SearchType::Hybrid, 5, 0.5);

    let first = ranker.rank(&query).await.unwrap();
    for _ in 0..5 {
        let again = ranker.rank(&query).await.unwrap();
        assert_eq!(again.chunks, first.chunks);
    }
}

#[test]
fn test_shared_chunk_outranks_single_branch_hits() {
    let vector = vec![
        (chunk("shared", 2, "newton"), 0.8),
        (chunk("v-only", 0, "vector"), 0.9),
        (chunk("v-tail", 5, "tail"), 0.1),
    ];
    let keyword = vec![
        (chunk("shared", 2, "newton"), 9.0),
        (chunk("k-only", 1, "keyword"), 4.0),
        (chunk("k-tail", 6, "tail"), 1.0),
    ];

    let fused = fuse(&vector, &keyword, 0.5, 4);
    assert_eq!(fused[0].chunk.id, "shared");
    assert_eq!(fused.len(), 4);
}

async fn newton_corpus(provider: &MockProvider) -> Vec<CorpusRecord> {
    let chunks = [
        (
            "newton-1",
            "Newton's first law: a body remains at rest or moves with uniform velocity unless an external force acts on it. This property is called inertia.",
        ),
        (
            "energy-1",
            "Kinetic energy is the energy a body has because of its motion and equals half of mass times speed squared.",
        ),
        (
            "optics-1",
            "Light bends when it passes from air into glass. This bending is called refraction.",
        ),
        (
            "heat-1",
            "Heat flows from a hotter object to a colder object until both reach the same temperature.",
        ),
    ];

    let texts: Vec<String> = chunks.iter().map(|(_, c)| c.to_string()).collect();
    let embeddings = provider.embed_batch(&texts).await.unwrap();

    chunks
        .iter()
        .zip(embeddings)
        .enumerate()
        .map(|(i, ((id, content), embedding))| CorpusRecord {
            chunk: chunk(id, i as u64, content),
            embedding: Some(embedding),
        })
        .collect()
}

#[tokio::test]
async fn test_newton_question_over_memory_corpus() {
    let provider = MockProvider::new(256);
    let index = MemoryIndex::from_records("PhysicsChunk", newton_corpus(&provider).await);
    let ranker = ranker(Arc::new(provider), Arc::new(index));

    for search_type in [SearchType::Hybrid, SearchType::Keyword, SearchType::Vector] {
        let query = Query::new("What is Newton's first law?", search_type, 3, 0.5);
        let ranking = ranker.rank(&query).await.unwrap();

        assert!(!ranking.chunks.is_empty(), "{} returned nothing", search_type);
        assert!(ranking.chunks.len() <= 3);
        assert_eq!(ranking.chunks[0].chunk.id, "newton-1", "{}", search_type);
    }
}
