//! Hybrid ranking: fuses vector similarity and BM25 into one ordering.
//!
//! Each side is min-max normalised to [0, 1] before fusion. The fused
//! score is `alpha * vector + (1 - alpha) * keyword`, where a chunk seen
//! by only one side scores 0 on the other. Ties break on vector rank,
//! then keyword rank, then corpus position, then chunk id, so identical
//! inputs always produce identical output.

use crate::embeddings::EmbeddingProvider;
use crate::gate::ProviderGate;
use crate::types::{Chunk, Query, RankingMethod, ScoredChunk, SearchType};
use crate::vector_index::VectorIndex;
use physrag_core::{AppError, AppResult};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Output of one ranking pass.
#[derive(Debug, Clone)]
pub struct Ranking {
    pub chunks: Vec<ScoredChunk>,
    /// One hybrid branch failed and the other carried the result
    pub degraded: bool,
}

/// Runs the vector and keyword branches and merges them.
pub struct HybridRanker {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    embedding_gate: ProviderGate,
    index_gate: ProviderGate,
    overfetch_factor: usize,
}

impl HybridRanker {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        embedding_gate: ProviderGate,
        index_gate: ProviderGate,
        overfetch_factor: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            embedding_gate,
            index_gate,
            overfetch_factor: overfetch_factor.max(1),
        }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn embedding_gate(&self) -> &ProviderGate {
        &self.embedding_gate
    }

    pub fn index_gate(&self) -> &ProviderGate {
        &self.index_gate
    }

    /// Rank chunks for an already validated query.
    pub async fn rank(&self, query: &Query) -> AppResult<Ranking> {
        match query.search_type {
            SearchType::Vector => {
                let hits = self.vector_branch(&query.text, query.top_k).await?;
                Ok(Ranking {
                    chunks: single_branch(hits, query.search_type.ranking_method(), query.top_k),
                    degraded: false,
                })
            }

            SearchType::Keyword => {
                let hits = self.keyword_branch(&query.text, query.top_k).await?;
                Ok(Ranking {
                    chunks: single_branch(hits, query.search_type.ranking_method(), query.top_k),
                    degraded: false,
                })
            }

            SearchType::Hybrid => self.rank_hybrid(query).await,
        }
    }

    async fn rank_hybrid(&self, query: &Query) -> AppResult<Ranking> {
        let fetch = query.top_k.saturating_mul(self.overfetch_factor);

        let (vector, keyword) = tokio::join!(
            self.vector_branch(&query.text, fetch),
            self.keyword_branch(&query.text, fetch)
        );

        let (vector_hits, keyword_hits, degraded) = match (vector, keyword) {
            (Ok(v), Ok(k)) => (v, k, false),
            (Ok(v), Err(e)) if e.is_unavailable() => {
                tracing::warn!(error = %e, "Keyword branch failed, continuing with vector results");
                (v, Vec::new(), true)
            }
            (Err(e), Ok(k)) if e.is_unavailable() => {
                tracing::warn!(error = %e, "Vector branch failed, continuing with keyword results");
                (Vec::new(), k, true)
            }
            // only provider outages degrade; anything else is a real fault
            (Ok(_), Err(e)) | (Err(e), Ok(_)) => return Err(e),
            (Err(v), Err(k)) => return Err(combine_failures(v, k)),
        };

        tracing::debug!(
            vector = vector_hits.len(),
            keyword = keyword_hits.len(),
            fetch,
            "Hybrid candidates collected"
        );

        Ok(Ranking {
            chunks: fuse(&vector_hits, &keyword_hits, query.alpha, query.top_k),
            degraded,
        })
    }

    /// Embed the text, then search by vector.
    async fn vector_branch(&self, text: &str, top_k: usize) -> AppResult<Vec<(Chunk, f32)>> {
        let vector = self
            .embedding_gate
            .run("embed", self.embedder.embed(text))
            .await?;
        self.index_gate
            .run("query_vector", self.index.query_vector(&vector, top_k))
            .await
    }

    async fn keyword_branch(&self, text: &str, top_k: usize) -> AppResult<Vec<(Chunk, f32)>> {
        self.index_gate
            .run("query_keyword", self.index.query_keyword(text, top_k))
            .await
    }
}

/// Both hybrid branches failed; keep the most telling error kind.
fn combine_failures(vector: AppError, keyword: AppError) -> AppError {
    let detail = format!("vector search: {}; keyword search: {}", vector, keyword);
    match (&vector, &keyword) {
        (AppError::IndexUnavailable(_), _) | (_, AppError::IndexUnavailable(_)) => {
            AppError::IndexUnavailable(detail)
        }
        (AppError::EmbeddingUnavailable(_), _) => AppError::EmbeddingUnavailable(detail),
        _ => AppError::IndexUnavailable(detail),
    }
}

/// Pass a single branch through: keep its order, dedupe, bound scores.
fn single_branch(hits: Vec<(Chunk, f32)>, method: RankingMethod, top_k: usize) -> Vec<ScoredChunk> {
    let mut seen = HashSet::new();
    let hits: Vec<(Chunk, f32)> = hits
        .into_iter()
        .filter(|(chunk, _)| seen.insert(chunk.id.clone()))
        .map(|(chunk, score)| (chunk, if score.is_finite() { score } else { 0.0 }))
        .collect();

    // BM25 is unbounded; scale by the best hit so the top result scores 1
    let scale = match method {
        RankingMethod::Keyword => hits.iter().map(|(_, s)| *s).fold(0.0f32, f32::max),
        _ => 1.0,
    };

    let mut scored: Vec<ScoredChunk> = hits
        .into_iter()
        .map(|(chunk, score)| {
            let score = if scale > 0.0 { score / scale } else { 0.0 };
            ScoredChunk {
                chunk,
                score: score.clamp(0.0, 1.0),
                method,
            }
        })
        .collect();

    // stable: adapter order survives among equal scores
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_k);
    scored
}

/// Min-max normalise to [0, 1].
///
/// When every score is equal (including a single score) the spread is
/// meaningless, so rank position decides instead: `1 - i / n`.
pub fn normalize_scores(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }

    let clean: Vec<f32> = scores
        .iter()
        .map(|s| if s.is_finite() { *s } else { 0.0 })
        .collect();
    let min = clean.iter().copied().fold(f32::INFINITY, f32::min);
    let max = clean.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    if range <= f32::EPSILON {
        let n = clean.len() as f32;
        return (0..clean.len()).map(|i| 1.0 - i as f32 / n).collect();
    }

    clean.iter().map(|s| (s - min) / range).collect()
}

struct Candidate {
    chunk: Chunk,
    vector: Option<(usize, f32)>,
    keyword: Option<(usize, f32)>,
    fused: f32,
}

fn rank_key(entry: Option<(usize, f32)>) -> usize {
    entry.map(|(rank, _)| rank).unwrap_or(usize::MAX)
}

fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.fused
        .total_cmp(&a.fused)
        .then_with(|| rank_key(a.vector).cmp(&rank_key(b.vector)))
        .then_with(|| rank_key(a.keyword).cmp(&rank_key(b.keyword)))
        .then_with(|| a.chunk.position.cmp(&b.chunk.position))
        .then_with(|| a.chunk.id.cmp(&b.chunk.id))
}

/// Merge two ranked candidate lists into at most `top_k` hybrid results.
pub fn fuse(
    vector: &[(Chunk, f32)],
    keyword: &[(Chunk, f32)],
    alpha: f32,
    top_k: usize,
) -> Vec<ScoredChunk> {
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut by_id: HashMap<String, usize> = HashMap::new();

    let vector = dedupe(vector);
    let keyword = dedupe(keyword);
    let vector_norm = normalize_scores(&vector.iter().map(|(_, s)| *s).collect::<Vec<_>>());
    let keyword_norm = normalize_scores(&keyword.iter().map(|(_, s)| *s).collect::<Vec<_>>());

    for (rank, ((chunk, _), norm)) in vector.iter().zip(vector_norm).enumerate() {
        by_id.insert(chunk.id.clone(), candidates.len());
        candidates.push(Candidate {
            chunk: (*chunk).clone(),
            vector: Some((rank, norm)),
            keyword: None,
            fused: 0.0,
        });
    }

    for (rank, ((chunk, _), norm)) in keyword.iter().zip(keyword_norm).enumerate() {
        match by_id.get(&chunk.id) {
            Some(&i) => candidates[i].keyword = Some((rank, norm)),
            None => {
                by_id.insert(chunk.id.clone(), candidates.len());
                candidates.push(Candidate {
                    chunk: (*chunk).clone(),
                    vector: None,
                    keyword: Some((rank, norm)),
                    fused: 0.0,
                });
            }
        }
    }

    for c in &mut candidates {
        let v = c.vector.map(|(_, s)| s).unwrap_or(0.0);
        let k = c.keyword.map(|(_, s)| s).unwrap_or(0.0);
        c.fused = (alpha * v + (1.0 - alpha) * k).clamp(0.0, 1.0);
    }

    candidates.sort_by(compare_candidates);
    candidates.truncate(top_k);

    candidates
        .into_iter()
        .map(|c| ScoredChunk {
            chunk: c.chunk,
            score: c.fused,
            method: RankingMethod::Hybrid,
        })
        .collect()
}

/// First occurrence of each chunk id wins.
fn dedupe(hits: &[(Chunk, f32)]) -> Vec<(&Chunk, f32)> {
    let mut seen = HashSet::new();
    hits.iter()
        .filter(|(chunk, _)| seen.insert(chunk.id.as_str()))
        .map(|(chunk, score)| (chunk, *score))
        .collect()
}
