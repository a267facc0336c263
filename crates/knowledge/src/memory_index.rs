//! In-process index over a JSONL corpus.
//!
//! Each line holds one chunk (`id`, `content`, optional `chapter`,
//! `section`, `position`) and optionally its `embedding`. Vector queries
//! rank by cosine similarity; keyword queries use Okapi BM25.

use crate::types::Chunk;
use crate::vector_index::VectorIndex;
use physrag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use unicode_segmentation::UnicodeSegmentation;

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

/// One corpus line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusRecord {
    #[serde(flatten)]
    pub chunk: Chunk,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

struct Entry {
    chunk: Chunk,
    embedding: Option<Vec<f32>>,
    term_freqs: HashMap<String, u32>,
    length: usize,
}

pub struct MemoryIndex {
    collection: String,
    entries: Vec<Entry>,
    doc_freqs: HashMap<String, u32>,
    avg_length: f32,
}

fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Descending by score, then corpus order.
fn sort_hits(hits: &mut [(Chunk, f32)]) {
    hits.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| a.0.position.cmp(&b.0.position))
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
}

impl MemoryIndex {
    pub fn from_records(collection: impl Into<String>, records: Vec<CorpusRecord>) -> Self {
        let mut doc_freqs: HashMap<String, u32> = HashMap::new();
        let mut total_length = 0usize;

        let entries: Vec<Entry> = records
            .into_iter()
            .map(|record| {
                let tokens = tokenize(&record.chunk.content);
                let mut term_freqs: HashMap<String, u32> = HashMap::new();
                for token in &tokens {
                    *term_freqs.entry(token.clone()).or_insert(0) += 1;
                }
                for term in term_freqs.keys() {
                    *doc_freqs.entry(term.clone()).or_insert(0) += 1;
                }
                total_length += tokens.len();

                Entry {
                    chunk: record.chunk,
                    embedding: record.embedding,
                    term_freqs,
                    length: tokens.len(),
                }
            })
            .collect();

        let avg_length = if entries.is_empty() {
            0.0
        } else {
            total_length as f32 / entries.len() as f32
        };

        Self {
            collection: collection.into(),
            entries,
            doc_freqs,
            avg_length,
        }
    }

    /// Load a JSONL corpus; blank lines are skipped.
    pub fn load_jsonl(path: &Path, collection: &str) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read corpus {:?}: {}", path, e))
        })?;

        let mut records = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: CorpusRecord = serde_json::from_str(line).map_err(|e| {
                AppError::Serialization(format!(
                    "{:?} line {}: {}",
                    path,
                    line_no + 1,
                    e
                ))
            })?;
            records.push(record);
        }

        tracing::info!(
            "Loaded {} chunks from {:?} into collection '{}'",
            records.len(),
            path,
            collection
        );
        Ok(Self::from_records(collection, records))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn bm25(&self, entry: &Entry, terms: &[String]) -> f32 {
        let n = self.entries.len() as f32;
        let length_norm = if self.avg_length > 0.0 {
            entry.length as f32 / self.avg_length
        } else {
            0.0
        };

        terms
            .iter()
            .filter_map(|term| {
                let tf = *entry.term_freqs.get(term)? as f32;
                let df = *self.doc_freqs.get(term)? as f32;
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                Some(idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * length_norm)))
            })
            .sum()
    }
}

#[async_trait::async_trait]
impl VectorIndex for MemoryIndex {
    fn backend_name(&self) -> &str {
        "memory"
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    async fn query_vector(&self, vector: &[f32], top_k: usize) -> AppResult<Vec<(Chunk, f32)>> {
        let mut hits = Vec::new();
        for entry in &self.entries {
            let Some(embedding) = &entry.embedding else {
                continue;
            };
            if embedding.len() != vector.len() {
                return Err(AppError::IndexUnavailable(format!(
                    "chunk '{}' has {} dimensions, query has {}",
                    entry.chunk.id,
                    embedding.len(),
                    vector.len()
                )));
            }
            hits.push((entry.chunk.clone(), cosine_similarity(vector, embedding)));
        }

        sort_hits(&mut hits);
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn query_keyword(&self, text: &str, top_k: usize) -> AppResult<Vec<(Chunk, f32)>> {
        let mut terms = tokenize(text);
        terms.sort();
        terms.dedup();

        let mut hits: Vec<(Chunk, f32)> = self
            .entries
            .iter()
            .map(|entry| (entry, self.bm25(entry, &terms)))
            .filter(|(_, score)| *score > 0.0)
            .map(|(entry, score)| (entry.chunk.clone(), score))
            .collect();

        sort_hits(&mut hits);
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn count(&self) -> AppResult<Option<u64>> {
        Ok(Some(self.entries.len() as u64))
    }
}
