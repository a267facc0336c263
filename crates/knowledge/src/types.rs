//! Retrieval data model: chunks, queries and the results handed back to callers.

use physrag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Immutable unit of corpus text, created during ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique chunk identifier
    pub id: String,

    /// Text content
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    /// Position in corpus order; the last tie-breaker when ranking
    #[serde(default)]
    pub position: u64,
}

/// Which ranking produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingMethod {
    Vector,
    Keyword,
    Hybrid,
}

/// A chunk with a relevance score in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub method: RankingMethod,
}

/// Search-type selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    Hybrid,
    Vector,
    Keyword,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hybrid => "hybrid",
            Self::Vector => "vector",
            Self::Keyword => "keyword",
        }
    }

    pub fn ranking_method(&self) -> RankingMethod {
        match self {
            Self::Hybrid => RankingMethod::Hybrid,
            Self::Vector => RankingMethod::Vector,
            Self::Keyword => RankingMethod::Keyword,
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hybrid" => Ok(Self::Hybrid),
            "vector" => Ok(Self::Vector),
            "keyword" => Ok(Self::Keyword),
            other => Err(AppError::InvalidQuery(format!(
                "Unknown search type '{}'. Supported: hybrid, vector, keyword",
                other
            ))),
        }
    }
}

/// A retrieval request.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub text: String,
    pub search_type: SearchType,
    pub top_k: usize,
    /// 1.0 = pure vector, 0.0 = pure keyword; only read in hybrid mode
    pub alpha: f32,
}

impl Query {
    pub fn new(text: impl Into<String>, search_type: SearchType, top_k: usize, alpha: f32) -> Self {
        Self {
            text: text.into(),
            search_type,
            top_k,
            alpha,
        }
    }

    /// Reject the query before any provider is contacted.
    pub fn validate(&self, max_top_k: usize) -> AppResult<()> {
        if self.text.trim().is_empty() {
            return Err(AppError::InvalidQuery("query text is empty".to_string()));
        }

        if self.top_k == 0 || self.top_k > max_top_k {
            return Err(AppError::InvalidQuery(format!(
                "top_k must be within [1, {}], got {}",
                max_top_k, self.top_k
            )));
        }

        if !self.alpha.is_finite() || !(0.0..=1.0).contains(&self.alpha) {
            return Err(AppError::InvalidQuery(format!(
                "alpha must be within [0, 1], got {}",
                self.alpha
            )));
        }

        Ok(())
    }
}

/// Ranked chunks for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Non-increasing by score, at most `top_k` long
    pub chunks: Vec<ScoredChunk>,

    /// Effective search type used
    pub search_type: SearchType,

    #[serde(with = "duration_secs")]
    pub search_time: Duration,

    /// One hybrid sub-query failed and the other carried the result
    #[serde(default)]
    pub degraded: bool,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// A source reference returned with an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    /// 1-based position in the grounding context
    pub rank: usize,
    pub chunk_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub position: u64,
    pub score: f32,
    pub method: RankingMethod,
    /// Content truncated on a word boundary
    pub preview: String,
}

impl Citation {
    pub fn from_scored(rank: usize, scored: &ScoredChunk, preview_chars: usize) -> Self {
        Self {
            rank,
            chunk_id: scored.chunk.id.clone(),
            chapter: scored.chunk.chapter.clone(),
            section: scored.chunk.section.clone(),
            position: scored.chunk.position,
            score: scored.score,
            method: scored.method,
            preview: truncate_preview(&scored.chunk.content, preview_chars),
        }
    }
}

/// One answered request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub answer: String,

    /// Mirrors the chunks placed in the context; empty when sources were not requested
    pub citations: Vec<Citation>,

    #[serde(with = "duration_secs")]
    pub search_time: Duration,

    #[serde(with = "duration_secs")]
    pub generation_time: Duration,

    pub search_type: SearchType,

    #[serde(default)]
    pub degraded: bool,

    /// Highest score among the chunks the model saw
    pub confidence: f32,

    /// Chunks returned by retrieval, before context budgeting
    pub search_results_count: usize,
}

/// Wall-clock time spent per stage; zero for stages that never ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    #[serde(with = "duration_secs")]
    pub search_time: Duration,

    #[serde(with = "duration_secs")]
    pub generation_time: Duration,
}

/// Truncate on a char boundary, backing off to the last whitespace.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut: String = text.chars().take(max_chars).collect();
    let trimmed = match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}...", trimmed.trim_end())
}

/// Durations travel as fractional seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_type_ranking_method() {
        assert_eq!(SearchType::Hybrid.ranking_method(), RankingMethod::Hybrid);
        assert_eq!(SearchType::Vector.ranking_method(), RankingMethod::Vector);
        assert_eq!(SearchType::Keyword.ranking_method(), RankingMethod::Keyword);
    }

    #[test]
    fn test_search_type_parse() {
        assert_eq!("hybrid".parse::<SearchType>().unwrap(), SearchType::Hybrid);
        assert_eq!("Vector".parse::<SearchType>().unwrap(), SearchType::Vector);
        assert!(matches!(
            "semantic".parse::<SearchType>(),
            Err(AppError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_query_validation() {
        let ok = Query::new("What is Newton's first law?", SearchType::Hybrid, 3, 0.5);
        assert!(ok.validate(20).is_ok());

        let cases = [
            Query::new("   ", SearchType::Hybrid, 3, 0.5),
            Query::new("q", SearchType::Hybrid, 0, 0.5),
            Query::new("q", SearchType::Hybrid, 21, 0.5),
            Query::new("q", SearchType::Hybrid, 3, 1.5),
            Query::new("q", SearchType::Hybrid, 3, -0.1),
            Query::new("q", SearchType::Hybrid, 3, f32::NAN),
        ];
        for q in cases {
            assert!(
                matches!(q.validate(20), Err(AppError::InvalidQuery(_))),
                "expected rejection for {:?}",
                q
            );
        }
    }

    #[test]
    fn test_alpha_bounds_inclusive() {
        assert!(Query::new("q", SearchType::Hybrid, 1, 0.0).validate(5).is_ok());
        assert!(Query::new("q", SearchType::Hybrid, 1, 1.0).validate(5).is_ok());
    }

    #[test]
    fn test_truncate_preview() {
        assert_eq!(truncate_preview("Short text", 100), "Short text");

        let long = "This is a very long text that needs to be truncated at some point";
        let result = truncate_preview(long, 30);
        assert!(result.chars().count() <= 33);
        assert!(result.ends_with("..."));
        assert!(result.starts_with("This is a very long"));
    }

    #[test]
    fn test_truncate_preview_multibyte() {
        let bengali = "বস্তু স্থির থাকলে স্থিরই থাকবে যদি না বাইরের বল প্রয়োগ করা হয়";
        let result = truncate_preview(bengali, 12);
        assert!(result.ends_with("..."));
        assert!(result.chars().count() <= 15);
    }

    #[test]
    fn test_durations_serialize_as_seconds() {
        let timings = StageTimings {
            search_time: Duration::from_millis(250),
            generation_time: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(timings).unwrap();
        assert_eq!(json["search_time"], 0.25);
        assert_eq!(json["generation_time"], 1.5);

        let back: StageTimings = serde_json::from_value(json).unwrap();
        assert_eq!(back, timings);
    }

    #[test]
    fn test_chunk_optional_metadata() {
        let chunk: Chunk =
            serde_json::from_str(r#"{"id":"c1","content":"Work is force times distance."}"#)
                .unwrap();
        assert!(chunk.chapter.is_none());
        assert_eq!(chunk.position, 0);
    }
}
