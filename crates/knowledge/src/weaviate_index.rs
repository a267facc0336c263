//! Weaviate-backed vector index, queried through the GraphQL endpoint.
//!
//! The collection stores one object per chunk with the properties `text`,
//! `doc_id`, `chapter` and `section`. Vector queries use `nearVector` and
//! keyword queries use `bm25`.

use crate::types::Chunk;
use crate::vector_index::VectorIndex;
use physrag_core::config::IndexSettings;
use physrag_core::{AppError, AppResult};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

const PROPERTIES: &str = "text doc_id chapter section";

/// Weaviate index client.
pub struct WeaviateIndex {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChunkRow {
    #[serde(default)]
    text: String,
    #[serde(default)]
    doc_id: Option<f64>,
    #[serde(default)]
    chapter: Option<String>,
    #[serde(default)]
    section: Option<String>,
    #[serde(default, rename = "_additional")]
    additional: Additional,
}

#[derive(Debug, Default, Deserialize)]
struct Additional {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    distance: Option<f32>,
    #[serde(default)]
    score: Option<ScoreValue>,
}

/// BM25 scores come back as strings from some Weaviate versions.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScoreValue {
    Number(f32),
    Text(String),
}

impl ScoreValue {
    fn value(&self) -> f32 {
        match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse().unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ScoreKind {
    Distance,
    Bm25,
}

impl WeaviateIndex {
    pub fn new(settings: &IndexSettings) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build Weaviate HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            api_key: settings.resolve_api_key()?,
            collection: settings.collection.clone(),
        })
    }

    fn near_vector_query(&self, vector: &[f32], top_k: usize) -> String {
        let values = vector
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{{ Get {{ {}(nearVector: {{vector: [{}]}}, limit: {}) {{ {} _additional {{ id distance }} }} }} }}",
            self.collection, values, top_k, PROPERTIES
        )
    }

    fn bm25_query(&self, text: &str, top_k: usize) -> AppResult<String> {
        let literal = serde_json::to_string(text)?;
        Ok(format!(
            "{{ Get {{ {}(bm25: {{query: {}}}, limit: {}) {{ {} _additional {{ id score }} }} }} }}",
            self.collection, literal, top_k, PROPERTIES
        ))
    }

    fn count_query(&self) -> String {
        format!("{{ Aggregate {{ {} {{ meta {{ count }} }} }} }}", self.collection)
    }

    async fn graphql(&self, query: String) -> AppResult<GraphQlResponse> {
        let url = format!("{}/v1/graphql", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "query": query }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            AppError::IndexUnavailable(format!("Failed to reach Weaviate at {}: {}", self.base_url, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::IndexUnavailable(format!(
                "Weaviate GraphQL error ({}): {}",
                status, body
            )));
        }

        response.json().await.map_err(|e| {
            AppError::IndexUnavailable(format!("Failed to parse Weaviate response: {}", e))
        })
    }

    /// Returns `None` when the collection has not been created yet.
    fn check_errors(&self, response: &GraphQlResponse) -> AppResult<Option<()>> {
        if response.errors.is_empty() {
            return Ok(Some(()));
        }

        let missing_collection = response.errors.iter().all(|e| {
            e.message.contains("Cannot query field")
                && (e.message.contains("GetObjectsObj")
                    || e.message.contains("AggregateObjectsObj"))
        });
        if missing_collection {
            tracing::debug!(collection = %self.collection, "Collection does not exist yet");
            return Ok(None);
        }

        let messages = response
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Err(AppError::IndexUnavailable(format!(
            "Weaviate query failed: {}",
            messages
        )))
    }

    fn parse_rows(&self, response: GraphQlResponse, kind: ScoreKind) -> AppResult<Vec<(Chunk, f32)>> {
        if self.check_errors(&response)?.is_none() {
            return Ok(Vec::new());
        }

        let rows = response
            .data
            .as_ref()
            .and_then(|d| d.get("Get"))
            .and_then(|g| g.get(&self.collection))
            .cloned()
            .unwrap_or(Value::Null);
        if rows.is_null() {
            return Ok(Vec::new());
        }

        let rows: Vec<ChunkRow> = serde_json::from_value(rows).map_err(|e| {
            AppError::IndexUnavailable(format!("Unexpected Weaviate result shape: {}", e))
        })?;

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let position = row.doc_id.map(|d| d.max(0.0) as u64).unwrap_or(i as u64);
                let score = match kind {
                    ScoreKind::Distance => row
                        .additional
                        .distance
                        .map(|d| (1.0 - d).clamp(0.0, 1.0))
                        .unwrap_or(0.0),
                    ScoreKind::Bm25 => row.additional.score.as_ref().map(ScoreValue::value).unwrap_or(0.0),
                };
                let id = row
                    .additional
                    .id
                    .unwrap_or_else(|| format!("{}-{}", self.collection, position));

                (
                    Chunk {
                        id,
                        content: row.text,
                        chapter: row.chapter,
                        section: row.section,
                        position,
                    },
                    score,
                )
            })
            .collect())
    }

    fn parse_count(&self, response: GraphQlResponse) -> AppResult<Option<u64>> {
        if self.check_errors(&response)?.is_none() {
            return Ok(Some(0));
        }

        Ok(response
            .data
            .as_ref()
            .and_then(|d| d.get("Aggregate"))
            .and_then(|a| a.get(&self.collection))
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("meta"))
            .and_then(|m| m.get("count"))
            .and_then(Value::as_u64))
    }
}

#[async_trait::async_trait]
impl VectorIndex for WeaviateIndex {
    fn backend_name(&self) -> &str {
        "weaviate"
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    async fn query_vector(&self, vector: &[f32], top_k: usize) -> AppResult<Vec<(Chunk, f32)>> {
        tracing::debug!(top_k, dims = vector.len(), "Weaviate nearVector query");
        let response = self.graphql(self.near_vector_query(vector, top_k)).await?;
        self.parse_rows(response, ScoreKind::Distance)
    }

    async fn query_keyword(&self, text: &str, top_k: usize) -> AppResult<Vec<(Chunk, f32)>> {
        tracing::debug!(top_k, "Weaviate bm25 query");
        let response = self.graphql(self.bm25_query(text, top_k)?).await?;
        self.parse_rows(response, ScoreKind::Bm25)
    }

    async fn ping(&self) -> AppResult<()> {
        let url = format!("{}/v1/.well-known/ready", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            AppError::IndexUnavailable(format!("Weaviate not reachable at {}: {}", self.base_url, e))
        })?;
        if !response.status().is_success() {
            return Err(AppError::IndexUnavailable(format!(
                "Weaviate not ready ({})",
                response.status()
            )));
        }
        Ok(())
    }

    async fn count(&self) -> AppResult<Option<u64>> {
        let response = self.graphql(self.count_query()).await?;
        self.parse_count(response)
    }
}
