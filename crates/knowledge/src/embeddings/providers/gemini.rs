//! Google Gemini embedding provider (`batchEmbedContents`).

use crate::embeddings::provider::{check_dimensions, prepare_input, EmbeddingProvider};
use async_trait::async_trait;
use physrag_core::config::EmbeddingSettings;
use physrag_core::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    max_input_chars: usize,
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<Values>,
}

#[derive(Debug, Deserialize)]
struct Values {
    #[serde(default)]
    values: Vec<f32>,
}

impl GeminiProvider {
    pub fn new(settings: &EmbeddingSettings, api_key: impl Into<String>) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| {
                AppError::Config(format!("Failed to create HTTP client for Gemini: {}", e))
            })?;

        let model = if settings.model.starts_with("models/") {
            settings.model.clone()
        } else {
            format!("models/{}", settings.model)
        };

        Ok(Self {
            client,
            base_url: settings
                .endpoint
                .as_deref()
                .unwrap_or(DEFAULT_GEMINI_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
            model,
            dimensions: settings.dimensions,
            max_input_chars: settings.max_input_chars,
        })
    }

    fn build_request<'a>(&'a self, texts: &'a [String]) -> BatchRequest<'a> {
        BatchRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: &self.model,
                    content: Content {
                        parts: vec![Part {
                            text: prepare_input(text, self.max_input_chars),
                        }],
                    },
                    output_dimensionality: self.dimensions,
                })
                .collect(),
        }
    }

    fn convert_response(&self, expected: usize, body: BatchResponse) -> AppResult<Vec<Vec<f32>>> {
        if body.embeddings.len() != expected {
            return Err(AppError::EmbeddingUnavailable(format!(
                "Gemini returned {} embeddings for {} inputs",
                body.embeddings.len(),
                expected
            )));
        }

        body.embeddings
            .into_iter()
            .map(|e| {
                check_dimensions("Gemini", self.dimensions, &e.values)?;
                Ok(e.values)
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn provider_name(&self) -> &str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/{}:batchEmbedContents", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_request(texts))
            .send()
            .await
            .map_err(|e| {
                AppError::EmbeddingUnavailable(format!("Failed to send request to Gemini: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingUnavailable(format!(
                "Gemini API error ({}): {}",
                status, text
            )));
        }

        let body: BatchResponse = response.json().await.map_err(|e| {
            AppError::EmbeddingUnavailable(format!("Failed to parse Gemini response: {}", e))
        })?;

        self.convert_response(texts.len(), body)
    }

    async fn ping(&self) -> AppResult<()> {
        let url = format!("{}/{}", self.base_url, self.model);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| AppError::EmbeddingUnavailable(format!("Gemini not reachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::EmbeddingUnavailable(format!(
                "Gemini model lookup returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
