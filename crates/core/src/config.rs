//! Configuration management for PhysRAG.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults
//! - YAML file (`physrag.yaml` in the workspace, or `PHYSRAG_CONFIG`)
//! - Environment variables (`PHYSRAG_*`)
//! - Command-line flags (`with_overrides`)
//!
//! The resulting `RagConfig` is immutable once handed to the engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Default config file name, looked up in the workspace root.
pub const CONFIG_FILE_NAME: &str = "physrag.yaml";

const EMBEDDING_PROVIDERS: [&str; 3] = ["ollama", "gemini", "mock"];
const INDEX_PROVIDERS: [&str; 2] = ["weaviate", "memory"];
const GENERATION_PROVIDERS: [&str; 2] = ["ollama", "gemini"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RagConfig {
    /// Workspace root; relative paths in the file resolve against it
    #[serde(skip)]
    pub workspace: PathBuf,

    /// Config file that was merged, if any
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
    pub generation: GenerationSettings,
    pub retrieval: RetrievalSettings,
    pub orchestration: OrchestrationSettings,
    pub logging: LoggingSettings,
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingSettings {
    /// "ollama", "gemini" or "mock"
    pub provider: String,
    pub model: String,
    /// Base URL; provider default when absent
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,
    pub dimensions: usize,
    /// Longer input is truncated, never rejected
    pub max_input_chars: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            endpoint: None,
            api_key_env: None,
            dimensions: 768,
            max_input_chars: 8000,
            timeout_secs: 15,
        }
    }
}

/// Vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexSettings {
    /// "weaviate" or "memory"
    pub provider: String,
    pub url: String,
    pub api_key_env: Option<String>,
    /// Fixed collection name; never negotiated per request
    pub collection: String,
    /// JSONL corpus for the memory provider
    pub corpus_path: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            provider: "weaviate".to_string(),
            url: "http://localhost:8080".to_string(),
            api_key_env: None,
            collection: "PhysicsChunk".to_string(),
            corpus_path: None,
            timeout_secs: 10,
        }
    }
}

/// Generation provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationSettings {
    /// "ollama" or "gemini"
    pub provider: String,
    pub model: String,
    pub endpoint: Option<String>,
    pub api_key_env: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Language the answer should be written in
    pub answer_language: String,
    /// Directory of YAML prompt overrides
    pub prompts_dir: Option<PathBuf>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            endpoint: None,
            api_key_env: None,
            temperature: 0.7,
            max_tokens: 1000,
            timeout_secs: 60,
            answer_language: "Bengali".to_string(),
            prompts_dir: None,
        }
    }
}

/// Retrieval and context-shaping settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalSettings {
    pub default_top_k: usize,
    pub max_top_k: usize,
    /// 1.0 = pure vector, 0.0 = pure keyword
    pub hybrid_alpha: f32,
    /// Candidates requested per sub-query in hybrid mode = top_k * factor
    pub overfetch_factor: usize,
    /// Character budget of the grounding context
    pub max_context_chars: usize,
    pub explain_top_k: usize,
    pub explain_context_chunks: usize,
    /// Optional cap on citations returned with a chat turn
    pub max_citations: Option<usize>,
    pub preview_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 20,
            hybrid_alpha: 0.5,
            overfetch_factor: 2,
            max_context_chars: 6000,
            explain_top_k: 3,
            explain_context_chunks: 2,
            max_citations: None,
            preview_chars: 200,
        }
    }
}

/// Failure handling and concurrency limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestrationSettings {
    /// Extra attempts after a `GenerationUnavailable`
    pub generation_retries: u32,
    /// In-flight calls allowed per provider
    pub max_in_flight: usize,
}

impl Default for OrchestrationSettings {
    fn default() -> Self {
        Self {
            generation_retries: 1,
            max_in_flight: 8,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: Option<String>,
    /// "text" or "json"
    pub format: Option<String>,
    pub color: Option<bool>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            embedding: EmbeddingSettings::default(),
            index: IndexSettings::default(),
            generation: GenerationSettings::default(),
            retrieval: RetrievalSettings::default(),
            orchestration: OrchestrationSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl RagConfig {
    /// Load configuration from the YAML file and the process environment.
    ///
    /// Environment variables:
    /// - `PHYSRAG_WORKSPACE`, `PHYSRAG_CONFIG`
    /// - `PHYSRAG_EMBEDDING_PROVIDER`, `PHYSRAG_EMBEDDING_MODEL`
    /// - `PHYSRAG_GENERATION_PROVIDER`, `PHYSRAG_GENERATION_MODEL`
    /// - `PHYSRAG_INDEX_PROVIDER`, `PHYSRAG_WEAVIATE_URL`, `PHYSRAG_CORPUS_PATH`
    /// - `PHYSRAG_HYBRID_ALPHA`, `PHYSRAG_TOP_K`
    /// - `RUST_LOG`, `NO_COLOR`
    ///
    /// # Example
    /// ```no_run
    /// use physrag_core::config::RagConfig;
    ///
    /// let config = RagConfig::load().expect("Failed to load config");
    /// println!("Collection: {}", config.index.collection);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`RagConfig::load`] with an injectable environment lookup.
    pub fn load_with<F>(env: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut workspace = Self::default().workspace;
        if let Some(ws) = env("PHYSRAG_WORKSPACE") {
            workspace = PathBuf::from(ws);
        }

        if !workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                workspace
            )));
        }

        let explicit_file = env("PHYSRAG_CONFIG").map(PathBuf::from);
        let config_path = explicit_file
            .clone()
            .unwrap_or_else(|| workspace.join(CONFIG_FILE_NAME));

        let mut config = if config_path.exists() {
            Self::from_yaml_file(&config_path)?
        } else if explicit_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file not found: {:?}",
                config_path
            )));
        } else {
            tracing::debug!("No config file at {:?}, using defaults", config_path);
            Self::default()
        };

        config.workspace = workspace;
        config.apply_env(env)?;

        Ok(config)
    }

    /// Parse a YAML config file. Missing sections and fields keep their defaults.
    pub fn from_yaml_file(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let mut config: RagConfig = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        config.config_file = Some(path.to_path_buf());
        tracing::debug!("Merged config file {:?}", path);
        Ok(config)
    }

    /// Environment variables override YAML config.
    fn apply_env<F>(&mut self, env: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = env("PHYSRAG_EMBEDDING_PROVIDER") {
            self.embedding.provider = v;
        }
        if let Some(v) = env("PHYSRAG_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = env("PHYSRAG_GENERATION_PROVIDER") {
            self.generation.provider = v;
        }
        if let Some(v) = env("PHYSRAG_GENERATION_MODEL") {
            self.generation.model = v;
        }
        if let Some(v) = env("PHYSRAG_INDEX_PROVIDER") {
            self.index.provider = v;
        }
        if let Some(v) = env("PHYSRAG_WEAVIATE_URL") {
            self.index.url = v;
        }
        if let Some(v) = env("PHYSRAG_CORPUS_PATH") {
            self.index.corpus_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env("PHYSRAG_HYBRID_ALPHA") {
            self.retrieval.hybrid_alpha = v.parse().map_err(|_| {
                AppError::Config(format!("PHYSRAG_HYBRID_ALPHA is not a number: {}", v))
            })?;
        }
        if let Some(v) = env("PHYSRAG_TOP_K") {
            self.retrieval.default_top_k = v.parse().map_err(|_| {
                AppError::Config(format!("PHYSRAG_TOP_K is not an integer: {}", v))
            })?;
        }
        if let Some(v) = env("RUST_LOG") {
            self.logging.level = Some(v);
        }
        if env("NO_COLOR").is_some() {
            self.logging.color = Some(false);
        }
        Ok(())
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the file.
    pub fn with_overrides(
        mut self,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
        alpha: Option<f32>,
    ) -> Self {
        if let Some(level) = log_level {
            self.logging.level = Some(level);
        }

        if verbose && self.logging.level.is_none() {
            self.logging.level = Some("debug".to_string());
        }

        if no_color {
            self.logging.color = Some(false);
        }

        if let Some(alpha) = alpha {
            self.retrieval.hybrid_alpha = alpha;
        }

        self
    }

    /// Resolve a path from the config against the workspace root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Validate value ranges and provider names.
    pub fn validate(&self) -> AppResult<()> {
        check_known("embedding", &self.embedding.provider, &EMBEDDING_PROVIDERS)?;
        check_known("index", &self.index.provider, &INDEX_PROVIDERS)?;
        check_known("generation", &self.generation.provider, &GENERATION_PROVIDERS)?;

        let r = &self.retrieval;
        if !(0.0..=1.0).contains(&r.hybrid_alpha) {
            return Err(AppError::Config(format!(
                "retrieval.hybridAlpha must be within [0, 1], got {}",
                r.hybrid_alpha
            )));
        }
        if r.default_top_k == 0 || r.default_top_k > r.max_top_k {
            return Err(AppError::Config(format!(
                "retrieval.defaultTopK must be within [1, {}], got {}",
                r.max_top_k, r.default_top_k
            )));
        }
        if r.explain_top_k == 0 || r.explain_top_k > r.max_top_k {
            return Err(AppError::Config(format!(
                "retrieval.explainTopK must be within [1, {}], got {}",
                r.max_top_k, r.explain_top_k
            )));
        }
        if r.overfetch_factor == 0 {
            return Err(AppError::Config(
                "retrieval.overfetchFactor must be at least 1".to_string(),
            ));
        }
        if r.max_context_chars == 0 {
            return Err(AppError::Config(
                "retrieval.maxContextChars must be positive".to_string(),
            ));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "embedding.dimensions must be positive".to_string(),
            ));
        }
        if self.orchestration.max_in_flight == 0 {
            return Err(AppError::Config(
                "orchestration.maxInFlight must be positive".to_string(),
            ));
        }
        if self.embedding.timeout_secs == 0
            || self.index.timeout_secs == 0
            || self.generation.timeout_secs == 0
        {
            return Err(AppError::Config("timeouts must be positive".to_string()));
        }

        if self.index.provider == "memory" && self.index.corpus_path.is_none() {
            return Err(AppError::Config(
                "index.corpusPath is required for the memory index".to_string(),
            ));
        }

        Ok(())
    }
}

impl EmbeddingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolve the API key from the configured environment variable.
    pub fn resolve_api_key(&self) -> AppResult<Option<String>> {
        resolve_key(self.api_key_env.as_deref(), &self.provider)
    }
}

impl IndexSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn resolve_api_key(&self) -> AppResult<Option<String>> {
        resolve_key(self.api_key_env.as_deref(), &self.provider)
    }
}

impl GenerationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn resolve_api_key(&self) -> AppResult<Option<String>> {
        resolve_key(self.api_key_env.as_deref(), &self.provider)
    }
}

fn resolve_key(env_var: Option<&str>, provider: &str) -> AppResult<Option<String>> {
    match env_var {
        Some(name) => std::env::var(name).map(Some).map_err(|_| {
            AppError::Config(format!(
                "API key for '{}' not found in environment variable: {}",
                provider, name
            ))
        }),
        None => Ok(None),
    }
}

fn check_known(section: &str, provider: &str, known: &[&str]) -> AppResult<()> {
    if known.contains(&provider) {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "Unknown {} provider: {}. Supported: {}",
            section,
            provider,
            known.join(", ")
        )))
    }
}
