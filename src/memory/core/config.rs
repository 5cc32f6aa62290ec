//! Configuration for the memory subsystem.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::memory::core::errors::{MemoryError, MemoryResult};

/// Top-level configuration for retrieval and ranking.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Which retrieval backend serves queries.
    pub backend: BackendKind,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Similarity graph and rank propagation settings.
    pub graph: GraphConfig,
    /// Retrieval defaults.
    pub retrieval: RetrievalConfig,
    /// Embedding model settings.
    pub embedding: EmbeddingConfig,
    /// Completion model settings.
    pub llm: LlmConfig,
    /// Prompt construction settings.
    pub prompt: PromptConfig,
    /// Background importance refresh settings.
    pub refresh: RefreshConfig,
}

impl MemoryConfig {
    /// Build a configuration from defaults overridden by `NM_*` environment variables.
    ///
    /// Values that fail to parse are ignored and the default is kept.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(flag) = std::env::var("NM_USE_BQ") {
            config.backend = if flag == "1" {
                BackendKind::Remote
            } else {
                BackendKind::Local
            };
        }
        env_parse("NM_BACKEND", &mut config.backend);

        if let Ok(path) = std::env::var("NM_LOCAL_CHUNKS") {
            config.storage.local_chunks_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("NM_SQLITE_PATH") {
            config.storage.sqlite_path = PathBuf::from(path);
        }
        if let Ok(table) = std::env::var("NM_CHUNK_TABLE") {
            config.storage.chunk_table = table;
        }

        env_parse("NM_PR_SIM_THRESHOLD", &mut config.graph.sim_threshold);
        env_parse("NM_PR_DAMPING", &mut config.graph.damping);
        env_parse("NM_PR_ITERS", &mut config.graph.iterations);

        env_parse("NM_ALPHA", &mut config.retrieval.alpha);
        env_parse("NM_K", &mut config.retrieval.k);
        env_parse("NM_POOL", &mut config.retrieval.pool);
        env_parse("NM_REMOTE_TIMEOUT_MS", &mut config.retrieval.remote_timeout_ms);

        env_parse("NM_EMBEDDER", &mut config.embedding.provider);
        if let Ok(model) = std::env::var("NM_EMBED_MODEL") {
            config.embedding.model = model;
        }
        env_parse("NM_EMBED_NDIMS", &mut config.embedding.ndims);
        env_parse("NM_EMBED_CACHE", &mut config.embedding.cache_capacity);

        if let Ok(model) = std::env::var("NM_LLM_MODEL") {
            config.llm.model = model;
        }
        if let Ok(base_url) = std::env::var("NM_OLLAMA_URL") {
            config.embedding.base_url = Some(base_url.clone());
            config.llm.base_url = Some(base_url);
        }

        if let Ok(raw) = std::env::var("NM_REFRESH_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) => {
                    config.refresh.interval_seconds = secs;
                    config.refresh.enabled = secs > 0;
                }
                Err(_) => {
                    warn!(key = "NM_REFRESH_SECS", value = %raw, "ignoring unparseable value");
                }
            }
        }

        config
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> MemoryResult<()> {
        if !(0.0..=1.0).contains(&self.graph.damping) {
            return Err(MemoryError::InvalidConfig(
                "graph.damping must be in [0, 1]".to_string(),
            ));
        }

        if self.graph.iterations == 0 {
            return Err(MemoryError::InvalidConfig(
                "graph.iterations must be > 0".to_string(),
            ));
        }

        if !self.graph.sim_threshold.is_finite() {
            return Err(MemoryError::InvalidConfig(
                "graph.sim_threshold must be finite".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.retrieval.alpha) {
            return Err(MemoryError::InvalidConfig(
                "retrieval.alpha must be in [0, 1]".to_string(),
            ));
        }

        if self.retrieval.k == 0 {
            return Err(MemoryError::InvalidConfig(
                "retrieval.k must be > 0".to_string(),
            ));
        }

        if self.retrieval.pool == 0 {
            return Err(MemoryError::InvalidConfig(
                "retrieval.pool must be > 0".to_string(),
            ));
        }

        if self.embedding.ndims == 0 {
            return Err(MemoryError::InvalidConfig(
                "embedding.ndims must be > 0".to_string(),
            ));
        }

        if self.embedding.cache_capacity == 0 {
            return Err(MemoryError::InvalidConfig(
                "embedding.cache_capacity must be > 0".to_string(),
            ));
        }

        if self.prompt.max_chunks == 0 {
            return Err(MemoryError::InvalidConfig(
                "prompt.max_chunks must be > 0".to_string(),
            ));
        }

        if self.refresh.enabled && self.refresh.interval_seconds == 0 {
            return Err(MemoryError::InvalidConfig(
                "refresh.interval_seconds must be > 0 when refresh is enabled".to_string(),
            ));
        }

        if let Some(base_url) = &self.embedding.base_url {
            Url::parse(base_url)?;
        }

        if let Some(base_url) = &self.llm.base_url {
            Url::parse(base_url)?;
        }

        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!(key, value = %raw, "ignoring unparseable value"),
        }
    }
}

/// Retrieval backend selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Chunks read from a local line-delimited file.
    #[default]
    Local,
    /// Chunks and vectors held in a vector-capable `SQLite` store.
    Remote,
}

impl FromStr for BackendKind {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" | "sqlite" => Ok(Self::Remote),
            other => Err(MemoryError::InvalidConfig(format!(
                "unknown backend: {other}"
            ))),
        }
    }
}

/// Storage configuration for chunk data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Line-delimited chunk file for the local backend.
    pub local_chunks_path: PathBuf,
    /// `SQLite` database path for the remote backend.
    pub sqlite_path: PathBuf,
    /// Chunk table name.
    pub chunk_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_chunks_path: PathBuf::from("telemetry/local_chunks.jsonl"),
            sqlite_path: PathBuf::from("neuromem.sqlite"),
            chunk_table: "chunks".to_string(),
        }
    }
}

/// Similarity graph and rank propagation parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Minimum pairwise similarity for an edge.
    pub sim_threshold: f64,
    /// Weight of graph-derived mass per iteration.
    pub damping: f64,
    /// Fixed number of propagation rounds.
    pub iterations: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            sim_threshold: 0.38,
            damping: 0.85,
            iterations: 20,
        }
    }
}

/// Retrieval defaults applied when a request leaves a field unset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Similarity weight in the blend.
    pub alpha: f64,
    /// Number of candidates returned.
    pub k: usize,
    /// Candidates fetched from the remote store before blending.
    pub pool: usize,
    /// Per-stage timeout for remote store calls.
    pub remote_timeout_ms: u64,
}

impl RetrievalConfig {
    /// Remote stage timeout as a [`Duration`].
    #[must_use]
    pub const fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            k: 5,
            pool: 200,
            remote_timeout_ms: 10_000,
        }
    }
}

/// Embedding provider selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Ollama embedding model through Rig.
    #[default]
    Ollama,
    /// Offline feature-hashing embedder.
    Hashing,
}

impl FromStr for EmbeddingProvider {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hashing" | "hash" => Ok(Self::Hashing),
            other => Err(MemoryError::InvalidConfig(format!(
                "unknown embedding provider: {other}"
            ))),
        }
    }
}

/// Embedding model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Which embedder to construct.
    pub provider: EmbeddingProvider,
    /// Ollama embedding model name.
    pub model: String,
    /// Embedding vector dimensions.
    pub ndims: usize,
    /// Optional custom base URL.
    pub base_url: Option<String>,
    /// LRU capacity of the embedding cache.
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Ollama,
            model: "nomic-embed-text".to_string(),
            ndims: 768,
            base_url: None,
            cache_capacity: 1024,
        }
    }
}

/// Completion model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ollama completion model name.
    pub model: String,
    /// Temperature for generation.
    pub temperature: f64,
    /// Optional max tokens.
    pub max_tokens: Option<u64>,
    /// Optional custom base URL.
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2:3b".to_string(),
            temperature: 0.2,
            max_tokens: Some(256),
            base_url: None,
        }
    }
}

/// Prompt construction settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Maximum number of chunks placed in the context.
    pub max_chunks: usize,
    /// Maximum characters kept per chunk.
    pub max_chars_per_chunk: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_chunks: 5,
            max_chars_per_chunk: 600,
        }
    }
}

/// Background importance refresh settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Interval between fingerprint checks (in seconds).
    pub interval_seconds: u64,
    /// Whether the background refresher runs.
    pub enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
            enabled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = MemoryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backend, BackendKind::Local);
        assert!((config.graph.sim_threshold - 0.38).abs() < f64::EPSILON);
        assert!((config.graph.damping - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.graph.iterations, 20);
        assert_eq!(config.retrieval.pool, 200);
    }

    #[test]
    fn test_validate_rejects_bad_damping() {
        let mut config = MemoryConfig::default();
        config.graph.damping = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_iterations() {
        let mut config = MemoryConfig::default();
        config.graph.iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = MemoryConfig::default();
        config.embedding.base_url = Some("not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("remote".parse::<BackendKind>().ok(), Some(BackendKind::Remote));
        assert_eq!(" Local ".parse::<BackendKind>().ok(), Some(BackendKind::Local));
        assert!("bigtable".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!(
            "hashing".parse::<EmbeddingProvider>().ok(),
            Some(EmbeddingProvider::Hashing)
        );
        assert!("word2vec".parse::<EmbeddingProvider>().is_err());
    }
}
