//! Core memory types: configuration, errors, chunks and vector math.

pub mod chunk;
pub mod config;
pub mod errors;
pub mod vector_math;

pub use chunk::{Candidate, Chunk, ScoredCandidate};
pub use config::{
    BackendKind, EmbeddingConfig, EmbeddingProvider, GraphConfig, LlmConfig, MemoryConfig,
    PromptConfig, RefreshConfig, RetrievalConfig, StorageConfig,
};
pub use errors::{MemoryError, MemoryResult};
pub use vector_math::{cosine, normalize_minmax};
