//! Hybrid retrieval and graph-ranking memory.
//!
//! Organized into:
//! - `core`: Configuration, errors, chunks, and vector math
//! - `embedding`: Embedder abstraction with Ollama, hashing, and cached implementations
//! - `graph`: Similarity graph construction and rank propagation
//! - `storage`: Chunk stores (line-delimited file and `SQLite` with vectors)
//! - `retrieval`: Candidate sources, hybrid scoring, and the retrieval coordinator
//! - `maintenance`: Importance recompute and background refresh
//! - `prompt`: Grounded prompt construction
//! - `adapters`: Integration adapters (e.g., Rig)

pub mod adapters;
pub mod core;
pub mod embedding;
pub mod graph;
pub mod maintenance;
pub mod prompt;
pub mod retrieval;
pub mod storage;

// Re-export commonly used types for convenience
pub use adapters::{generate_answer, init_tracing};
pub use core::{
    BackendKind, Candidate, Chunk, EmbeddingConfig, EmbeddingProvider, GraphConfig, LlmConfig,
    MemoryConfig, MemoryError, MemoryResult, PromptConfig, RefreshConfig, RetrievalConfig,
    ScoredCandidate, StorageConfig, cosine, normalize_minmax,
};
pub use embedding::{
    CachedEmbedder, EmbedFuture, Embedder, HashingEmbedder, OllamaEmbedder, build_embedder,
};
pub use graph::{RankVector, SimilarityGraph, propagate};
pub use maintenance::{BackgroundRankRefresh, RefreshStats, recompute_importance};
pub use prompt::{build_prompt, citations};
pub use retrieval::{
    CandidateSource, RetrievalCoordinator, RetrievalMetadata, RetrievalMethod, RetrievalRequest,
    RetrievalResult, rank_candidates,
};
pub use storage::{ChunkStore, JsonlChunkStore, SqliteChunkStore, init_sqlite_vec_extension};
