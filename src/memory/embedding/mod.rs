//! Embedding model modules.

pub mod cache;
pub mod embedder;
pub mod hashing;

pub use cache::CachedEmbedder;
pub use embedder::{EmbedFuture, Embedder, OllamaEmbedder, build_embedder};
pub use hashing::HashingEmbedder;
